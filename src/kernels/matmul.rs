use crate::kernels::im2col::PatchBuffer;
use crate::kernels::primitives::sdotusp4;
use crate::kernels::requant::{Epilogue, OutputLayout, OutputPacker};
use crate::tensor::OutputTensor;
use std::ops::Range;

/// Dot products of one weight row against two patches, sharing each weight load.
#[inline(always)]
fn dot2(a: &[u8], b: &[u8], w: &[i8], seed: i32) -> (i32, i32) {
    let mut s0 = seed;
    let mut s1 = seed;
    let groups = w.len() / 4;
    for g in 0..groups {
        let i = g * 4;
        let wv = [w[i], w[i + 1], w[i + 2], w[i + 3]];
        s0 = sdotusp4([a[i], a[i + 1], a[i + 2], a[i + 3]], wv, s0);
        s1 = sdotusp4([b[i], b[i + 1], b[i + 2], b[i + 3]], wv, s1);
    }
    for i in groups * 4..w.len() {
        let wi = w[i] as i32;
        s0 = s0.wrapping_add(a[i] as i32 * wi);
        s1 = s1.wrapping_add(b[i] as i32 * wi);
    }
    (s0, s1)
}

/// Drain a full patch buffer: both pixels, every channel in `channels`.
///
/// Weights are the full (out_ch, patch_len) tensor; only the rows in
/// `channels` are read. Returns the number of output bytes stored.
pub fn matmul_batch(
    patches: &PatchBuffer,
    weights: &[i8],
    channels: Range<usize>,
    epi: &Epilogue,
    layout: &OutputLayout,
    out: &OutputTensor,
) -> usize {
    debug_assert!(patches.is_full());
    let len = patches.patch_len();
    let (a, b) = (patches.patch(0), patches.patch(1));
    let start0 = layout.offset(patches.pixel(0), channels.start);
    let start1 = layout.offset(patches.pixel(1), channels.start);
    let mut out0 = OutputPacker::new(epi.precision(), start0);
    let mut out1 = OutputPacker::new(epi.precision(), start1);
    for oc in channels {
        let row = &weights[oc * len..(oc + 1) * len];
        let (s0, s1) = dot2(a, b, row, epi.initial_sum(oc));
        out0.push(epi.quantize(s0, oc), out);
        out1.push(epi.quantize(s1, oc), out);
    }
    (out0.cursor() - start0) + (out1.cursor() - start1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::primitives::dot_u8_i8;

    #[test]
    fn dot2_matches_single_dot() {
        for n in [1usize, 4, 7, 27] {
            let a: Vec<u8> = (0..n).map(|i| (i * 31 % 256) as u8).collect();
            let b: Vec<u8> = (0..n).map(|i| (255 - i * 7 % 256) as u8).collect();
            let w: Vec<i8> = (0..n).map(|i| (i as i32 * 19 % 200 - 100) as i8).collect();
            assert_eq!(dot2(&a, &b, &w, -9), (dot_u8_i8(&a, &w, -9), dot_u8_i8(&b, &w, -9)));
        }
    }
}
