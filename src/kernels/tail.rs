use crate::kernels::im2col::PatchBuffer;
use crate::kernels::primitives::dot_u8_i8;
use crate::kernels::requant::{Epilogue, OutputLayout, OutputPacker};
use crate::tensor::OutputTensor;
use std::ops::Range;

/// Scalar evaluation of a partially filled patch buffer.
///
/// Each filled slot is reduced from scratch (bias seed included) with the same
/// epilogue as [`crate::kernels::matmul::matmul_batch`]; nothing is carried over
/// from earlier batched drains. Returns the number of output bytes stored.
pub fn tail_partial(
    patches: &PatchBuffer,
    weights: &[i8],
    channels: Range<usize>,
    epi: &Epilogue,
    layout: &OutputLayout,
    out: &OutputTensor,
) -> usize {
    let len = patches.patch_len();
    let mut written = 0;
    for slot in 0..patches.fill_level() {
        let patch = patches.patch(slot);
        let start = layout.offset(patches.pixel(slot), channels.start);
        let mut packer = OutputPacker::new(epi.precision(), start);
        for oc in channels.clone() {
            let sum = dot_u8_i8(patch, &weights[oc * len..(oc + 1) * len], epi.initial_sum(oc));
            packer.push(epi.quantize(sum, oc), out);
        }
        written += packer.cursor() - start;
    }
    written
}
