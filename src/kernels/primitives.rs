//! Scalar stand-ins for the cluster's fused DSP instructions.
//!
//! Each function documents the numeric contract; a target with native
//! dot-product or bit-manipulation instructions may back them with intrinsics.

/// Saturate `x` into `[0, max]`.
#[inline(always)]
pub fn clip_u(x: i64, max: u8) -> u8 {
    x.clamp(0, max as i64) as u8
}

/// 4-lane unsigned x signed dot product accumulated into `acc`.
///
/// The accumulator wraps in 32-bit two's complement like the hardware one;
/// each lane product fits in i32 on its own.
#[inline(always)]
pub fn sdotusp4(a: [u8; 4], b: [i8; 4], acc: i32) -> i32 {
    let lanes = (a[0] as i32) * (b[0] as i32)
        + (a[1] as i32) * (b[1] as i32)
        + (a[2] as i32) * (b[2] as i32)
        + (a[3] as i32) * (b[3] as i32);
    acc.wrapping_add(lanes)
}

/// Dot product of a patch against one weight row: groups of four through
/// [`sdotusp4`], then a scalar loop over the trailing 0..=3 elements.
#[inline]
pub fn dot_u8_i8(patch: &[u8], weights: &[i8], mut acc: i32) -> i32 {
    debug_assert_eq!(patch.len(), weights.len());
    let mut pc = patch.chunks_exact(4);
    let mut wc = weights.chunks_exact(4);
    for (p, w) in (&mut pc).zip(&mut wc) {
        acc = sdotusp4([p[0], p[1], p[2], p[3]], [w[0], w[1], w[2], w[3]], acc);
    }
    for (&p, &w) in pc.remainder().iter().zip(wc.remainder()) {
        acc = acc.wrapping_add((p as i32) * (w as i32));
    }
    acc
}

/// Insert the low `width` bits of `src` into `dst` at bit `offset`.
#[inline(always)]
pub fn bit_insert(dst: u8, src: u8, width: u32, offset: u32) -> u8 {
    let mask = (((1u16 << width) - 1) as u8) << offset;
    (dst & !mask) | ((src << offset) & mask)
}

/// Extract `width` bits of `x` starting at bit `offset`.
#[inline(always)]
pub fn bit_extract(x: u8, width: u32, offset: u32) -> u8 {
    (x >> offset) & (((1u16 << width) - 1) as u8)
}

/// Half-LSB rounding constant for a right shift by `shift`.
#[inline(always)]
pub fn round_const(shift: u32) -> i32 {
    if shift == 0 { 0 } else { 1 << (shift - 1) }
}

#[inline]
pub fn zero_mem(dst: &mut [u8]) {
    dst.fill(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_saturates_both_ends() {
        assert_eq!(clip_u(-7, 255), 0);
        assert_eq!(clip_u(300, 255), 255);
        assert_eq!(clip_u(2, 3), 2);
        assert_eq!(clip_u(9, 3), 3);
    }

    #[test]
    fn sdotusp4_mixes_signedness() {
        assert_eq!(sdotusp4([255, 1, 2, 3], [-1, 127, -128, 0], 10), 10 - 255 + 127 - 256);
    }

    #[test]
    fn dot_handles_tail_lengths() {
        for n in 0..11usize {
            let p: Vec<u8> = (0..n).map(|i| (i * 37 % 256) as u8).collect();
            let w: Vec<i8> = (0..n).map(|i| (i as i32 * 13 % 255 - 127) as i8).collect();
            let naive: i32 = p.iter().zip(&w).map(|(&a, &b)| a as i32 * b as i32).sum();
            assert_eq!(dot_u8_i8(&p, &w, 5), naive + 5, "len {}", n);
        }
    }

    #[test]
    fn insert_then_extract() {
        let b = bit_insert(0b1111_1111, 0b01, 2, 4);
        assert_eq!(b, 0b1101_1111);
        assert_eq!(bit_extract(b, 2, 4), 0b01);
        assert_eq!(bit_extract(0xA5, 4, 4), 0xA);
    }

    #[test]
    fn accumulator_wraps_instead_of_overflowing() {
        assert_eq!(sdotusp4([255; 4], [127; 4], i32::MAX), i32::MIN + 129_539);
        assert_eq!(dot_u8_i8(&[255; 5], &[-128; 5], i32::MIN), i32::MAX - 163_199);
    }

    #[test]
    fn round_const_zero_shift() {
        assert_eq!(round_const(0), 0);
        assert_eq!(round_const(1), 1);
        assert_eq!(round_const(8), 128);
    }
}
