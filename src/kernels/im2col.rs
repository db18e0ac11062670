use crate::cluster::MemCopy;
use crate::layer::ConvLayer;
use crate::tensor::FeatureMap;

/// Patches held by one core's staging buffer before it is drained.
pub const PATCH_SLOTS: usize = 2;

/// Where an output pixel sits relative to the padding border.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingZone {
    Top,
    Bottom,
    Left,
    Right,
    Interior,
}

/// Zone of output pixel `(oy, ox)`. Rows win over columns: a corner pixel is Top or Bottom.
#[inline]
pub fn classify(layer: &ConvLayer, oy: usize, ox: usize) -> PaddingZone {
    if oy < layer.pad_top {
        PaddingZone::Top
    } else if oy + layer.pad_bottom >= layer.out_h {
        PaddingZone::Bottom
    } else if ox < layer.pad_left {
        PaddingZone::Left
    } else if ox + layer.pad_right >= layer.out_w {
        PaddingZone::Right
    } else {
        PaddingZone::Interior
    }
}

/// Core-private double-length patch staging area with an explicit fill level.
pub struct PatchBuffer<'a> {
    buf: &'a mut [u8],
    patch_len: usize,
    fill: usize,
    pixels: [usize; PATCH_SLOTS],
}

impl<'a> PatchBuffer<'a> {
    /// Borrow the first `PATCH_SLOTS * patch_len` bytes of `buf`.
    pub fn new(buf: &'a mut [u8], patch_len: usize) -> Self {
        let buf = &mut buf[..PATCH_SLOTS * patch_len];
        Self { buf, patch_len, fill: 0, pixels: [0; PATCH_SLOTS] }
    }

    #[inline]
    pub fn patch_len(&self) -> usize { self.patch_len }

    #[inline]
    pub fn fill_level(&self) -> usize { self.fill }

    #[inline]
    pub fn is_full(&self) -> bool { self.fill == PATCH_SLOTS }

    #[inline]
    pub fn is_empty(&self) -> bool { self.fill == 0 }

    /// Claim the next free slot for output pixel `pixel` (row-major index).
    #[inline]
    pub fn next_slot(&mut self, pixel: usize) -> &mut [u8] {
        debug_assert!(!self.is_full(), "patch buffer must be drained before refilling");
        let slot = self.fill;
        self.pixels[slot] = pixel;
        self.fill += 1;
        &mut self.buf[slot * self.patch_len..(slot + 1) * self.patch_len]
    }

    #[inline]
    pub fn patch(&self, slot: usize) -> &[u8] {
        &self.buf[slot * self.patch_len..(slot + 1) * self.patch_len]
    }

    #[inline]
    pub fn pixel(&self, slot: usize) -> usize { self.pixels[slot] }

    #[inline]
    pub fn reset(&mut self) { self.fill = 0; }
}

/// Materialise the receptive field of output pixel `(oy, ox)` into `dst`
/// in `(ky, kx, channel)` order, zero-filling out-of-bounds positions.
#[inline]
pub fn fill_patch<M: MemCopy>(layer: &ConvLayer, input: &FeatureMap, oy: usize, ox: usize, dst: &mut [u8], dma: &M) {
    fill_patch_with(layer, input, oy, ox, dst, dma, true)
}

/// As [`fill_patch`]; `collapse_rows` enables whole-row copies for interior pixels.
#[allow(clippy::too_many_arguments)]
pub fn fill_patch_with<M: MemCopy>(
    layer: &ConvLayer,
    input: &FeatureMap,
    oy: usize,
    ox: usize,
    dst: &mut [u8],
    dma: &M,
    collapse_rows: bool,
) {
    let zone = classify(layer, oy, ox);
    let cin = layer.in_ch;
    let row_len = layer.kernel_w * cin;
    let y0 = (oy * layer.stride_y) as isize - layer.pad_top as isize;
    let x0 = (ox * layer.stride_x) as isize - layer.pad_left as isize;
    let row_inside = x0 >= 0 && x0 as usize + layer.kernel_w <= layer.in_w;
    let collapse = collapse_rows && zone == PaddingZone::Interior && row_inside;

    for (ky, row) in dst.chunks_exact_mut(row_len).enumerate() {
        let iy = y0 + ky as isize;
        if iy < 0 || iy as usize >= layer.in_h {
            dma.zero_bytes(row);
            continue;
        }
        let iy = iy as usize;
        if collapse {
            input.copy_run(iy, x0 as usize, row, dma);
            continue;
        }
        for (kx, cell) in row.chunks_exact_mut(cin).enumerate() {
            let ix = x0 + kx as isize;
            if ix < 0 || ix as usize >= layer.in_w {
                dma.zero_bytes(cell);
            } else {
                input.copy_run(iy, ix as usize, cell, dma);
            }
        }
    }
}
