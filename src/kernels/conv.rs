use crate::cluster::{MemCopy, Team};
use crate::kernels::im2col::{fill_patch, PatchBuffer, PATCH_SLOTS};
use crate::kernels::matmul::matmul_batch;
use crate::kernels::partition::{work_slice, WorkSlice};
use crate::kernels::requant::{Epilogue, OutputLayout};
use crate::kernels::tail::tail_partial;
use crate::layer::ConvLayer;
use crate::tensor::{FeatureMap, OutputTensor};
use log::trace;

/// What one core did during a kernel call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStats {
    pub core_id: usize,
    pub slice: WorkSlice,
    pub batched_pixels: usize,
    pub tail_pixels: usize,
    pub bytes_written: usize,
}

/// SPMD kernel body run by every core of `team`.
///
/// Walks this core's work slice, staging patches into `im2col` (this core's
/// private `2 * patch_len` bytes) and draining them through the batched matmul
/// every `PATCH_SLOTS` pixels; a leftover partial fill goes through the scalar
/// tail path. Ends on the team barrier, even when the slice is empty.
#[allow(clippy::too_many_arguments)]
pub fn conv_core<T: Team, M: MemCopy>(
    team: &T,
    layer: &ConvLayer,
    input: &FeatureMap,
    weights: &[i8],
    epi: &Epilogue,
    out: &OutputTensor,
    im2col: &mut [u8],
    dma: &M,
) -> CoreStats {
    let core_id = team.core_id();
    let slice = work_slice(layer, core_id, team.core_count());
    let layout = OutputLayout::new(layer);
    let mut patches = PatchBuffer::new(im2col, layer.patch_len());
    let mut stats = CoreStats { core_id, slice: slice.clone(), batched_pixels: 0, tail_pixels: 0, bytes_written: 0 };

    if !slice.is_empty() {
        for oy in slice.rows.clone() {
            for ox in slice.cols.clone() {
                let dst = patches.next_slot(oy * layer.out_w + ox);
                fill_patch(layer, input, oy, ox, dst, dma);
                if patches.is_full() {
                    stats.bytes_written += matmul_batch(&patches, weights, slice.channels.clone(), epi, &layout, out);
                    stats.batched_pixels += PATCH_SLOTS;
                    patches.reset();
                }
            }
        }
        if !patches.is_empty() {
            stats.tail_pixels += patches.fill_level();
            stats.bytes_written += tail_partial(&patches, weights, slice.channels.clone(), epi, &layout, out);
            patches.reset();
        }
    }

    debug_assert_eq!(stats.batched_pixels + stats.tail_pixels, slice.pixels());
    trace!(
        "core {}/{}: rows {:?} cols {:?} channels {:?}, {} batched + {} tail pixels, {} bytes",
        core_id, team.core_count(), slice.rows, slice.cols, slice.channels,
        stats.batched_pixels, stats.tail_pixels, stats.bytes_written
    );
    team.barrier();
    stats
}
