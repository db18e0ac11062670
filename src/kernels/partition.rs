use crate::layer::{ConvLayer, PartitionStrategy};
use std::ops::Range;

/// Half-open slice `[start, stop)` of `n` owned by part `idx` of `parts`.
///
/// Chunks are `ceil(n / parts)` long and clamped to `n`, so earlier parts
/// absorb the remainder and trailing parts may be short or empty.
#[inline]
pub fn chunk_range(n: usize, parts: usize, idx: usize) -> Range<usize> {
    let chunk = n.div_ceil(parts.max(1));
    let start = (chunk * idx).min(n);
    let stop = (start + chunk).min(n);
    start..stop
}

/// Output box computed by one core: rows x columns x channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSlice {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
    pub channels: Range<usize>,
}

impl WorkSlice {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty() || self.channels.is_empty()
    }

    pub fn pixels(&self) -> usize {
        if self.is_empty() { 0 } else { self.rows.len() * self.cols.len() }
    }
}

/// Work slice of core `core_id` in a team of `cores` under the layer's strategy.
pub fn work_slice(layer: &ConvLayer, core_id: usize, cores: usize) -> WorkSlice {
    let all_rows = 0..layer.out_h;
    let all_cols = 0..layer.out_w;
    let all_channels = 0..layer.out_ch;
    match layer.strategy {
        PartitionStrategy::Channels => {
            // Split whole output bytes so no two cores pack into the same byte.
            let per_byte = layer.output_precision.per_byte();
            let groups = chunk_range(layer.out_ch / per_byte, cores, core_id);
            WorkSlice { rows: all_rows, cols: all_cols, channels: groups.start * per_byte..groups.end * per_byte }
        }
        PartitionStrategy::Rows => {
            WorkSlice { rows: chunk_range(layer.out_h, cores, core_id), cols: all_cols, channels: all_channels }
        }
        PartitionStrategy::RowsAndColumns => {
            let uneven = layer.out_h % cores != 0;
            if uneven && layer.out_w > 1 && cores >= 2 {
                let pairs = cores >> 1;
                let half = layer.out_w >> 1;
                let cols = if core_id & 1 == 0 { 0..half } else { half..layer.out_w };
                WorkSlice { rows: chunk_range(layer.out_h, pairs, core_id >> 1), cols, channels: all_channels }
            } else {
                WorkSlice { rows: chunk_range(layer.out_h, cores, core_id), cols: all_cols, channels: all_channels }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_range_front_loads_remainder() {
        let r: Vec<_> = (0..4).map(|c| chunk_range(10, 4, c)).collect();
        assert_eq!(r, vec![0..3, 3..6, 6..9, 9..10]);
    }

    #[test]
    fn chunk_range_fewer_items_than_parts() {
        let r: Vec<_> = (0..8).map(|c| chunk_range(3, 8, c)).collect();
        assert_eq!(&r[..3], &[0..1, 1..2, 2..3]);
        assert!(r[3..].iter().all(|x| x.is_empty()));
    }

    #[test]
    fn rows_and_columns_splits_uneven_rows() {
        let mut l = ConvLayer::pointwise(5, 6, 4, 4);
        l.strategy = PartitionStrategy::RowsAndColumns;
        let s0 = work_slice(&l, 0, 4);
        let s1 = work_slice(&l, 1, 4);
        let s2 = work_slice(&l, 2, 4);
        assert_eq!((s0.rows.clone(), s0.cols.clone()), (0..3, 0..3));
        assert_eq!((s1.rows.clone(), s1.cols.clone()), (0..3, 3..6));
        assert_eq!(s2.rows, 3..5);
    }

    #[test]
    fn idle_core_owns_no_pixels() {
        let l = ConvLayer::pointwise(3, 4, 4, 2);
        assert_eq!(work_slice(&l, 0, 4).pixels(), 12);
        let idle = work_slice(&l, 3, 4);
        assert!(idle.is_empty());
        assert_eq!(idle.pixels(), 0);
    }

    #[test]
    fn rows_and_columns_even_rows_behaves_like_rows() {
        let mut l = ConvLayer::pointwise(8, 6, 4, 4);
        l.strategy = PartitionStrategy::RowsAndColumns;
        assert_eq!(work_slice(&l, 1, 4), WorkSlice { rows: 2..4, cols: 0..6, channels: 0..4 });
    }
}
