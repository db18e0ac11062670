use crate::cluster::MemCopy;
use crate::kernels::primitives::{bit_extract, bit_insert};
use crate::layer::{ConvLayer, Precision};
use std::sync::atomic::{AtomicU8, Ordering};

/// Read-only input activations, channel-interleaved (height, width, channels).
#[derive(Clone, Copy)]
pub struct FeatureMap<'a> {
    pub data: &'a [u8],
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub precision: Precision,
}

impl<'a> FeatureMap<'a> {
    pub fn new(data: &'a [u8], layer: &ConvLayer) -> Self {
        Self { data, height: layer.in_h, width: layer.in_w, channels: layer.in_ch, precision: layer.input_precision }
    }

    /// Expand `dst.len()` consecutive elements starting at pixel `(y, x)` into
    /// one byte each. Runs may cross pixel boundaries along a row.
    #[inline]
    pub fn copy_run<M: MemCopy>(&self, y: usize, x: usize, dst: &mut [u8], dma: &M) {
        let first = (y * self.width + x) * self.channels;
        match self.precision {
            Precision::U8 => dma.copy_bytes(&self.data[first..first + dst.len()], dst),
            p => {
                let bits = p.bits();
                let per_byte = p.per_byte();
                for (i, d) in dst.iter_mut().enumerate() {
                    let e = first + i;
                    *d = bit_extract(self.data[e / per_byte], bits, ((e % per_byte) as u32) * bits);
                }
            }
        }
    }
}

/// Output bytes shared by a core team.
///
/// Cores store into disjoint bytes during the main loop; the team barrier
/// publishes every store before the caller regains the underlying slice.
#[derive(Clone, Copy)]
pub struct OutputTensor<'a> {
    bytes: &'a [AtomicU8],
}

impl<'a> OutputTensor<'a> {
    pub fn new(out: &'a mut [u8]) -> Self {
        // SAFETY: AtomicU8 has the size, alignment and bit validity of u8, and the
        // exclusive borrow guarantees no non-atomic access for the lifetime 'a.
        let bytes = unsafe { &*(out as *mut [u8] as *const [AtomicU8]) };
        Self { bytes }
    }

    #[inline]
    pub fn len(&self) -> usize { self.bytes.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    #[inline]
    pub fn store(&self, index: usize, value: u8) {
        self.bytes[index].store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self, index: usize) -> u8 {
        self.bytes[index].load(Ordering::Relaxed)
    }
}

/// Pack one-value-per-byte `values` at `precision`, lowest element in the lowest bits.
pub fn pack(values: &[u8], precision: Precision) -> Vec<u8> {
    let per_byte = precision.per_byte();
    let bits = precision.bits();
    values
        .chunks(per_byte)
        .map(|group| {
            group.iter().enumerate().fold(0u8, |b, (i, &v)| bit_insert(b, v, bits, i as u32 * bits))
        })
        .collect()
}

/// Inverse of [`pack`] for `count` logical elements.
pub fn unpack(bytes: &[u8], precision: Precision, count: usize) -> Vec<u8> {
    let per_byte = precision.per_byte();
    let bits = precision.bits();
    (0..count)
        .map(|e| bit_extract(bytes[e / per_byte], bits, ((e % per_byte) as u32) * bits))
        .collect()
}
