use crate::error::ConvError;
use crate::kernels::primitives::{bit_insert, clip_u, round_const};
use crate::layer::{ConvLayer, Precision};
use crate::tensor::OutputTensor;

/// Per-channel and global quantization parameters of a layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantParams<'a> {
    pub bias: Option<&'a [i8]>,
    pub bias_shift: u32,
    pub out_shift: u32,
    /// Output multiplier for the relu-only path.
    pub out_mult: i32,
    /// Batch-norm folded scale, one per output channel.
    pub k: Option<&'a [i64]>,
    /// Batch-norm folded offset, one per output channel.
    pub lambda: Option<&'a [i64]>,
}

/// Requantization path selected by the relu / batch-norm flags.
#[derive(Debug, Clone, Copy)]
pub enum Requant<'a> {
    BatchNormRelu { k: &'a [i64], lambda: &'a [i64] },
    Relu { mult: i32 },
    ShiftClip,
}

#[inline(always)]
pub fn quant_batch_norm(sum: i32, k: i64, lambda: i64, shift: u32, max: u8) -> u8 {
    clip_u((k * sum as i64 + lambda) >> shift, max)
}

#[inline(always)]
pub fn quant_relu(sum: i32, mult: i32, shift: u32, max: u8) -> u8 {
    clip_u((sum as i64 * mult as i64) >> shift, max)
}

#[inline(always)]
pub fn quant_shift(sum: i32, shift: u32, max: u8) -> u8 {
    clip_u((sum >> shift) as i64, max)
}

/// Fused accumulator seed plus requantization, resolved once per kernel call.
#[derive(Debug, Clone, Copy)]
pub struct Epilogue<'a> {
    requant: Requant<'a>,
    bias: Option<&'a [i8]>,
    bias_shift: u32,
    out_shift: u32,
    precision: Precision,
}

impl<'a> Epilogue<'a> {
    pub fn new(layer: &ConvLayer, q: &QuantParams<'a>) -> Result<Self, ConvError> {
        for (name, value) in [("bias_shift", q.bias_shift), ("out_shift", q.out_shift)] {
            if value >= 32 { return Err(ConvError::Shift { name, value }); }
        }
        if let Some(b) = q.bias {
            if b.len() < layer.out_ch {
                return Err(ConvError::ParamLength { name: "bias", expected: layer.out_ch, got: b.len() });
            }
        }
        let requant = if layer.batch_norm && layer.relu {
            let (Some(k), Some(lambda)) = (q.k, q.lambda) else { return Err(ConvError::MissingBatchNorm) };
            for (name, arr) in [("k", k), ("lambda", lambda)] {
                if arr.len() < layer.out_ch {
                    return Err(ConvError::ParamLength { name, expected: layer.out_ch, got: arr.len() });
                }
            }
            Requant::BatchNormRelu { k, lambda }
        } else if layer.relu {
            Requant::Relu { mult: q.out_mult }
        } else {
            Requant::ShiftClip
        };
        Ok(Self { requant, bias: q.bias, bias_shift: q.bias_shift, out_shift: q.out_shift, precision: layer.output_precision })
    }

    #[inline]
    pub fn requant(&self) -> Requant<'a> { self.requant }

    #[inline]
    pub fn precision(&self) -> Precision { self.precision }

    /// Accumulator seed for channel `oc`: shifted bias plus rounding constant, or zero.
    /// Wraps in 32 bits like the dot-product accumulator it seeds.
    #[inline(always)]
    pub fn initial_sum(&self, oc: usize) -> i32 {
        match self.bias {
            Some(b) => (b[oc] as i32).wrapping_shl(self.bias_shift).wrapping_add(round_const(self.out_shift)),
            None => 0,
        }
    }

    #[inline(always)]
    pub fn quantize(&self, sum: i32, oc: usize) -> u8 {
        let max = self.precision.max_value();
        match self.requant {
            Requant::BatchNormRelu { k, lambda } => quant_batch_norm(sum, k[oc], lambda[oc], self.out_shift, max),
            Requant::Relu { mult } => quant_relu(sum, mult, self.out_shift, max),
            Requant::ShiftClip => quant_shift(sum, self.out_shift, max),
        }
    }
}

/// Byte addressing of the (out_h, out_w, out_ch) output tensor.
#[derive(Debug, Clone, Copy)]
pub struct OutputLayout {
    pixel_bytes: usize,
    per_byte: usize,
}

impl OutputLayout {
    pub fn new(layer: &ConvLayer) -> Self {
        Self { pixel_bytes: layer.output_pixel_bytes(), per_byte: layer.output_precision.per_byte() }
    }

    /// Byte holding channel `channel` of row-major output pixel `pixel`.
    #[inline]
    pub fn offset(&self, pixel: usize, channel: usize) -> usize {
        pixel * self.pixel_bytes + channel / self.per_byte
    }
}

/// Collects consecutive channel values and stores them as packed bytes.
pub struct OutputPacker {
    bits: u32,
    per_byte: usize,
    slots: [u8; 4],
    fill: usize,
    cursor: usize,
}

impl OutputPacker {
    pub fn new(precision: Precision, cursor: usize) -> Self {
        Self { bits: precision.bits(), per_byte: precision.per_byte(), slots: [0; 4], fill: 0, cursor }
    }

    /// Next byte to be written.
    #[inline]
    pub fn cursor(&self) -> usize { self.cursor }

    /// Queue one quantized value; stores a byte once `8 / bits` values are queued.
    #[inline(always)]
    pub fn push(&mut self, value: u8, out: &OutputTensor) {
        if self.per_byte == 1 {
            out.store(self.cursor, value);
            self.cursor += 1;
            return;
        }
        self.slots[self.fill] = value;
        self.fill += 1;
        if self.fill == self.per_byte {
            let mut byte = self.slots[0];
            for i in 1..self.per_byte {
                byte = bit_insert(byte, self.slots[i], self.bits, self.bits * i as u32);
            }
            out.store(self.cursor, byte);
            self.cursor += 1;
            self.fill = 0;
        }
    }
}
