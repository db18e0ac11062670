use crate::error::ConvError;
use serde::{Deserialize, Serialize};

/// Bits per activation element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    U1,
    U2,
    U4,
    U8,
}

impl Precision {
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            Precision::U1 => 1,
            Precision::U2 => 2,
            Precision::U4 => 4,
            Precision::U8 => 8,
        }
    }

    /// Logical elements stored in one physical byte.
    #[inline]
    pub fn per_byte(self) -> usize { (8 / self.bits()) as usize }

    /// Saturation ceiling of an unsigned value at this width.
    #[inline]
    pub fn max_value(self) -> u8 { ((1u16 << self.bits()) - 1) as u8 }

    /// Bytes needed for `elems` packed elements (`elems` must be a multiple of `per_byte`).
    #[inline]
    pub fn bytes_for(self, elems: usize) -> usize { elems / self.per_byte() }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(Precision::U1),
            2 => Some(Precision::U2),
            4 => Some(Precision::U4),
            8 => Some(Precision::U8),
            _ => None,
        }
    }
}

/// Output axis split across the cores of a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Every core walks all pixels for its own slice of output channels.
    Channels,
    /// Every core computes all channels for its own band of output rows.
    Rows,
    /// Row bands per core pair, each pair splitting its band into left/right column halves
    /// when the rows do not divide evenly.
    RowsAndColumns,
}

/// Geometry, precision pairing and epilogue flags of one convolution layer.
///
/// Tensors are channel-interleaved: input is (in_h, in_w, in_ch), weights are
/// (out_ch, kernel_h, kernel_w, in_ch), output is (out_h, out_w, out_ch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvLayer {
    pub in_h: usize,
    pub in_w: usize,
    pub in_ch: usize,
    pub out_ch: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub pad_top: usize,
    pub pad_bottom: usize,
    pub pad_left: usize,
    pub pad_right: usize,
    pub stride_y: usize,
    pub stride_x: usize,
    pub out_h: usize,
    pub out_w: usize,
    pub relu: bool,
    pub batch_norm: bool,
    pub input_precision: Precision,
    pub output_precision: Precision,
    pub strategy: PartitionStrategy,
}

impl Default for ConvLayer {
    fn default() -> Self {
        Self {
            in_h: 1,
            in_w: 1,
            in_ch: 1,
            out_ch: 1,
            kernel_h: 1,
            kernel_w: 1,
            pad_top: 0,
            pad_bottom: 0,
            pad_left: 0,
            pad_right: 0,
            stride_y: 1,
            stride_x: 1,
            out_h: 1,
            out_w: 1,
            relu: false,
            batch_norm: false,
            input_precision: Precision::U8,
            output_precision: Precision::U8,
            strategy: PartitionStrategy::Channels,
        }
    }
}

impl ConvLayer {
    /// 1x1, stride 1, unpadded layer.
    pub fn pointwise(in_h: usize, in_w: usize, in_ch: usize, out_ch: usize) -> Self {
        Self { in_h, in_w, in_ch, out_ch, out_h: in_h, out_w: in_w, ..Self::default() }
    }

    /// Square kernel with symmetric padding and stride; output shape derived.
    pub fn square(in_h: usize, in_w: usize, in_ch: usize, out_ch: usize, kernel: usize, pad: usize, stride: usize) -> Self {
        Self {
            in_h, in_w, in_ch, out_ch,
            kernel_h: kernel, kernel_w: kernel,
            pad_top: pad, pad_bottom: pad, pad_left: pad, pad_right: pad,
            stride_y: stride, stride_x: stride,
            ..Self::default()
        }
        .with_derived_output()
    }

    /// Largest output shape the padded input supports.
    pub fn derived_output(&self) -> (usize, usize) {
        fn axis(input: usize, lo: usize, hi: usize, k: usize, stride: usize) -> usize {
            let span = input + lo + hi;
            if span < k || stride == 0 { 0 } else { (span - k) / stride + 1 }
        }
        (
            axis(self.in_h, self.pad_top, self.pad_bottom, self.kernel_h, self.stride_y),
            axis(self.in_w, self.pad_left, self.pad_right, self.kernel_w, self.stride_x),
        )
    }

    pub fn with_derived_output(mut self) -> Self {
        let (h, w) = self.derived_output();
        self.out_h = h;
        self.out_w = w;
        self
    }

    /// Flattened receptive field: one patch in the im2col buffer, in bytes.
    #[inline]
    pub fn patch_len(&self) -> usize { self.in_ch * self.kernel_h * self.kernel_w }

    /// Double-buffered patch staging area required by one core.
    #[inline]
    pub fn im2col_len_per_core(&self) -> usize { 2 * self.patch_len() }

    #[inline]
    pub fn weights_len(&self) -> usize { self.out_ch * self.patch_len() }

    #[inline]
    pub fn input_len(&self) -> usize { self.input_precision.bytes_for(self.in_h * self.in_w * self.in_ch) }

    #[inline]
    pub fn output_len(&self) -> usize { self.output_precision.bytes_for(self.out_h * self.out_w * self.out_ch) }

    /// Bytes of one output pixel (all channels).
    #[inline]
    pub fn output_pixel_bytes(&self) -> usize { self.output_precision.bytes_for(self.out_ch) }

    pub fn validate(&self) -> Result<(), ConvError> {
        let dims: [(&'static str, usize); 8] = [
            ("in_h", self.in_h), ("in_w", self.in_w), ("in_ch", self.in_ch), ("out_ch", self.out_ch),
            ("kernel_h", self.kernel_h), ("kernel_w", self.kernel_w),
            ("stride_y", self.stride_y), ("stride_x", self.stride_x),
        ];
        for (name, v) in dims {
            if v == 0 { return Err(ConvError::ZeroDimension(name)); }
        }
        let (max_h, max_w) = self.derived_output();
        if self.out_h > max_h || self.out_w > max_w {
            return Err(ConvError::OutputShape { got_h: self.out_h, got_w: self.out_w, max_h, max_w });
        }
        if self.output_precision == Precision::U1 {
            return Err(ConvError::OutputPrecision(self.output_precision));
        }
        let ib = self.input_precision;
        if self.in_ch % ib.per_byte() != 0 {
            return Err(ConvError::ChannelAlignment { what: "in_ch", channels: self.in_ch, bits: ib.bits() });
        }
        let ob = self.output_precision;
        if self.out_ch % ob.per_byte() != 0 {
            return Err(ConvError::ChannelAlignment { what: "out_ch", channels: self.out_ch, bits: ob.bits() });
        }
        Ok(())
    }
}
