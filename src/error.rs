use crate::layer::Precision;
use thiserror::Error;

/// Configuration errors caught before any core enters the kernel body.
#[derive(Error, Debug)]
pub enum ConvError {
    #[error("{0} must be non-zero")]
    ZeroDimension(&'static str),
    #[error("output {got_h}x{got_w} does not fit the input, at most {max_h}x{max_w} is reachable")]
    OutputShape { got_h: usize, got_w: usize, max_h: usize, max_w: usize },
    #[error("{what} of {channels} is not aligned to {bits}-bit packing")]
    ChannelAlignment { what: &'static str, channels: usize, bits: u32 },
    #[error("unsupported output precision {0:?}")]
    OutputPrecision(Precision),
    #[error("{name} of {value} is out of range (must be < 32)")]
    Shift { name: &'static str, value: u32 },
    #[error("core count {0} is not a non-zero power of two")]
    CoreCount(usize),
    #[error("batch-norm folding enabled but k/lambda arrays are missing")]
    MissingBatchNorm,
    #[error("{name} holds {got} entries, expected {expected}")]
    ParamLength { name: &'static str, expected: usize, got: usize },
    #[error("{name} buffer holds {got} bytes, needs {needed}")]
    BufferTooSmall { name: &'static str, needed: usize, got: usize },
    #[error("failed to build core team")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
