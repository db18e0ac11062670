//! Per-core convolution engine: partitioning, patch extraction, batched
//! matmul with fused requantization, and the scalar tail path.
pub mod primitives;
pub mod partition;
pub mod im2col;
pub mod requant;
pub mod matmul;
pub mod tail;
pub mod conv;

pub use conv::{conv_core, CoreStats};
