// Fused quantized convolution kernels for a fixed-size multicore cluster
pub mod error;
pub mod layer;
pub mod tensor;
pub mod kernels;
pub mod cluster;
pub mod reference;

pub use cluster::{conv2d, im2col_len, Cluster, CpuCopy, MemCopy, SoloCore, Team};
pub use error::ConvError;
pub use kernels::requant::QuantParams;
pub use layer::{ConvLayer, PartitionStrategy, Precision};
