use crate::error::ConvError;
use crate::kernels::conv::{conv_core, CoreStats};
use crate::kernels::primitives::zero_mem;
use crate::kernels::requant::{Epilogue, QuantParams};
use crate::layer::ConvLayer;
use crate::tensor::{FeatureMap, OutputTensor};
use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, PoisonError};

/// Identity and synchronisation of one core inside a fixed-size team.
pub trait Team {
    fn core_id(&self) -> usize;
    fn core_count(&self) -> usize;
    /// Block until every core of the team has arrived.
    fn barrier(&self);
}

/// Byte copy / zero-fill facility (software copy or a DMA engine).
pub trait MemCopy: Sync {
    fn copy_bytes(&self, src: &[u8], dst: &mut [u8]);
    fn zero_bytes(&self, dst: &mut [u8]);
}

/// Plain processor copies.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuCopy;

impl MemCopy for CpuCopy {
    #[inline]
    fn copy_bytes(&self, src: &[u8], dst: &mut [u8]) { dst.copy_from_slice(src); }

    #[inline]
    fn zero_bytes(&self, dst: &mut [u8]) { zero_mem(dst); }
}

/// One core position of a team executed on its own, without real peers.
///
/// The barrier returns immediately, so the positions of a team can be run
/// one after another on a single thread.
#[derive(Debug, Clone, Copy)]
pub struct SoloCore {
    pub id: usize,
    pub count: usize,
}

impl SoloCore {
    pub fn new(id: usize, count: usize) -> Self { Self { id, count } }

    pub fn single() -> Self { Self { id: 0, count: 1 } }
}

impl Team for SoloCore {
    fn core_id(&self) -> usize { self.id }
    fn core_count(&self) -> usize { self.count }
    fn barrier(&self) {}
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: usize,
    released: bool,
}

/// Reusable team barrier that a failing core can open for good, so its
/// peers never wait on an arrival that will not come.
struct TeamBarrier {
    cores: usize,
    state: Mutex<BarrierState>,
    wake: Condvar,
}

impl TeamBarrier {
    fn new(cores: usize) -> Self {
        Self { cores, state: Mutex::new(BarrierState::default()), wake: Condvar::new() }
    }

    fn wait(&self) {
        let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if s.released {
            return;
        }
        s.arrived += 1;
        if s.arrived == self.cores {
            s.arrived = 0;
            s.generation = s.generation.wrapping_add(1);
            self.wake.notify_all();
            return;
        }
        let generation = s.generation;
        while s.generation == generation && !s.released {
            s = self.wake.wait(s).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Let every current and future waiter through.
    fn release(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).released = true;
        self.wake.notify_all();
    }
}

/// A member of a running [`Cluster`] team.
pub struct ClusterCore<'a> {
    id: usize,
    count: usize,
    barrier: &'a TeamBarrier,
}

impl Team for ClusterCore<'_> {
    fn core_id(&self) -> usize { self.id }
    fn core_count(&self) -> usize { self.count }
    fn barrier(&self) { self.barrier.wait(); }
}

/// Fixed-size team of worker threads, one per core.
pub struct Cluster {
    pool: ThreadPool,
    cores: usize,
}

impl Cluster {
    pub fn new(cores: usize) -> Result<Self, ConvError> {
        if cores == 0 || !cores.is_power_of_two() {
            return Err(ConvError::CoreCount(cores));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(cores)
            .thread_name(|i| format!("conv-core-{}", i))
            .build()?;
        Ok(Self { pool, cores })
    }

    pub fn cores(&self) -> usize { self.cores }

    /// Run `body` once on every core, SPMD style; results are ordered by core id.
    ///
    /// A panic on one core opens the team barrier for the others and is
    /// re-raised on the caller once every core has returned.
    pub fn run<R, F>(&self, body: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&ClusterCore) -> R + Sync,
    {
        let barrier = TeamBarrier::new(self.cores);
        let results = self.pool.broadcast(|ctx| {
            let core = ClusterCore { id: ctx.index(), count: ctx.num_threads(), barrier: &barrier };
            let result = panic::catch_unwind(AssertUnwindSafe(|| body(&core)));
            if result.is_err() {
                barrier.release();
            }
            result
        });
        results.into_iter().map(|r| r.unwrap_or_else(|payload| panic::resume_unwind(payload))).collect()
    }
}

/// Patch staging bytes a team of `cores` needs for `layer`.
pub fn im2col_len(layer: &ConvLayer, cores: usize) -> usize {
    cores * layer.im2col_len_per_core()
}

fn check_len(name: &'static str, needed: usize, got: usize) -> Result<(), ConvError> {
    if got < needed { Err(ConvError::BufferTooSmall { name, needed, got }) } else { Ok(()) }
}

fn check_call(layer: &ConvLayer, cores: usize, input: &[u8], weights: &[i8], output: &[u8], im2col: &[u8]) -> Result<(), ConvError> {
    if cores == 0 || !cores.is_power_of_two() {
        return Err(ConvError::CoreCount(cores));
    }
    layer.validate()?;
    check_len("input", layer.input_len(), input.len())?;
    if weights.len() < layer.weights_len() {
        return Err(ConvError::ParamLength { name: "weights", expected: layer.weights_len(), got: weights.len() });
    }
    check_len("output", layer.output_len(), output.len())?;
    check_len("im2col", im2col_len(layer, cores), im2col.len())?;
    Ok(())
}

/// Validate the call, then run the convolution on every core of `cluster`.
///
/// `im2col` is carved into one private `2 * in_ch * kernel_h * kernel_w`
/// region per core (see [`im2col_len`]).
#[allow(clippy::too_many_arguments)]
pub fn conv2d<M: MemCopy>(
    cluster: &Cluster,
    layer: &ConvLayer,
    input: &[u8],
    weights: &[i8],
    quant: &QuantParams,
    output: &mut [u8],
    im2col: &mut [u8],
    dma: &M,
) -> Result<Vec<CoreStats>, ConvError> {
    let cores = cluster.cores();
    check_call(layer, cores, input, weights, output, im2col)?;
    let epi = Epilogue::new(layer, quant)?;
    debug!(
        "conv2d {}x{}x{} -> {}x{}x{} k{}x{} s{}x{} on {} cores ({:?}, {:?} -> {:?})",
        layer.in_h, layer.in_w, layer.in_ch, layer.out_h, layer.out_w, layer.out_ch,
        layer.kernel_h, layer.kernel_w, layer.stride_y, layer.stride_x, cores,
        layer.strategy, layer.input_precision, layer.output_precision
    );

    let per_core = layer.im2col_len_per_core();
    let scratch: Vec<Mutex<&mut [u8]>> = im2col.chunks_mut(per_core).take(cores).map(Mutex::new).collect();
    let fm = FeatureMap::new(input, layer);
    let out = OutputTensor::new(output);
    let stats = cluster.run(|core| {
        let mut buf = scratch[core.core_id()].lock().unwrap_or_else(PoisonError::into_inner);
        conv_core(core, layer, &fm, weights, &epi, &out, &mut **buf, dma)
    });
    Ok(stats)
}

/// Run every core position of a `cores`-wide team one after another on the
/// calling thread. Produces the same output as [`conv2d`].
#[allow(clippy::too_many_arguments)]
pub fn conv2d_sequential<M: MemCopy>(
    cores: usize,
    layer: &ConvLayer,
    input: &[u8],
    weights: &[i8],
    quant: &QuantParams,
    output: &mut [u8],
    im2col: &mut [u8],
    dma: &M,
) -> Result<Vec<CoreStats>, ConvError> {
    check_call(layer, cores, input, weights, output, im2col)?;
    let epi = Epilogue::new(layer, quant)?;
    let fm = FeatureMap::new(input, layer);
    let out = OutputTensor::new(output);
    let stats = im2col
        .chunks_mut(layer.im2col_len_per_core())
        .take(cores)
        .enumerate()
        .map(|(id, buf)| conv_core(&SoloCore::new(id, cores), layer, &fm, weights, &epi, &out, buf, dma))
        .collect();
    Ok(stats)
}
