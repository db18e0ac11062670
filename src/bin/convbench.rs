use anyhow::{bail, Context, Result};
use clap::Parser;
use fusedconv::cluster::{conv2d, im2col_len, Cluster, CpuCopy};
use fusedconv::reference::conv2d_direct;
use fusedconv::{ConvLayer, PartitionStrategy, Precision, QuantParams};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "fusedconv-bench", version, about = "Run and time the parallel fused convolution kernel")]
struct Args {
    /// Layer description (JSON). Overrides the shape flags below
    #[arg(long)]
    layer: Option<PathBuf>,

    /// Input height and width
    #[arg(long, default_value_t = 16)]
    in_hw: usize,

    #[arg(long, default_value_t = 32)]
    in_ch: usize,

    #[arg(long, default_value_t = 32)]
    out_ch: usize,

    /// Square kernel size
    #[arg(long, default_value_t = 3)]
    kernel: usize,

    /// Padding on every side
    #[arg(long, default_value_t = 1)]
    pad: usize,

    #[arg(long, default_value_t = 1)]
    stride: usize,

    /// Input activation bits (1, 2, 4, 8)
    #[arg(long, default_value_t = 8)]
    in_bits: u32,

    /// Output activation bits (2, 4, 8)
    #[arg(long, default_value_t = 8)]
    out_bits: u32,

    /// channels | rows | rows_and_columns
    #[arg(long, default_value = "channels", value_parser = parse_strategy)]
    strategy: PartitionStrategy,

    #[arg(long, default_value_t = false)]
    relu: bool,

    #[arg(long, default_value_t = false)]
    batch_norm: bool,

    #[arg(long, default_value_t = false)]
    bias: bool,

    #[arg(long, default_value_t = 0)]
    bias_shift: u32,

    #[arg(long, default_value_t = 7)]
    out_shift: u32,

    #[arg(long, default_value_t = 1)]
    out_mult: i32,

    /// Cores in the team (power of two)
    #[arg(long, default_value_t = 8)]
    cores: usize,

    #[arg(long, default_value_t = 100)]
    iters: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Compare the result against the direct convolution
    #[arg(long, default_value_t = false)]
    verify: bool,

    /// Print the resolved layer as JSON and exit
    #[arg(long, default_value_t = false)]
    dump_layer: bool,
}

fn parse_strategy(s: &str) -> Result<PartitionStrategy, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|e| e.to_string())
}

fn precision(bits: u32) -> Result<Precision> {
    Precision::from_bits(bits).with_context(|| format!("unsupported precision: {} bits", bits))
}

fn resolve_layer(a: &Args) -> Result<ConvLayer> {
    if let Some(path) = a.layer.as_deref() {
        let text = std::fs::read_to_string(path).with_context(|| format!("read layer file: {}", path.display()))?;
        let raw: serde_json::Value = serde_json::from_str(&text).context("parse layer JSON")?;
        let explicit_output = raw.get("out_h").is_some() && raw.get("out_w").is_some();
        let layer: ConvLayer = serde_json::from_value(raw).context("decode layer")?;
        return Ok(if explicit_output { layer } else { layer.with_derived_output() });
    }
    let mut layer = ConvLayer::square(a.in_hw, a.in_hw, a.in_ch, a.out_ch, a.kernel, a.pad, a.stride);
    layer.input_precision = precision(a.in_bits)?;
    layer.output_precision = precision(a.out_bits)?;
    layer.strategy = a.strategy;
    layer.relu = a.relu;
    layer.batch_norm = a.batch_norm;
    Ok(layer)
}

fn main() -> Result<()> {
    env_logger::init();
    let a = Args::parse();
    let layer = resolve_layer(&a)?;
    if a.dump_layer {
        println!("{}", serde_json::to_string_pretty(&layer)?);
        return Ok(());
    }
    layer.validate().context("invalid layer")?;

    let mut rng = SmallRng::seed_from_u64(a.seed);
    let input: Vec<u8> = (0..layer.input_len()).map(|_| rng.gen()).collect();
    let weights: Vec<i8> = (0..layer.weights_len()).map(|_| rng.gen_range(-16i8..=16)).collect();
    let bias: Vec<i8> = (0..layer.out_ch).map(|_| rng.gen_range(-32i8..=32)).collect();
    let k: Vec<i64> = (0..layer.out_ch).map(|_| rng.gen_range(1i64..=4)).collect();
    let lambda: Vec<i64> = (0..layer.out_ch).map(|_| rng.gen_range(-512i64..=512)).collect();
    let quant = QuantParams {
        bias: a.bias.then_some(&bias[..]),
        bias_shift: a.bias_shift,
        out_shift: a.out_shift,
        out_mult: a.out_mult,
        k: Some(&k),
        lambda: Some(&lambda),
    };

    let cluster = Cluster::new(a.cores).context("create core team")?;
    let mut output = vec![0u8; layer.output_len()];
    let mut im2col = vec![0u8; im2col_len(&layer, a.cores)];

    eprintln!(
        "layer {}x{}x{} -> {}x{}x{} k{} on {} cores ({:?})",
        layer.in_h, layer.in_w, layer.in_ch, layer.out_h, layer.out_w, layer.out_ch, layer.kernel_h, a.cores, layer.strategy
    );
    let pb = ProgressBar::new(a.iters as u64);
    pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {elapsed_precise}").unwrap_or_else(|_| ProgressStyle::default_bar()));
    let t0 = Instant::now();
    let mut stats = Vec::new();
    for _ in 0..a.iters {
        stats = conv2d(&cluster, &layer, &input, &weights, &quant, &mut output, &mut im2col, &CpuCopy)?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    let dt = t0.elapsed().as_secs_f64();

    let macs = (layer.out_h * layer.out_w * layer.out_ch * layer.patch_len()) as f64 * a.iters as f64;
    let per_iter_ms = if a.iters > 0 { dt * 1e3 / a.iters as f64 } else { 0.0 };
    let gmacs = if dt > 0.0 { macs / dt / 1e9 } else { 0.0 };
    println!("iters={} elapsed={:.3}s per_iter={:.3}ms gmac_s={:.3}", a.iters, dt, per_iter_ms, gmacs);
    for s in &stats {
        println!(
            "core {}: rows {:?} cols {:?} channels {:?} batched={} tail={} bytes={}",
            s.core_id, s.slice.rows, s.slice.cols, s.slice.channels, s.batched_pixels, s.tail_pixels, s.bytes_written
        );
    }

    if a.verify {
        let expected = conv2d_direct(&layer, &input, &weights, &quant)?;
        let mismatches = expected.iter().zip(&output).filter(|(e, o)| e != o).count();
        if mismatches > 0 {
            bail!("{} of {} output bytes differ from the direct convolution", mismatches, expected.len());
        }
        println!("verify: ok ({} bytes)", expected.len());
    }
    Ok(())
}
