use fusedconv::cluster::{conv2d_sequential, im2col_len, CpuCopy};
use fusedconv::kernels::CoreStats;
use fusedconv::reference::conv2d_direct;
use fusedconv::{ConvLayer, PartitionStrategy, Precision, QuantParams};
use pretty_assertions::assert_eq;

fn lcg_bytes(seed: u64, n: usize) -> Vec<u8> {
    let mut s = seed;
    (0..n).map(|_| { s = s.wrapping_mul(6364136223846793005).wrapping_add(1); (s >> 40) as u8 }).collect()
}

fn run(cores: usize, layer: &ConvLayer, input: &[u8], weights: &[i8], quant: &QuantParams) -> (Vec<u8>, Vec<CoreStats>) {
    let mut out = vec![0u8; layer.output_len()];
    let mut im2col = vec![0u8; im2col_len(layer, cores)];
    let stats = conv2d_sequential(cores, layer, input, weights, quant, &mut out, &mut im2col, &CpuCopy).unwrap();
    (out, stats)
}

#[test]
fn odd_pixel_count_goes_through_tail_and_matches_batched_pixels() {
    // 5x6 input, 3x3 kernel, no padding: full output is 3x4 (12 pixels, even).
    let mut wide = ConvLayer::square(5, 6, 6, 8, 3, 0, 1);
    wide.relu = true;
    wide.batch_norm = true;
    wide.strategy = PartitionStrategy::Rows;
    assert_eq!((wide.out_h, wide.out_w), (3, 4));
    // Same layer cut to 3x3 (9 pixels): the last pixel is left in a half-full buffer.
    let narrow = ConvLayer { out_w: 3, ..wide.clone() };

    let input = lcg_bytes(21, wide.input_len());
    let weights: Vec<i8> = lcg_bytes(22, wide.weights_len()).into_iter().map(|b| b as i8 / 4).collect();
    let bias: Vec<i8> = lcg_bytes(23, wide.out_ch).into_iter().map(|b| b as i8 / 2).collect();
    let k: Vec<i64> = (1..=8).collect();
    let lambda: Vec<i64> = (0..8).map(|i| i * 37 - 100).collect();
    let quant = QuantParams { bias: Some(&bias), bias_shift: 3, out_shift: 9, out_mult: 1, k: Some(&k), lambda: Some(&lambda) };

    let (full, full_stats) = run(1, &wide, &input, &weights, &quant);
    let (cut, cut_stats) = run(1, &narrow, &input, &weights, &quant);
    assert_eq!(full_stats[0].tail_pixels, 0);
    assert_eq!(cut_stats[0].tail_pixels, 1);
    assert_eq!(cut_stats[0].batched_pixels, 8);

    let ch = wide.out_ch;
    for y in 0..3 {
        for x in 0..3 {
            assert_eq!(&cut[(y * 3 + x) * ch..(y * 3 + x + 1) * ch], &full[(y * 4 + x) * ch..(y * 4 + x + 1) * ch], "pixel ({}, {})", y, x);
        }
    }
}

#[test]
fn tail_recomputes_bias_from_scratch() {
    // Every core of a channel split ends with one leftover pixel.
    let mut layer = ConvLayer::square(3, 3, 3, 16, 3, 1, 1);
    layer.output_precision = Precision::U4;
    let input = lcg_bytes(31, layer.input_len());
    let weights: Vec<i8> = lcg_bytes(32, layer.weights_len()).into_iter().map(|b| b as i8 / 8).collect();
    let bias: Vec<i8> = lcg_bytes(33, layer.out_ch).into_iter().map(|b| b as i8).collect();
    let quant = QuantParams { bias: Some(&bias), bias_shift: 4, out_shift: 8, ..QuantParams::default() };

    let (out, stats) = run(4, &layer, &input, &weights, &quant);
    assert!(stats.iter().all(|s| s.tail_pixels == 1));
    assert_eq!(out, conv2d_direct(&layer, &input, &weights, &quant).unwrap());
}

#[test]
fn row_split_tails_land_on_the_right_rows() {
    let mut layer = ConvLayer::square(5, 3, 4, 4, 3, 1, 1);
    layer.strategy = PartitionStrategy::Rows;
    layer.relu = true;
    let input = lcg_bytes(41, layer.input_len());
    let weights: Vec<i8> = lcg_bytes(42, layer.weights_len()).into_iter().map(|b| b as i8 / 16).collect();
    let quant = QuantParams { out_mult: 1, out_shift: 2, ..QuantParams::default() };

    let (out, stats) = run(4, &layer, &input, &weights, &quant);
    // rows split 2/2/1/0 over 3 columns: 6, 6, 3, 0 pixels
    let tails: Vec<usize> = stats.iter().map(|s| s.tail_pixels).collect();
    assert_eq!(tails, vec![0, 0, 1, 0]);
    assert_eq!(out, conv2d_direct(&layer, &input, &weights, &quant).unwrap());
}
