use fusedconv::cluster::{conv2d, conv2d_sequential, im2col_len, Cluster, CpuCopy};
use fusedconv::reference::pad_explicit;
use fusedconv::{ConvLayer, PartitionStrategy, Precision, QuantParams};
use pretty_assertions::assert_eq;

fn lcg_bytes(seed: u64, n: usize) -> Vec<u8> {
    let mut s = seed;
    (0..n).map(|_| { s = s.wrapping_mul(6364136223846793005).wrapping_add(1); (s >> 40) as u8 }).collect()
}

fn run(cores: usize, layer: &ConvLayer, input: &[u8], weights: &[i8], quant: &QuantParams) -> Vec<u8> {
    let mut out = vec![0u8; layer.output_len()];
    let mut im2col = vec![0u8; im2col_len(layer, cores)];
    let cluster = Cluster::new(cores).unwrap();
    conv2d(&cluster, layer, input, weights, quant, &mut out, &mut im2col, &CpuCopy).unwrap();
    out
}

fn check(layer: ConvLayer, cores: usize) {
    let input = lcg_bytes(5, layer.input_len());
    let weights: Vec<i8> = lcg_bytes(6, layer.weights_len()).into_iter().map(|b| b as i8 / 8).collect();
    let bias: Vec<i8> = lcg_bytes(7, layer.out_ch).into_iter().map(|b| b as i8 / 4).collect();
    let quant = QuantParams { bias: Some(&bias), bias_shift: 2, out_shift: 6, out_mult: 3, ..QuantParams::default() };

    let (padded_layer, padded_input) = pad_explicit(&layer, &input);
    assert_eq!((padded_layer.out_h, padded_layer.out_w), (layer.out_h, layer.out_w));
    let implicit = run(cores, &layer, &input, &weights, &quant);
    let explicit = run(cores, &padded_layer, &padded_input, &weights, &quant);
    assert_eq!(implicit, explicit, "layer {:?}", layer);
}

#[test]
fn implicit_padding_equals_explicit_zero_padding() {
    for strategy in [PartitionStrategy::Channels, PartitionStrategy::Rows, PartitionStrategy::RowsAndColumns] {
        let mut l = ConvLayer::square(7, 6, 3, 8, 3, 1, 1);
        l.strategy = strategy;
        l.relu = true;
        check(l.clone(), 4);

        // asymmetric padding with stride 2
        let mut l = ConvLayer { pad_top: 2, pad_bottom: 0, pad_left: 1, pad_right: 2, ..l };
        l.stride_y = 2;
        l.stride_x = 2;
        check(l.with_derived_output(), 2);
    }
}

#[test]
fn padding_equivalence_with_sub_byte_activations() {
    let mut l = ConvLayer::square(5, 5, 8, 8, 3, 2, 1);
    l.input_precision = Precision::U4;
    l.output_precision = Precision::U2;
    check(l.clone(), 8);
    l.input_precision = Precision::U1;
    l.strategy = PartitionStrategy::Rows;
    check(l, 2);
}

#[test]
fn sequential_team_matches_threaded_team() {
    let mut l = ConvLayer::square(9, 9, 5, 12, 3, 1, 2);
    l.relu = true;
    let input = lcg_bytes(9, l.input_len());
    let weights: Vec<i8> = lcg_bytes(10, l.weights_len()).into_iter().map(|b| b as i8 / 16).collect();
    let quant = QuantParams { out_mult: 2, out_shift: 3, ..QuantParams::default() };
    let threaded = run(4, &l, &input, &weights, &quant);
    let mut out = vec![0u8; l.output_len()];
    let mut im2col = vec![0u8; im2col_len(&l, 4)];
    conv2d_sequential(4, &l, &input, &weights, &quant, &mut out, &mut im2col, &CpuCopy).unwrap();
    assert_eq!(out, threaded);
}
