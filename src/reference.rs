//! Direct (loop-nest) convolution used as the golden model for the tiled kernels.
use crate::error::ConvError;
use crate::kernels::requant::{Epilogue, QuantParams};
use crate::layer::ConvLayer;
use crate::tensor::{pack, unpack};

/// Naive convolution with implicit zero padding and the same fused epilogue
/// as the kernels. Returns the packed output tensor.
pub fn conv2d_direct(layer: &ConvLayer, input: &[u8], weights: &[i8], quant: &QuantParams) -> Result<Vec<u8>, ConvError> {
    layer.validate()?;
    let epi = Epilogue::new(layer, quant)?;
    let cin = layer.in_ch;
    let x = unpack(input, layer.input_precision, layer.in_h * layer.in_w * cin);
    let mut vals = Vec::with_capacity(layer.out_h * layer.out_w * layer.out_ch);
    for oy in 0..layer.out_h {
        for ox in 0..layer.out_w {
            for oc in 0..layer.out_ch {
                let mut sum = epi.initial_sum(oc);
                for ky in 0..layer.kernel_h {
                    let iy = (oy * layer.stride_y + ky) as isize - layer.pad_top as isize;
                    if iy < 0 || iy as usize >= layer.in_h { continue; }
                    for kx in 0..layer.kernel_w {
                        let ix = (ox * layer.stride_x + kx) as isize - layer.pad_left as isize;
                        if ix < 0 || ix as usize >= layer.in_w { continue; }
                        let xb = (iy as usize * layer.in_w + ix as usize) * cin;
                        let wb = ((oc * layer.kernel_h + ky) * layer.kernel_w + kx) * cin;
                        for c in 0..cin {
                            sum = sum.wrapping_add(x[xb + c] as i32 * weights[wb + c] as i32);
                        }
                    }
                }
                vals.push(epi.quantize(sum, oc));
            }
        }
    }
    Ok(pack(&vals, layer.output_precision))
}

/// Materialise the padding: returns the equivalent unpadded layer and its zero-padded input.
pub fn pad_explicit(layer: &ConvLayer, input: &[u8]) -> (ConvLayer, Vec<u8>) {
    let cin = layer.in_ch;
    let x = unpack(input, layer.input_precision, layer.in_h * layer.in_w * cin);
    let padded_layer = ConvLayer {
        in_h: layer.in_h + layer.pad_top + layer.pad_bottom,
        in_w: layer.in_w + layer.pad_left + layer.pad_right,
        pad_top: 0,
        pad_bottom: 0,
        pad_left: 0,
        pad_right: 0,
        ..layer.clone()
    };
    let mut padded = vec![0u8; padded_layer.in_h * padded_layer.in_w * cin];
    for y in 0..layer.in_h {
        let src = &x[y * layer.in_w * cin..(y + 1) * layer.in_w * cin];
        let at = ((y + layer.pad_top) * padded_layer.in_w + layer.pad_left) * cin;
        padded[at..at + src.len()].copy_from_slice(src);
    }
    (padded_layer, pack(&padded, layer.input_precision))
}
