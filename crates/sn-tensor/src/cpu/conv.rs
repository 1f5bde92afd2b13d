use crate::error::Result;
use crate::geometry::WindowGeometry;

use super::check_len;

/// Direct HWC convolution with a `[k_h, k_w, in_c, out_c]` filter.
pub fn conv2d(
    input: &[f32],
    filter: &[f32],
    bias: Option<&[f32]>,
    g: &WindowGeometry,
    out: &mut [f32],
) -> Result<()> {
    check_len("conv2d", "input", input.len(), g.in_h * g.in_w * g.in_c)?;
    check_len("conv2d", "filter", filter.len(), g.k_h * g.k_w * g.in_c * g.out_c)?;
    check_len("conv2d", "out", out.len(), g.out_h * g.out_w * g.out_c)?;
    if let Some(bias) = bias {
        check_len("conv2d", "bias", bias.len(), g.out_c)?;
    }

    for oy in 0..g.out_h {
        for ox in 0..g.out_w {
            let o = (oy * g.out_w + ox) * g.out_c;
            let acc = &mut out[o..o + g.out_c];
            match bias {
                Some(bias) => acc.copy_from_slice(bias),
                None => acc.fill(0.0),
            }

            for ky in 0..g.k_h {
                let Some(iy) = g.source_row(oy, ky) else {
                    continue;
                };
                for kx in 0..g.k_w {
                    let Some(ix) = g.source_col(ox, kx) else {
                        continue;
                    };
                    let pixel = &input[(iy * g.in_w + ix) * g.in_c..][..g.in_c];
                    let taps = &filter[(ky * g.k_w + kx) * g.in_c * g.out_c..][..g.in_c * g.out_c];
                    for (&v, row) in pixel.iter().zip(taps.chunks_exact(g.out_c)) {
                        for (a, &w) in acc.iter_mut().zip(row) {
                            *a += v * w;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Scatter form of the transposed convolution with a `[k_h, k_w, out_c, in_c]`
/// filter: every input pixel spreads its contribution over the output
/// positions the forward convolution would have gathered it from.
pub fn conv2d_transpose(
    input: &[f32],
    filter: &[f32],
    g: &WindowGeometry,
    out: &mut [f32],
) -> Result<()> {
    check_len("conv2d_transpose", "input", input.len(), g.in_h * g.in_w * g.in_c)?;
    check_len("conv2d_transpose", "filter", filter.len(), g.k_h * g.k_w * g.out_c * g.in_c)?;
    check_len("conv2d_transpose", "out", out.len(), g.out_h * g.out_w * g.out_c)?;

    out.fill(0.0);
    for iy in 0..g.in_h {
        for ix in 0..g.in_w {
            let pixel = &input[(iy * g.in_w + ix) * g.in_c..][..g.in_c];
            for ky in 0..g.k_h {
                let Some(oy) = (iy * g.stride_h + ky)
                    .checked_sub(g.pad_top)
                    .filter(|&y| y < g.out_h)
                else {
                    continue;
                };
                for kx in 0..g.k_w {
                    let Some(ox) = (ix * g.stride_w + kx)
                        .checked_sub(g.pad_left)
                        .filter(|&x| x < g.out_w)
                    else {
                        continue;
                    };
                    let o = (oy * g.out_w + ox) * g.out_c;
                    let taps = &filter[(ky * g.k_w + kx) * g.out_c * g.in_c..][..g.out_c * g.in_c];
                    for (dst, row) in out[o..o + g.out_c].iter_mut().zip(taps.chunks_exact(g.in_c)) {
                        *dst += row.iter().zip(pixel).map(|(&w, &v)| w * v).sum::<f32>();
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Padding;
    use crate::shape::Shape;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_conv2d_identity_1x1() {
        // 2 channels in, 2 out, identity filter plus bias.
        let g = WindowGeometry::conv2d(&Shape::from([1, 2, 2]), &Shape::from([1, 1, 2, 2]), [1, 1], Padding::Valid).unwrap();
        let input = [1.0, 2.0, 3.0, 4.0];
        let filter = [1.0, 0.0, 0.0, 1.0];
        let mut out = vec![0.0; 4];
        conv2d(&input, &filter, Some(&[0.5, -0.5]), &g, &mut out).unwrap();
        assert_eq!(out, vec![1.5, 1.5, 3.5, 3.5]);
    }

    #[test]
    fn test_conv2d_same_box_filter() {
        // 3x3 ones filter over a 3x3 ones image: counts in-bounds neighbours.
        let g = WindowGeometry::conv2d(&Shape::from([3, 3, 1]), &Shape::from([3, 3, 1, 1]), [1, 1], Padding::Same).unwrap();
        let mut out = vec![0.0; 9];
        conv2d(&[1.0; 9], &[1.0; 9], None, &g, &mut out).unwrap();
        assert_eq!(out, vec![4.0, 6.0, 4.0, 6.0, 9.0, 6.0, 4.0, 6.0, 4.0]);
    }

    #[test]
    fn test_conv2d_overwrites_stale_output() {
        let g = WindowGeometry::conv2d(&Shape::from([1, 1, 1]), &Shape::from([1, 1, 1, 1]), [1, 1], Padding::Same).unwrap();
        let mut out = vec![42.0];
        conv2d(&[2.0], &[3.0], None, &g, &mut out).unwrap();
        assert_eq!(out, vec![6.0]);
    }

    #[test]
    fn test_transpose_is_adjoint_of_conv() {
        // <conv(y), x> == <y, conv_t(x)> for the same geometry.
        let small = Shape::from([2, 3, 2]);
        let big = Shape::from([4, 6, 3]);
        let filter_shape = Shape::from([3, 3, 3, 2]);
        let filter: Vec<f32> = (0..filter_shape.numel()).map(|i| ((i * 7) % 11) as f32 - 5.0).collect();
        let y: Vec<f32> = (0..big.numel()).map(|i| ((i * 3) % 5) as f32 - 2.0).collect();
        let x: Vec<f32> = (0..small.numel()).map(|i| (i % 4) as f32 - 1.5).collect();

        let fwd = WindowGeometry::conv2d(&big, &filter_shape, [2, 2], Padding::Same).unwrap();
        let mut conv_y = vec![0.0; small.numel()];
        conv2d(&y, &filter, None, &fwd, &mut conv_y).unwrap();

        let bwd = WindowGeometry::conv2d_transpose(&small, &filter_shape, &big, [2, 2], Padding::Same).unwrap();
        let mut convt_x = vec![0.0; big.numel()];
        conv2d_transpose(&x, &filter, &bwd, &mut convt_x).unwrap();

        let lhs: f32 = conv_y.iter().zip(&x).map(|(a, b)| a * b).sum();
        let rhs: f32 = y.iter().zip(&convt_x).map(|(a, b)| a * b).sum();
        assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-2);
    }

    #[test]
    fn test_transpose_single_pixel_stamps_filter() {
        // One input pixel, stride 2, 3x3 kernel, same padding onto 2x2.
        let g = WindowGeometry::conv2d_transpose(
            &Shape::from([1, 1, 1]),
            &Shape::from([3, 3, 1, 1]),
            &Shape::from([2, 2, 1]),
            [2, 2],
            Padding::Same,
        )
        .unwrap();
        let filter: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        let mut out = vec![-1.0; 4];
        conv2d_transpose(&[1.0], &filter, &g, &mut out).unwrap();
        // pad_top = pad_left = 0: kernel taps (0..2, 0..2) land on the output.
        assert_eq!(out, vec![1.0, 2.0, 4.0, 5.0]);
    }
}
