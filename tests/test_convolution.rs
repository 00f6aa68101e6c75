// tests/test_convolution.rs — CPU reference convolution and kernel invariants.
//
// The device kernel is checked against this reference, so these properties
// pin down the numbers every GPU test compares to.

use gauss_gpu::convert::{narrow, widen};
use gauss_gpu::convolution::{convolve_2d, max_abs_diff, mean_abs_diff};
use gauss_gpu::image::{FloatPlane, RasterImage};
use gauss_gpu::kernel::{ConvolutionKernel, COEFFICIENT_SUM_TOLERANCE, GAUSSIAN_3X3};

fn checkerboard(width: usize, height: usize) -> RasterImage {
    RasterImage::from_fn(width, height, |x, y| if (x + y) % 2 == 0 { 255 } else { 0 })
}

// ===== Kernel =====

#[test]
fn gaussian_coefficients_sum_to_one() {
    let sum: f32 = GAUSSIAN_3X3.as_flat().iter().sum();
    assert!((sum - 1.0).abs() <= COEFFICIENT_SUM_TOLERANCE, "sum = {sum}");
}

#[test]
fn gaussian_matches_integer_weights() {
    let k = ConvolutionKernel::from_weights([[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]])
        .unwrap();
    assert_eq!(k, GAUSSIAN_3X3);
}

#[test]
fn larger_odd_kernels_are_accepted() {
    // Binomial 5×5: outer product of [1 4 6 4 1], total 256.
    let b = [1.0f32, 4.0, 6.0, 4.0, 1.0];
    let weights: [[f32; 5]; 5] = std::array::from_fn(|r| std::array::from_fn(|c| b[r] * b[c]));
    let k = ConvolutionKernel::from_weights(weights).unwrap();
    assert_eq!(k.len(), 25);
    assert!((k.sum() - 1.0).abs() <= COEFFICIENT_SUM_TOLERANCE);
}

// ===== Golden values =====

#[test]
fn checkerboard_interior_is_half_intensity() {
    // Every interior pixel sees 8/16 of its window at 255, whichever colour
    // it is itself: (4·c + 4·corners) or (4 edge neighbours · 2).
    let src = widen(&checkerboard(16, 16));
    let out = convolve_2d(&src, &GAUSSIAN_3X3);
    for y in 1..15 {
        for x in 1..15 {
            assert_eq!(out.get(x, y), 127.5, "at ({x}, {y})");
        }
    }

    let raster = narrow(&out);
    for y in 1..15 {
        for x in 1..15 {
            assert_eq!(raster.get(x, y), 127, "at ({x}, {y})");
        }
    }
}

#[test]
fn checkerboard_corner_uses_clamped_border() {
    // (0,0) = 255 with clamped neighbours: rows [255 255 0], [255 255 0],
    // [0 0 255] → (765 + 1530 + 255) / 16.
    let out = convolve_2d(&widen(&checkerboard(16, 16)), &GAUSSIAN_3X3);
    assert_eq!(out.get(0, 0), 159.375);
}

#[test]
fn constant_image_is_unchanged() {
    for &v in &[0u8, 1, 37, 200, 255] {
        for &(w, h) in &[(16, 16), (17, 9), (1, 1), (3, 40)] {
            let src = RasterImage::filled(w, h, v);
            let out = convolve_2d(&widen(&src), &GAUSSIAN_3X3);
            assert_eq!(narrow(&out), src, "value {v} at {w}×{h}");
        }
    }
}

// ===== Structural properties =====

#[test]
fn output_dimensions_match_input() {
    for &(w, h) in &[(16, 16), (640, 480), (33, 7)] {
        let out = convolve_2d(&FloatPlane::new(w, h), &GAUSSIAN_3X3);
        assert_eq!(out.dimensions(), (w, h));
    }
}

#[test]
fn blur_preserves_mean() {
    let src = FloatPlane::from_fn(32, 32, |x, y| ((x * 7 + y * 13) % 256) as f32);
    let out = convolve_2d(&src, &GAUSSIAN_3X3);
    let mean = |p: &FloatPlane| p.as_slice().iter().sum::<f32>() / p.len() as f32;
    assert!(
        (mean(&src) - mean(&out)).abs() < 2.0,
        "mean shifted too much: {} → {}",
        mean(&src),
        mean(&out)
    );
}

#[test]
fn symmetric_kernel_commutes_with_transpose() {
    let src = FloatPlane::from_fn(9, 6, |x, y| ((x * 31 + y * 17) % 97) as f32);
    let transposed = FloatPlane::from_fn(6, 9, |x, y| src.get(y, x));

    let a = convolve_2d(&src, &GAUSSIAN_3X3);
    let b = convolve_2d(&transposed, &GAUSSIAN_3X3);
    let b_back = FloatPlane::from_fn(9, 6, |x, y| b.get(y, x));

    assert!(max_abs_diff(&a, &b_back) < 1e-4);
}

#[test]
fn blur_reduces_variation() {
    let src = widen(&checkerboard(16, 16));
    let out = convolve_2d(&src, &GAUSSIAN_3X3);
    let flat = FloatPlane::filled(16, 16, 127.5);
    assert!(mean_abs_diff(&out, &flat) < mean_abs_diff(&src, &flat));
}
