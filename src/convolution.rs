// convolution.rs — CPU reference for the device convolution.
//
// Mirrors gaussian_filter.wgsl exactly: same clamp-to-edge border, same
// accumulation order (kernel row outer, kernel column inner), same f32
// arithmetic. The GPU result is checked against this in tests and by
// `gauss-gpu --verify`. It is never used as an execution fallback.
//
// BORDER HANDLING: Clamp (replicate edge pixels).
// A window that extends past the image reads the nearest edge pixel, the
// same as the device kernel's clamped textureLoad.

use crate::image::{FloatPlane, Image};
use crate::kernel::ConvolutionKernel;

/// Convolve `src` with an N×N kernel (correlation form: coefficient (ky, kx)
/// weighs pixel (x + kx - N/2, y + ky - N/2)).
pub fn convolve_2d<const N: usize>(src: &FloatPlane, kernel: &ConvolutionKernel<N>) -> FloatPlane {
    let half = (N / 2) as isize;
    let (w, h) = src.dimensions();
    let mut dst = Image::new(w, h);
    if src.is_empty() {
        return dst;
    }

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ky, row) in kernel.rows().iter().enumerate() {
                for (kx, &c) in row.iter().enumerate() {
                    let sx = x as isize + kx as isize - half;
                    let sy = y as isize + ky as isize - half;
                    acc += c * src.get_clamped(sx, sy);
                }
            }
            dst.set(x, y, acc);
        }
    }
    dst
}

/// Largest per-pixel absolute difference between two planes of equal size.
///
/// # Panics
/// If the dimensions differ.
pub fn max_abs_diff(a: &FloatPlane, b: &FloatPlane) -> f32 {
    assert_eq!(a.dimensions(), b.dimensions(), "plane dimensions differ");
    a.as_slice()
        .iter()
        .zip(b.as_slice())
        .map(|(&p, &q)| (p - q).abs())
        .fold(0.0f32, f32::max)
}

/// Mean per-pixel absolute difference between two planes of equal size.
pub fn mean_abs_diff(a: &FloatPlane, b: &FloatPlane) -> f32 {
    assert_eq!(a.dimensions(), b.dimensions(), "plane dimensions differ");
    if a.is_empty() {
        return 0.0;
    }
    let total: f64 = a
        .as_slice()
        .iter()
        .zip(b.as_slice())
        .map(|(&p, &q)| (p - q).abs() as f64)
        .sum();
    (total / a.len() as f64) as f32
}
