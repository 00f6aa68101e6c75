// convert.rs — Widening and narrowing between RasterImage and FloatPlane.
//
// Widening keeps raw intensities (u8 42 → f32 42.0), which is what the
// convolution kernel operates on. Narrowing goes through Pixel::from_f32
// for u8: a truncating cast, so 127.5 → 127 and 255.9 → 255. A normalized
// kernel never leaves [0, 255], so no explicit clamp is applied.

use crate::image::{FloatPlane, Image, Pixel, RasterImage};

/// Widen every 8-bit sample to f32.
pub fn widen(src: &RasterImage) -> FloatPlane {
    convert_image(src)
}

/// Narrow every f32 sample to u8 with a truncating cast.
pub fn narrow(src: &FloatPlane) -> RasterImage {
    convert_image(src)
}

/// Generic conversion between any two Pixel types via f32.
pub fn convert_image<S: Pixel, D: Pixel>(src: &Image<S>) -> Image<D> {
    let data = src
        .as_slice()
        .iter()
        .map(|&v| D::from_f32(v.to_f32()))
        .collect();
    Image::from_vec(src.width(), src.height(), data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_keeps_raw_values() {
        let src = RasterImage::from_vec(3, 1, vec![0, 42, 255]);
        let plane = widen(&src);
        assert_eq!(plane.as_slice(), &[0.0, 42.0, 255.0]);
    }

    #[test]
    fn test_narrow_truncates() {
        let plane = FloatPlane::from_vec(4, 1, vec![127.5, 0.99, 254.999, 12.0]);
        let raster = narrow(&plane);
        assert_eq!(raster.as_slice(), &[127, 0, 254, 12]);
    }

    #[test]
    fn test_widen_then_narrow_is_identity() {
        let src = RasterImage::from_fn(16, 16, |x, y| ((x * 16 + y) % 256) as u8);
        assert_eq!(narrow(&widen(&src)), src);
    }
}
