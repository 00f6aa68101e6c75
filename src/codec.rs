// codec.rs — Image file I/O.
//
// Any format the `image` crate decodes is accepted and converted to 8-bit
// luma on load. The output format follows the file extension.

use std::path::Path;

use crate::error::{FilterError, Result};
use crate::image::RasterImage;

/// Load an image file as a single-channel 8-bit raster.
pub fn load(path: impl AsRef<Path>) -> Result<RasterImage> {
    let path = path.as_ref();
    let gray = image::open(path)
        .map_err(|e| FilterError::DecodeError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .to_luma8();
    let (w, h) = gray.dimensions();
    tracing::debug!(path = %path.display(), width = w, height = h, "image loaded");
    Ok(RasterImage::from_vec(w as usize, h as usize, gray.into_raw()))
}

/// Save a raster to `path`, in the format its extension names.
pub fn save(img: &RasterImage, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let encode_err = |reason: String| FilterError::EncodeError {
        path: path.to_path_buf(),
        reason,
    };

    let buf = image::GrayImage::from_raw(img.width() as u32, img.height() as u32, img.as_slice().to_vec())
        .ok_or_else(|| encode_err("pixel buffer does not match dimensions".to_string()))?;
    buf.save(path).map_err(|e| encode_err(e.to_string()))?;
    tracing::debug!(path = %path.display(), "image saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> RasterImage {
        RasterImage::from_fn(16, 8, |x, y| (x * 16 + y) as u8)
    }

    #[test]
    fn test_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradient.png");
        save(&gradient(), &path).unwrap();
        assert_eq!(load(&path).unwrap(), gradient());
    }

    #[test]
    fn test_bmp_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bmp");
        save(&gradient(), &path).unwrap();
        let back = load(&path).unwrap();
        assert_eq!(back.dimensions(), (16, 8));
        assert_eq!(back, gradient());
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, FilterError::DecodeError { .. }), "{err}");
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("garbage.png"), "{err}");
    }

    #[test]
    fn test_unknown_extension_is_encode_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = save(&gradient(), dir.path().join("out.notaformat")).unwrap_err();
        assert!(matches!(err, FilterError::EncodeError { .. }), "{err}");
    }
}
