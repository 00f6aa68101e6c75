// tests/test_image.rs — Integration tests for Image<T> and u8/f32 conversion.
//
// Run with `cargo test --test test_image`. Only the public API is reachable
// from here.

use gauss_gpu::convert::{convert_image, narrow, widen};
use gauss_gpu::image::{FloatPlane, Image, RasterImage};

// ===== Construction & access =====

#[test]
fn image_new_zero_initialized() {
    let img: RasterImage = Image::new(100, 50);
    assert_eq!(img.dimensions(), (100, 50));
    assert_eq!(img.len(), 5000);
    assert_eq!(img.get(0, 0), 0);
    assert_eq!(img.get(99, 49), 0);
}

#[test]
fn image_from_vec_is_row_major() {
    //  [10, 20, 30]
    //  [40, 50, 60]
    let img = RasterImage::from_vec(3, 2, vec![10, 20, 30, 40, 50, 60]);
    assert_eq!(img.get(0, 0), 10);
    assert_eq!(img.get(2, 0), 30);
    assert_eq!(img.get(0, 1), 40);
    assert_eq!(img.row(1), &[40, 50, 60]);
    assert_eq!(img[(1, 1)], 50);
}

#[test]
#[should_panic(expected = "does not match")]
fn image_from_vec_wrong_length_panics() {
    let _ = RasterImage::from_vec(3, 3, vec![0; 8]);
}

#[test]
fn image_set_get_checkerboard() {
    let mut img: RasterImage = Image::new(10, 10);
    for y in 0..10 {
        for x in 0..10 {
            img.set(x, y, if (x + y) % 2 == 0 { 255 } else { 0 });
        }
    }
    for (x, y, v) in img.pixels() {
        let expected = if (x + y) % 2 == 0 { 255 } else { 0 };
        assert_eq!(v, expected, "mismatch at ({x}, {y})");
    }
}

#[test]
fn image_clamped_reads_replicate_edges() {
    let img = FloatPlane::from_fn(4, 3, |x, y| (y * 10 + x) as f32);
    assert_eq!(img.get_clamped(-1, -1), 0.0);
    assert_eq!(img.get_clamped(5, 0), 3.0);
    assert_eq!(img.get_clamped(0, 7), 20.0);
    assert_eq!(img.get_clamped(9, 9), 23.0);
    assert_eq!(img.get_clamped(2, 1), 12.0);
}

#[test]
fn empty_image_reports_empty() {
    let img: FloatPlane = Image::new(0, 7);
    assert!(img.is_empty());
    assert_eq!(img.len(), 0);
}

// ===== Conversion =====

#[test]
fn widen_keeps_raw_intensity() {
    let src = RasterImage::from_vec(4, 1, vec![0, 1, 128, 255]);
    assert_eq!(widen(&src).as_slice(), &[0.0, 1.0, 128.0, 255.0]);
}

#[test]
fn narrow_truncates_toward_zero() {
    let plane = FloatPlane::from_vec(3, 1, vec![127.5, 127.999, 0.4]);
    assert_eq!(narrow(&plane).as_slice(), &[127, 127, 0]);
}

#[test]
fn narrow_saturates_out_of_range() {
    let plane = FloatPlane::from_vec(2, 1, vec![-3.0, 300.0]);
    assert_eq!(narrow(&plane).as_slice(), &[0, 255]);
}

#[test]
fn widen_narrow_round_trip() {
    let src = RasterImage::from_fn(37, 11, |x, y| ((x * 7 + y * 3) % 256) as u8);
    let back: RasterImage = convert_image(&convert_image::<u8, f32>(&src));
    assert_eq!(back, src);
}
