// image.rs — Host-side image containers.
//
// Two concrete images flow through the pipeline:
//
//   RasterImage = Image<u8>   decoded from / encoded to disk
//   FloatPlane  = Image<f32>  upload source and download target
//
// Both are row-major with no row padding: pixel (x, y) lives at index
// y * width + x. The GPU side needs padded rows for buffer↔texture copies;
// that padding is added and stripped inside gpu::memory and never leaks
// into these types.

use std::fmt;

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Trait for types that can serve as pixel values in an Image.
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {
    /// Widen to f32, keeping the raw value (u8 42 → 42.0).
    fn to_f32(self) -> f32;

    /// Narrow from f32.
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    /// Truncating cast: the fraction is dropped, values outside [0, 255]
    /// saturate and NaN becomes 0. No rounding.
    #[inline]
    fn from_f32(v: f32) -> Self {
        v as u8
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A single-channel 2D image with runtime dimensions.
#[derive(Clone, PartialEq)]
pub struct Image<T: Pixel> {
    /// Pixel data in row-major order. Length = width * height.
    data: Vec<T>,
    width: usize,
    height: usize,
}

/// 8-bit grayscale image, as produced by the codec.
pub type RasterImage = Image<u8>;

/// 32-bit float intensity plane, one value per pixel.
pub type FloatPlane = Image<f32>;

impl<T: Pixel> Image<T> {
    /// Create a zero-initialized image.
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, T::default())
    }

    /// Create an image with every pixel set to `value`.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Image {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// Wrap an existing row-major buffer.
    ///
    /// # Panics
    /// If `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length {} does not match {}×{}",
            data.len(),
            width,
            height
        );
        Image { data, width, height }
    }

    /// Build an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image { data, width, height }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// (width, height)
    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Number of pixels.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// # Panics
    /// If (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of bounds for {}×{} image",
            self.width,
            self.height
        );
        self.data[y * self.width + x]
    }

    /// # Panics
    /// If (x, y) is out of bounds.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of bounds for {}×{} image",
            self.width,
            self.height
        );
        self.data[y * self.width + x] = value;
    }

    /// Get a pixel with coordinates clamped to the image (clamp-to-edge).
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    /// Row `y` as a slice of length `width`.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// Iterate over all pixels as (x, y, value).
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let w = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % w, i / w, v))
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image {}×{}", self.width, self.height)?;
        // Large images only get their top-left corner printed.
        let show_w = self.width.min(8);
        let show_h = self.height.min(8);
        for y in 0..show_h {
            write!(f, "  [")?;
            for x in 0..show_w {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > show_w {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > show_h {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

impl<T: Pixel> std::ops::Index<(usize, usize)> for Image<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &T {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        &self.data[y * self.width + x]
    }
}

impl<T: Pixel> std::ops::IndexMut<(usize, usize)> for Image<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        &mut self.data[y * self.width + x]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let img: RasterImage = Image::new(4, 3);
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.len(), 12);
        assert!(img.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_from_fn_is_row_major() {
        let img = Image::<u8>::from_fn(3, 2, |x, y| (y * 10 + x) as u8);
        assert_eq!(img.as_slice(), &[0, 1, 2, 10, 11, 12]);
        assert_eq!(img.row(1), &[10, 11, 12]);
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn test_from_vec_rejects_wrong_length() {
        let _ = Image::<u8>::from_vec(3, 3, vec![0; 8]);
    }

    #[test]
    fn test_get_clamped_replicates_edges() {
        let img = Image::<u8>::from_vec(2, 2, vec![1, 2, 3, 4]);
        assert_eq!(img.get_clamped(-1, -1), 1);
        assert_eq!(img.get_clamped(5, 0), 2);
        assert_eq!(img.get_clamped(0, 9), 3);
        assert_eq!(img.get_clamped(3, 3), 4);
    }

    #[test]
    fn test_u8_from_f32_truncates() {
        assert_eq!(u8::from_f32(127.9), 127);
        assert_eq!(u8::from_f32(0.4), 0);
        assert_eq!(u8::from_f32(300.0), 255);
        assert_eq!(u8::from_f32(-3.0), 0);
        assert_eq!(u8::from_f32(f32::NAN), 0);
    }

    #[test]
    fn test_index_matches_get() {
        let mut img = Image::<f32>::new(3, 3);
        img[(2, 1)] = 7.5;
        assert_eq!(img.get(2, 1), 7.5);
        assert_eq!(img[(2, 1)], 7.5);
    }
}
