// kernel.rs — Fixed-size normalized convolution kernel.
//
// The side length N is a const generic, so the coefficient matrix is a plain
// stack array `[[f32; N]; N]` and N² is known at compile time. Construction
// checks that N is odd and that the coefficients form a low-pass kernel
// (finite, summing to 1 within COEFFICIENT_SUM_TOLERANCE). Once built the
// kernel is immutable.

use std::fmt;

use crate::error::{FilterError, Result};

/// Maximum allowed |sum - 1.0| for a normalized kernel.
pub const COEFFICIENT_SUM_TOLERANCE: f32 = 1e-6;

/// Square coefficient matrix of odd side length `N`, row-major.
#[derive(Clone, Copy, PartialEq)]
pub struct ConvolutionKernel<const N: usize> {
    coeffs: [[f32; N]; N],
}

/// The 3×3 Gaussian smoothing kernel `[1 2 1; 2 4 2; 1 2 1] / 16`.
pub const GAUSSIAN_3X3: ConvolutionKernel<3> = ConvolutionKernel {
    coeffs: [
        [1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0],
        [2.0 / 16.0, 4.0 / 16.0, 2.0 / 16.0],
        [1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0],
    ],
};

impl<const N: usize> ConvolutionKernel<N> {
    /// Build a kernel from a row-major coefficient matrix.
    ///
    /// # Errors
    /// `InvalidKernel` if `N` is zero or even, any coefficient is not finite,
    /// or the coefficients do not sum to 1.0 within
    /// [`COEFFICIENT_SUM_TOLERANCE`].
    pub fn new(coeffs: [[f32; N]; N]) -> Result<Self> {
        if N == 0 || N % 2 == 0 {
            return Err(FilterError::InvalidKernel(format!(
                "side length must be odd and positive, got {N}"
            )));
        }
        if let Some(bad) = coeffs.as_flattened().iter().find(|c| !c.is_finite()) {
            return Err(FilterError::InvalidKernel(format!(
                "coefficient {bad} is not finite"
            )));
        }
        let kernel = ConvolutionKernel { coeffs };
        let sum = kernel.sum();
        if (sum - 1.0).abs() > COEFFICIENT_SUM_TOLERANCE {
            return Err(FilterError::InvalidKernel(format!(
                "coefficients sum to {sum}, expected 1.0 ± {COEFFICIENT_SUM_TOLERANCE}"
            )));
        }
        Ok(kernel)
    }

    /// Build a normalized kernel from integer-ish weights divided by their sum,
    /// e.g. `from_weights([[1,2,1],[2,4,2],[1,2,1]])`.
    pub fn from_weights(weights: [[f32; N]; N]) -> Result<Self> {
        let total: f32 = weights.as_flattened().iter().sum();
        if total == 0.0 || !total.is_finite() {
            return Err(FilterError::InvalidKernel(format!(
                "weights sum to {total}, cannot normalize"
            )));
        }
        let mut coeffs = weights;
        for c in coeffs.as_flattened_mut() {
            *c /= total;
        }
        Self::new(coeffs)
    }

    /// Side length N (the window size passed to the device kernel).
    #[inline]
    pub const fn side(&self) -> usize {
        N
    }

    /// Number of coefficients, N².
    #[inline]
    pub const fn len(&self) -> usize {
        N * N
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Coefficient at (row, col).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.coeffs[row][col]
    }

    #[inline]
    pub fn rows(&self) -> &[[f32; N]; N] {
        &self.coeffs
    }

    /// Coefficients as one row-major slice of length N².
    #[inline]
    pub fn as_flat(&self) -> &[f32] {
        self.coeffs.as_flattened()
    }

    pub fn sum(&self) -> f32 {
        self.as_flat().iter().sum()
    }
}

impl ConvolutionKernel<3> {
    pub const fn gaussian_3x3() -> Self {
        GAUSSIAN_3X3
    }
}

impl<const N: usize> fmt::Debug for ConvolutionKernel<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ConvolutionKernel<{N}>")?;
        for row in &self.coeffs {
            writeln!(f, "  {row:?}")?;
        }
        Ok(())
    }
}
