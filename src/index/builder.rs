//! Builder pattern for [`PivotIndex`].
//!
//! # Example
//!
//! ```ignore
//! use pivot_knn::index::PivotIndexBuilder;
//!
//! let index = PivotIndexBuilder::new()
//!     .pivots(16)
//!     .quantization(64)
//!     .build(dataset)?;
//! ```

use crate::constants::defaults;
use crate::distance::SketchKernel;
use crate::error::{PivotKnnError, Result};
use crate::matrix::Matrix;
use crate::types::Float;

use super::PivotIndex;

/// Construction parameters of a [`PivotIndex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexConfig {
    /// Number of pivots (`h`).
    pub pivots: usize,
    /// Dominant components kept per sketch (`x`).
    pub quantization: usize,
    /// Sketch distance implementation.
    pub kernel: SketchKernel,
}

impl IndexConfig {
    /// Parameters with the fastest available kernel.
    pub fn new(pivots: usize, quantization: usize) -> Self {
        Self {
            pivots,
            quantization,
            kernel: SketchKernel::detect(),
        }
    }

    /// Pin the sketch kernel.
    pub fn with_kernel(mut self, kernel: SketchKernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// Reject parameters that can never produce an index.
    pub fn validate(&self) -> Result<()> {
        if self.pivots == 0 {
            return Err(PivotKnnError::invalid_parameter(
                "number of pivots (h) must be greater than 0",
            ));
        }
        if self.quantization == 0 {
            return Err(PivotKnnError::invalid_parameter(
                "quantization budget (x) must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new(defaults::PIVOTS, defaults::QUANTIZATION)
    }
}

/// Fluent builder for [`PivotIndex`].
#[derive(Clone, Debug, Default)]
pub struct PivotIndexBuilder {
    config: IndexConfig,
}

impl PivotIndexBuilder {
    /// Create a new builder with default settings (`h = 16`, `x = 64`, detected kernel).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of pivots.
    ///
    /// More pivots tighten the lower bound at the cost of an `n × h` table
    /// and `h` extra sketch distances per query.
    pub fn pivots(mut self, h: usize) -> Self {
        self.config.pivots = h;
        self
    }

    /// Set the quantization budget.
    ///
    /// Values above the dataset dimension are clamped to it.
    pub fn quantization(mut self, x: usize) -> Self {
        self.config.quantization = x;
        self
    }

    /// Pin the sketch distance kernel instead of auto-detecting it.
    pub fn kernel(mut self, kernel: SketchKernel) -> Self {
        self.config.kernel = kernel;
        self
    }

    /// Build the index over `dataset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `h` or `x` is zero
    /// - the dataset has no rows or zero-width rows
    /// - the kernel is not supported by this CPU
    /// - an index buffer cannot be allocated
    pub fn build<T: Float>(self, dataset: Matrix<T>) -> Result<PivotIndex<T>> {
        PivotIndex::build(dataset, self.config)
    }
}
