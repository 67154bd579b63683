//! Pivot table over signed binary sketches.
//!
//! Construction runs in three passes over the dataset:
//!
//! 1. quantize every row into a sketch (`n × D` positive and negative masks),
//! 2. copy the sketches of the `h` pivot rows into a contiguous pivot table,
//! 3. fill the `n × h` table with the sketch distance of every row to every pivot.
//!
//! Passes 1 and 3 are parallel over rows; each row writes only its own slice.
//! Every buffer is owned by the returned [`PivotIndex`], so a failed build
//! releases whatever was already allocated.

use std::time::Instant;

use rayon::prelude::*;

use crate::distance::{SketchDistanceFn, SketchKernel};
use crate::error::{try_zeroed, PivotKnnError, Result};
use crate::matrix::Matrix;
use crate::metrics::IndexStatistics;
use crate::quantize::{Quantizer, SketchRef};
use crate::types::Float;

use super::IndexConfig;

/// Pick `h` pivot rows out of `n` by a fixed stride: pivot `j` is row `(n / h) * j`.
///
/// When `h > n` the stride is zero and every pivot is row 0.
pub fn select_pivots(n: usize, h: usize) -> Vec<usize> {
    let stride = if h == 0 { 0 } else { n / h };
    (0..h).map(|j| stride * j).collect()
}

/// An immutable pivot index over a dataset of `n` rows of dimension `D`.
pub struct PivotIndex<T: Float> {
    pub(super) dataset: Matrix<T>,
    pub(super) pivot_ids: Vec<usize>,
    pub(super) positive: Vec<u8>,
    pub(super) negative: Vec<u8>,
    pub(super) pivot_positive: Vec<u8>,
    pub(super) pivot_negative: Vec<u8>,
    /// Row-major `n × h` sketch distances to the pivots.
    pub(super) dist: Vec<i32>,
    pub(super) quantization: usize,
    pub(super) kernel: SketchKernel,
    pub(super) distance_fn: SketchDistanceFn,
}

impl<T: Float> PivotIndex<T> {
    /// Build an index over `dataset`, taking ownership of it.
    ///
    /// # Errors
    ///
    /// - [`PivotKnnError::InvalidParameter`] if `h` or `x` is zero
    /// - [`PivotKnnError::EmptyDataset`] if the dataset has no rows or no columns
    /// - [`PivotKnnError::UnsupportedKernel`] if the kernel cannot run here
    /// - [`PivotKnnError::AllocationFailed`] if a buffer cannot be reserved
    pub fn build(dataset: Matrix<T>, config: IndexConfig) -> Result<Self> {
        config.validate()?;

        let n = dataset.rows();
        let dim = dataset.cols();
        if n == 0 || dim == 0 {
            return Err(PivotKnnError::EmptyDataset);
        }

        let h = config.pivots;
        let x = config.quantization;
        let distance_fn = config.kernel.resolve()?;

        if h > n {
            tracing::warn!(
                pivots = h,
                rows = n,
                "more pivots than dataset rows; pivots will alias row 0"
            );
        }
        if x > dim {
            tracing::debug!(
                quantization = x,
                dimension = dim,
                "quantization budget exceeds dimension; clamping"
            );
        }

        let start = Instant::now();

        let sketch_len = checked_len("dataset sketches", n, dim)?;
        let pivot_len = checked_len("pivot sketches", h, dim)?;
        let table_len = checked_len("distance table", n, h)?;

        let mut positive = try_zeroed::<u8>("dataset sketches", sketch_len)?;
        let mut negative = try_zeroed::<u8>("dataset sketches", sketch_len)?;
        let mut pivot_positive = try_zeroed::<u8>("pivot sketches", pivot_len)?;
        let mut pivot_negative = try_zeroed::<u8>("pivot sketches", pivot_len)?;
        let mut dist = try_zeroed::<i32>("distance table", table_len)?;

        let pivot_ids = select_pivots(n, h);

        positive
            .par_chunks_mut(dim)
            .zip(negative.par_chunks_mut(dim))
            .zip(dataset.as_slice().par_chunks(dim))
            .for_each_init(
                || Quantizer::new(x),
                |quantizer, ((pos, neg), row)| quantizer.quantize_into(row, pos, neg),
            );
        tracing::debug!(rows = n, elapsed = ?start.elapsed(), "quantized dataset");

        for (j, &id) in pivot_ids.iter().enumerate() {
            let src = id * dim..(id + 1) * dim;
            let dst = j * dim..(j + 1) * dim;
            pivot_positive[dst.clone()].copy_from_slice(&positive[src.clone()]);
            pivot_negative[dst].copy_from_slice(&negative[src]);
        }

        {
            let positive = &positive;
            let negative = &negative;
            let pivot_positive = &pivot_positive;
            let pivot_negative = &pivot_negative;

            dist.par_chunks_mut(h).enumerate().for_each(|(i, row)| {
                let sketch = SketchRef {
                    positive: &positive[i * dim..(i + 1) * dim],
                    negative: &negative[i * dim..(i + 1) * dim],
                };
                for (j, out) in row.iter_mut().enumerate() {
                    let pivot = SketchRef {
                        positive: &pivot_positive[j * dim..(j + 1) * dim],
                        negative: &pivot_negative[j * dim..(j + 1) * dim],
                    };
                    *out = distance_fn(sketch, pivot);
                }
            });
        }

        tracing::info!(
            rows = n,
            dimension = dim,
            pivots = h,
            quantization = x,
            kernel = config.kernel.name(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "built pivot index"
        );

        Ok(Self {
            dataset,
            pivot_ids,
            positive,
            negative,
            pivot_positive,
            pivot_negative,
            dist,
            quantization: x,
            kernel: config.kernel,
            distance_fn,
        })
    }

    /// Number of indexed rows (`n`).
    #[inline]
    pub fn len(&self) -> usize {
        self.dataset.rows()
    }

    /// Always false for a built index.
    pub fn is_empty(&self) -> bool {
        self.dataset.rows() == 0
    }

    /// Vector dimension (`D`).
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dataset.cols()
    }

    /// Number of pivots (`h`).
    #[inline]
    pub fn num_pivots(&self) -> usize {
        self.pivot_ids.len()
    }

    /// Quantization budget the index was built with (`x`, before clamping).
    pub fn quantization(&self) -> usize {
        self.quantization
    }

    /// Dataset row of each pivot.
    pub fn pivot_ids(&self) -> &[usize] {
        &self.pivot_ids
    }

    /// Precomputed sketch distances of `row` to every pivot.
    ///
    /// # Panics
    /// Panics if `row >= len()`.
    #[inline]
    pub fn pivot_distances(&self, row: usize) -> &[i32] {
        let h = self.num_pivots();
        &self.dist[row * h..(row + 1) * h]
    }

    /// Sketch of dataset `row`.
    ///
    /// # Panics
    /// Panics if `row >= len()`.
    #[inline]
    pub fn sketch(&self, row: usize) -> SketchRef<'_> {
        let dim = self.dimension();
        SketchRef {
            positive: &self.positive[row * dim..(row + 1) * dim],
            negative: &self.negative[row * dim..(row + 1) * dim],
        }
    }

    /// Sketch of pivot `j`.
    ///
    /// # Panics
    /// Panics if `j >= num_pivots()`.
    #[inline]
    pub fn pivot_sketch(&self, j: usize) -> SketchRef<'_> {
        let dim = self.dimension();
        SketchRef {
            positive: &self.pivot_positive[j * dim..(j + 1) * dim],
            negative: &self.pivot_negative[j * dim..(j + 1) * dim],
        }
    }

    /// The indexed dataset.
    pub fn dataset(&self) -> &Matrix<T> {
        &self.dataset
    }

    /// Sketch kernel used for build and query.
    pub fn kernel(&self) -> SketchKernel {
        self.kernel
    }

    /// Compute the sketch distance with the index's kernel.
    #[inline]
    pub fn sketch_distance(&self, a: SketchRef<'_>, b: SketchRef<'_>) -> i32 {
        (self.distance_fn)(a, b)
    }

    /// Get index statistics.
    pub fn statistics(&self) -> IndexStatistics {
        let distinct_pivots = if self.pivot_ids.is_empty() {
            0
        } else {
            1 + self.pivot_ids.windows(2).filter(|w| w[0] != w[1]).count()
        };

        IndexStatistics {
            num_rows: self.len(),
            dimension: self.dimension(),
            num_pivots: self.num_pivots(),
            distinct_pivots,
            quantization: self.quantization,
            effective_quantization: self.quantization.min(self.dimension()),
            sketch_bytes: self.positive.len()
                + self.negative.len()
                + self.pivot_positive.len()
                + self.pivot_negative.len(),
            table_bytes: self.dist.len() * std::mem::size_of::<i32>(),
            dataset_bytes: self.dataset.size_bytes(),
            kernel: self.kernel.name(),
        }
    }
}

fn checked_len(what: &'static str, a: usize, b: usize) -> Result<usize> {
    a.checked_mul(b)
        .ok_or_else(|| PivotKnnError::allocation_failed(what, usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::quantize;

    fn config(h: usize, x: usize) -> IndexConfig {
        IndexConfig::new(h, x).with_kernel(SketchKernel::Scalar)
    }

    #[test]
    fn test_select_pivots_stride() {
        assert_eq!(select_pivots(10, 3), vec![0, 3, 6]);
        assert_eq!(select_pivots(4, 2), vec![0, 2]);
        assert_eq!(select_pivots(8, 8), (0..8).collect::<Vec<_>>());
        assert_eq!(select_pivots(2, 5), vec![0; 5]);
    }

    #[test]
    fn test_build_shapes() {
        let index = PivotIndex::build(Matrix::<f32>::random(100, 20, 42), config(8, 5)).unwrap();

        assert_eq!(index.len(), 100);
        assert!(!index.is_empty());
        assert_eq!(index.dimension(), 20);
        assert_eq!(index.num_pivots(), 8);
        assert_eq!(index.pivot_ids(), &[0, 12, 24, 36, 48, 60, 72, 84]);
        assert_eq!(index.pivot_distances(99).len(), 8);
        assert_eq!(index.sketch(3).count_selected(), 5);
    }

    #[test]
    fn test_table_matches_recomputed_distances() {
        let dataset = Matrix::<f64>::random(64, 16, 7);
        let index = PivotIndex::build(dataset.clone(), config(5, 4)).unwrap();

        for (j, &pivot) in index.pivot_ids().iter().enumerate() {
            assert_eq!(index.pivot_sketch(j), index.sketch(pivot));
        }
        for i in 0..dataset.rows() {
            let row = quantize(dataset.row(i), 4);
            assert_eq!(index.sketch(i), row.as_sketch_ref());
            for (j, &pivot) in index.pivot_ids().iter().enumerate() {
                let p = quantize(dataset.row(pivot), 4);
                let expected = crate::distance::sketch_distance(row.as_sketch_ref(), p.as_sketch_ref());
                assert_eq!(index.pivot_distances(i)[j], expected);
            }
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = PivotIndex::build(Matrix::<f32>::random(200, 32, 5), IndexConfig::new(16, 8)).unwrap();
        let b = PivotIndex::build(Matrix::<f32>::random(200, 32, 5), IndexConfig::new(16, 8)).unwrap();
        assert_eq!(a.pivot_ids(), b.pivot_ids());
        assert_eq!(a.dist, b.dist);
        assert_eq!(a.positive, b.positive);
        assert_eq!(a.negative, b.negative);
    }

    #[test]
    fn test_kernels_build_identical_tables() {
        let dataset = Matrix::<f32>::random(90, 77, 11);
        let reference = PivotIndex::build(dataset.clone(), config(6, 20)).unwrap();
        for kernel in SketchKernel::available() {
            let index = PivotIndex::build(dataset.clone(), IndexConfig::new(6, 20).with_kernel(kernel))
                .unwrap();
            assert_eq!(index.dist, reference.dist, "kernel {}", kernel);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        let dataset = Matrix::<f32>::random(10, 4, 1);
        assert!(matches!(
            PivotIndex::build(dataset.clone(), config(0, 2)),
            Err(PivotKnnError::InvalidParameter(_))
        ));
        assert!(matches!(
            PivotIndex::build(dataset, config(2, 0)),
            Err(PivotKnnError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_empty_dataset() {
        let no_rows = Matrix::<f32>::new(0, 4, Vec::new()).unwrap();
        assert!(matches!(
            PivotIndex::build(no_rows, config(1, 1)),
            Err(PivotKnnError::EmptyDataset)
        ));

        let no_cols = Matrix::<f32>::new(3, 0, Vec::new()).unwrap();
        assert!(matches!(
            PivotIndex::build(no_cols, config(1, 1)),
            Err(PivotKnnError::EmptyDataset)
        ));
    }

    #[test]
    fn test_more_pivots_than_rows_aliases() {
        let index = PivotIndex::build(Matrix::<f32>::random(3, 4, 2), config(5, 2)).unwrap();
        assert_eq!(index.pivot_ids(), &[0; 5]);

        let stats = index.statistics();
        assert_eq!(stats.distinct_pivots, 1);
        assert!(stats.aliased_pivots());
        let first = index.pivot_distances(1)[0];
        assert!(index.pivot_distances(1).iter().all(|&d| d == first));
    }

    #[test]
    fn test_quantization_clamped_to_dimension() {
        let index = PivotIndex::build(Matrix::<f32>::random(10, 3, 2), config(2, 50)).unwrap();
        assert_eq!(index.quantization(), 50);
        assert_eq!(index.statistics().effective_quantization, 3);
        assert_eq!(index.sketch(0).count_selected(), 3);
    }

    #[test]
    fn test_statistics_sizes() {
        let index = PivotIndex::build(Matrix::<f32>::random(40, 10, 2), config(4, 3)).unwrap();
        let stats = index.statistics();
        assert_eq!(stats.sketch_bytes, 2 * 40 * 10 + 2 * 4 * 10);
        assert_eq!(stats.table_bytes, 40 * 4 * 4);
        assert_eq!(stats.dataset_bytes, 40 * 10 * 4);
        assert_eq!(stats.kernel, "scalar");
    }
}
