//! Bounded k-NN query over a [`PivotIndex`].
//!
//! The query sketch is compared once against every pivot. For each dataset
//! row the precomputed pivot distances then give
//!
//! ```text
//! d* = max_j |dist[i][j] - dq[j]|
//! ```
//!
//! and the row is skipped without touching its sketch when `d*` reaches the
//! current worst of the `k` candidate slots. Surviving rows get an exact
//! sketch distance and replace the worst slot when strictly closer. Finally
//! every occupied slot is scored with the Euclidean distance.
//!
//! Slots are returned in insertion order, not sorted.

use std::time::Instant;

use rayon::prelude::*;

use crate::constants::format::EMPTY_ID;
use crate::error::{try_zeroed, PivotKnnError, Result};
use crate::matrix::Matrix;
use crate::metrics::{QueryStatistics, QueryStatsBuilder};
use crate::quantize::{Quantizer, SketchRef};
use crate::types::Float;

use super::PivotIndex;

/// One candidate slot of a query result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor<T> {
    /// Dataset row, `None` for a slot that was never filled.
    pub id: Option<usize>,
    /// Sketch distance to the query (lower is closer).
    pub dist_approx: i32,
    /// Euclidean distance to the query, infinite for empty slots.
    pub dist_real: T,
}

impl<T: Float> Neighbor<T> {
    /// An empty slot.
    pub fn empty() -> Self {
        Self {
            id: None,
            dist_approx: i32::MAX,
            dist_real: T::INFINITY,
        }
    }

    /// True if no dataset row occupies this slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
    }

    /// Id as written to reference files: the row index, or `-1` when empty.
    ///
    /// Row indexes above `i32::MAX` saturate to `i32::MAX`; use
    /// [`KnnResults::to_id_matrix`] for output that must be exact.
    pub fn raw_id(&self) -> i32 {
        self.id
            .map_or(EMPTY_ID, |id| i32::try_from(id).unwrap_or(i32::MAX))
    }
}

impl<T: Float> Default for Neighbor<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Results of a batch query: `k` slots per query, stored contiguously.
#[derive(Clone, Debug, PartialEq)]
pub struct KnnResults<T> {
    k: usize,
    queries: usize,
    neighbors: Vec<Neighbor<T>>,
}

impl<T: Float> KnnResults<T> {
    /// Slots per query.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of queries.
    pub fn num_queries(&self) -> usize {
        self.queries
    }

    /// Slots of query `q`, in insertion order.
    ///
    /// # Panics
    /// Panics if `q >= num_queries()`.
    pub fn row(&self, q: usize) -> &[Neighbor<T>] {
        assert!(q < self.queries, "query index out of range");
        &self.neighbors[q * self.k..(q + 1) * self.k]
    }

    /// Slots of query `q` sorted by Euclidean distance, ties by row id.
    ///
    /// Empty slots sort last.
    pub fn sorted_row(&self, q: usize) -> Vec<Neighbor<T>> {
        let mut row = self.row(q).to_vec();
        row.sort_by(|a, b| {
            a.dist_real
                .total_cmp(&b.dist_real)
                .then_with(|| a.raw_id().cmp(&b.raw_id()))
        });
        row
    }

    /// Iterate over the per-query slot arrays.
    pub fn iter(&self) -> impl Iterator<Item = &[Neighbor<T>]> + '_ {
        (0..self.queries).map(move |q| self.row(q))
    }

    /// All slots, query-major.
    pub fn as_slice(&self) -> &[Neighbor<T>] {
        &self.neighbors
    }

    /// Ids as a `Q × k` matrix, `-1` marking empty slots.
    ///
    /// # Errors
    /// [`PivotKnnError::InvalidParameter`] if a row index does not fit in an `i32`.
    pub fn to_id_matrix(&self) -> Result<Matrix<i32>> {
        let data = self
            .neighbors
            .iter()
            .map(|n| match n.id {
                None => Ok(EMPTY_ID),
                Some(id) => i32::try_from(id).map_err(|_| {
                    PivotKnnError::invalid_parameter(format!(
                        "row id {id} does not fit in an i32 id file"
                    ))
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Matrix::new(self.queries, self.k, data)
    }

    /// Euclidean distances as a `Q × k` matrix.
    pub fn to_distance_matrix(&self) -> Result<Matrix<T>> {
        let data = self.neighbors.iter().map(|n| n.dist_real).collect();
        Matrix::new(self.queries, self.k, data)
    }
}

impl<T: Float> PivotIndex<T> {
    /// Find up to `k` approximate nearest neighbors of `query`, quantizing it
    /// with the index's budget.
    ///
    /// Returns exactly `k` slots; only the first `min(k, n)` can be filled.
    ///
    /// # Errors
    /// [`PivotKnnError::DimensionMismatch`] if `query.len()` differs from the
    /// index dimension.
    pub fn search(&self, query: &[T], k: usize) -> Result<Vec<Neighbor<T>>> {
        self.search_with_budget(query, k, self.quantization)
    }

    /// Like [`search`](Self::search) but quantizes the query with budget `x`.
    ///
    /// The lower bound is only meaningful when `x` matches the build budget.
    pub fn search_with_budget(&self, query: &[T], k: usize, x: usize) -> Result<Vec<Neighbor<T>>> {
        self.check_query(query)?;
        let mut slots = vec![Neighbor::empty(); k];
        let mut stats = QueryStatsBuilder::new();
        self.scan(query, &mut slots, &mut Quantizer::new(x), &mut stats);
        Ok(slots)
    }

    /// Like [`search`](Self::search), also returning pruning statistics.
    pub fn search_with_stats(
        &self,
        query: &[T],
        k: usize,
    ) -> Result<(Vec<Neighbor<T>>, QueryStatistics)> {
        self.check_query(query)?;
        let start = Instant::now();
        let mut slots = vec![Neighbor::empty(); k];
        let mut stats = QueryStatsBuilder::new();
        self.scan(query, &mut slots, &mut Quantizer::new(self.quantization), &mut stats);
        stats.set_query_time(start.elapsed());
        Ok((slots, stats.build()))
    }

    /// Sketch distance of `query` to every pivot.
    pub fn query_pivot_distances(&self, query: SketchRef<'_>) -> Vec<i32> {
        (0..self.num_pivots())
            .map(|j| (self.distance_fn)(query, self.pivot_sketch(j)))
            .collect()
    }

    /// Lower bound `max_j |dist[row][j] - query_pivots[j]|` for `row`.
    ///
    /// # Panics
    /// Panics if `row >= len()`.
    #[inline]
    pub fn lower_bound(&self, row: usize, query_pivots: &[i32]) -> i32 {
        self.pivot_distances(row)
            .iter()
            .zip(query_pivots)
            .map(|(&d, &q)| (d - q).abs())
            .max()
            .unwrap_or(0)
    }

    /// Query every row of `queries`, in parallel across queries.
    ///
    /// # Errors
    /// [`PivotKnnError::DimensionMismatch`] if the query width differs from
    /// the index dimension, [`PivotKnnError::AllocationFailed`] if the result
    /// buffer cannot be reserved.
    pub fn batch_search(&self, queries: &Matrix<T>, k: usize) -> Result<KnnResults<T>> {
        self.batch_search_with_stats(queries, k).map(|(results, _)| results)
    }

    /// Like [`batch_search`](Self::batch_search), also returning statistics
    /// aggregated over all queries.
    pub fn batch_search_with_stats(
        &self,
        queries: &Matrix<T>,
        k: usize,
    ) -> Result<(KnnResults<T>, QueryStatistics)> {
        self.run_batch(queries, k, self.quantization)
    }

    /// Like [`batch_search`](Self::batch_search) but quantizes every query
    /// with budget `x`.
    ///
    /// The lower bound is only meaningful when `x` matches the build budget.
    pub fn batch_search_with_budget(
        &self,
        queries: &Matrix<T>,
        k: usize,
        x: usize,
    ) -> Result<KnnResults<T>> {
        self.run_batch(queries, k, x).map(|(results, _)| results)
    }

    fn run_batch(
        &self,
        queries: &Matrix<T>,
        k: usize,
        x: usize,
    ) -> Result<(KnnResults<T>, QueryStatistics)> {
        if queries.cols() != self.dimension() {
            return Err(PivotKnnError::dimension_mismatch(
                self.dimension(),
                queries.cols(),
            ));
        }

        let q = queries.rows();
        let total = q
            .checked_mul(k)
            .ok_or_else(|| PivotKnnError::allocation_failed("query results", usize::MAX))?;
        let mut neighbors = try_zeroed::<Neighbor<T>>("query results", total)?;

        let start = Instant::now();
        let mut stats = if k == 0 {
            QueryStatistics {
                queries: q,
                ..QueryStatistics::default()
            }
        } else {
            neighbors
                .par_chunks_mut(k)
                .zip(queries.as_slice().par_chunks(self.dimension()))
                .map_init(
                    || Quantizer::new(x),
                    |quantizer, (slots, query)| {
                        let query_start = Instant::now();
                        let mut builder = QueryStatsBuilder::new();
                        self.scan(query, slots, quantizer, &mut builder);
                        builder.set_query_time(query_start.elapsed());
                        builder.build()
                    },
                )
                .reduce(QueryStatistics::default, |mut acc, s| {
                    acc.merge(&s);
                    acc
                })
        };
        let elapsed = start.elapsed();

        tracing::info!(
            queries = q,
            k = k,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            pruning_ratio = stats.pruning_ratio(),
            "batch query finished"
        );
        stats.query_time = elapsed;

        Ok((
            KnnResults {
                k,
                queries: q,
                neighbors,
            },
            stats,
        ))
    }

    fn check_query(&self, query: &[T]) -> Result<()> {
        if query.len() != self.dimension() {
            return Err(PivotKnnError::dimension_mismatch(self.dimension(), query.len()));
        }
        Ok(())
    }

    /// Fill `slots` with the candidates for `query`.
    ///
    /// `query.len()` must equal the index dimension.
    fn scan(
        &self,
        query: &[T],
        slots: &mut [Neighbor<T>],
        quantizer: &mut Quantizer,
        stats: &mut QueryStatsBuilder,
    ) {
        slots.fill(Neighbor::empty());

        let active = slots.len().min(self.len());
        if active == 0 {
            return;
        }
        let slots = &mut slots[..active];

        let sketch = quantizer.quantize(query);
        let query_sketch = sketch.as_sketch_ref();
        let query_pivots = self.query_pivot_distances(query_sketch);

        for row in 0..self.len() {
            stats.row_scanned();

            let bound = self.lower_bound(row, &query_pivots);
            let worst = worst_slot(slots);
            let worst_dist = slots[worst].dist_approx;
            if bound >= worst_dist {
                stats.row_pruned();
                continue;
            }

            stats.exact_distance();
            let d = (self.distance_fn)(query_sketch, self.sketch(row));
            if d < worst_dist {
                slots[worst] = Neighbor {
                    id: Some(row),
                    dist_approx: d,
                    dist_real: T::INFINITY,
                };
            }
        }

        let mut finalists = 0;
        for slot in slots.iter_mut() {
            if let Some(id) = slot.id {
                slot.dist_real = T::euclidean_distance(query, self.dataset.row(id));
                finalists += 1;
            }
        }
        stats.finalists(finalists);
    }
}

/// Index of the slot with the largest `dist_approx`, first occurrence on ties.
#[inline]
fn worst_slot<T>(slots: &[Neighbor<T>]) -> usize {
    let mut worst = 0;
    for (i, slot) in slots.iter().enumerate().skip(1) {
        if slot.dist_approx > slots[worst].dist_approx {
            worst = i;
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::SketchKernel;
    use crate::index::IndexConfig;
    use crate::quantize::quantize;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn build(rows: Vec<Vec<f32>>, h: usize, x: usize) -> PivotIndex<f32> {
        let dataset = Matrix::from_rows(rows).unwrap();
        PivotIndex::build(dataset, IndexConfig::new(h, x).with_kernel(SketchKernel::Scalar)).unwrap()
    }

    fn ternary_l1(a: SketchRef<'_>, b: SketchRef<'_>) -> i32 {
        (0..a.dim())
            .map(|i| {
                let sa = a.positive[i] as i32 - a.negative[i] as i32;
                let sb = b.positive[i] as i32 - b.negative[i] as i32;
                (sa - sb).abs()
            })
            .sum()
    }

    #[test]
    fn test_worst_slot_first_occurrence() {
        let mk = |d| Neighbor::<f32> {
            id: Some(0),
            dist_approx: d,
            dist_real: 0.0,
        };
        assert_eq!(worst_slot(&[mk(1), mk(3), mk(3), mk(2)]), 1);
        assert_eq!(worst_slot(&[Neighbor::<f32>::empty(), Neighbor::empty()]), 0);
    }

    #[test]
    fn test_end_to_end_two_dimensions() {
        let index = build(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0], vec![5.0, -5.0]],
            2,
            1,
        );
        assert_eq!(index.pivot_ids(), &[0, 2]);

        let result = index.search(&[1.0, 1.0], 2).unwrap();
        assert_eq!(result.len(), 2);

        let mut ids: Vec<usize> = result.iter().filter_map(|n| n.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
        for n in &result {
            assert!((n.dist_real - 1.0).abs() < 1e-6);
        }

        // Lowest-index tie rule: insertion order is row 0 then row 1.
        assert_eq!(result[0].id, Some(0));
        assert_eq!(result[0].dist_approx, 1);
        assert_eq!(result[1].id, Some(1));
        assert_eq!(result[1].dist_approx, 0);
    }

    #[test]
    fn test_k_larger_than_dataset() {
        let index = build(vec![vec![1.0, 2.0], vec![-1.0, 0.5], vec![3.0, -3.0]], 1, 1);
        let result = index.search(&[0.0, 1.0], 5).unwrap();

        assert_eq!(result.len(), 5);
        let mut ids: Vec<usize> = result[..3].iter().map(|n| n.id.unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);
        for slot in &result[3..] {
            assert!(slot.is_empty());
            assert_eq!(slot.dist_approx, i32::MAX);
            assert!(slot.dist_real.is_infinite());
            assert_eq!(slot.raw_id(), -1);
        }
    }

    #[test]
    fn test_pivot_equal_to_nearest_neighbor_survives() {
        let index = build(
            vec![
                vec![1.0, 0.0, 0.0, 0.0],
                vec![0.0, 2.0, 0.0, 0.0],
                vec![-3.0, 0.0, 0.0, 0.0],
                vec![0.0, 0.0, 0.0, 4.0],
            ],
            1,
            1,
        );
        assert_eq!(index.pivot_ids(), &[0]);

        let (result, stats) = index.search_with_stats(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(result[0].id, Some(0));
        assert_eq!(result[0].dist_real, 0.0);
        assert_eq!(stats.rows_scanned, 4);
        assert_eq!(stats.rows_pruned, 3);
        assert_eq!(stats.exact_distances, 1);
        assert_eq!(stats.finalists, 1);
    }

    #[test]
    fn test_lower_bound_never_exceeds_sketch_l1() {
        let mut rng = StdRng::seed_from_u64(17);
        for trial in 0..10 {
            let n = rng.gen_range(20..80);
            let dim = rng.gen_range(4..40);
            let h = rng.gen_range(1..10);
            let x = rng.gen_range(1..=dim);
            let dataset = Matrix::<f32>::random(n, dim, trial);
            let index = PivotIndex::build(dataset, IndexConfig::new(h, x)).unwrap();

            for _ in 0..5 {
                let query: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
                let sketch = quantize(&query, x);
                let dq = index.query_pivot_distances(sketch.as_sketch_ref());
                for row in 0..n {
                    let bound = index.lower_bound(row, &dq);
                    assert!(bound >= 0);
                    assert!(bound <= ternary_l1(sketch.as_sketch_ref(), index.sketch(row)));
                }
            }
        }
    }

    #[test]
    fn test_dataset_row_as_query_bound_is_zero() {
        let dataset = Matrix::<f64>::random(50, 16, 3);
        let index = PivotIndex::build(dataset.clone(), IndexConfig::new(5, 6)).unwrap();
        for row in 0..dataset.rows() {
            let sketch = quantize(dataset.row(row), 6);
            let dq = index.query_pivot_distances(sketch.as_sketch_ref());
            assert_eq!(index.lower_bound(row, &dq), 0);
        }
    }

    #[test]
    fn test_finalists_have_exact_real_distance() {
        let dataset = Matrix::<f32>::random(300, 24, 9);
        let index = PivotIndex::build(dataset.clone(), IndexConfig::new(8, 6)).unwrap();
        let query = dataset.row(17).to_vec();

        let result = index.search(&query, 8).unwrap();
        for n in result.iter().filter(|n| !n.is_empty()) {
            let id = n.id.unwrap();
            let expected = crate::distance::scalar::euclidean_distance(&query, dataset.row(id));
            assert!((n.dist_real - expected).abs() < 1e-4);
            let approx = crate::distance::sketch_distance(
                quantize(&query, 6).as_sketch_ref(),
                index.sketch(id),
            );
            assert_eq!(n.dist_approx, approx);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = build(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 1, 1);
        assert!(matches!(
            index.search(&[1.0, 2.0, 3.0], 1),
            Err(PivotKnnError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));

        let queries = Matrix::<f32>::random(3, 5, 0);
        assert!(matches!(
            index.batch_search(&queries, 1),
            Err(PivotKnnError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_zero_k() {
        let index = build(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 1, 1);
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());

        let results = index.batch_search(&Matrix::random(4, 2, 1), 0).unwrap();
        assert_eq!(results.num_queries(), 4);
        assert!(results.row(2).is_empty());
        assert_eq!(results.to_id_matrix().unwrap().rows(), 4);
    }

    #[test]
    fn test_batch_matches_single_queries() {
        let dataset = Matrix::<f32>::random(500, 32, 21);
        let queries = Matrix::<f32>::random(40, 32, 22);
        let index = PivotIndex::build(dataset, IndexConfig::new(16, 8)).unwrap();

        let (results, stats) = index.batch_search_with_stats(&queries, 6).unwrap();
        assert_eq!(results.num_queries(), 40);
        assert_eq!(results.k(), 6);
        assert_eq!(stats.queries, 40);
        assert_eq!(stats.rows_scanned, 40 * 500);
        assert_eq!(stats.rows_pruned + stats.exact_distances, stats.rows_scanned);

        for (q, row) in results.iter().enumerate() {
            assert_eq!(row, index.search(queries.row(q), 6).unwrap().as_slice());
        }
    }

    #[test]
    fn test_sorted_row_and_matrices() {
        let index = build(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0], vec![5.0, -5.0]],
            2,
            2,
        );
        let queries = Matrix::from_rows(vec![vec![1.0f32, 1.0], vec![4.0, 4.0]]).unwrap();
        let results = index.batch_search(&queries, 3).unwrap();

        for q in 0..results.num_queries() {
            let sorted = results.sorted_row(q);
            assert_eq!(sorted.len(), 3);
            assert!(sorted.windows(2).all(|w| w[0].dist_real <= w[1].dist_real));
        }

        let ids = results.to_id_matrix().unwrap();
        let dists = results.to_distance_matrix().unwrap();
        assert_eq!((ids.rows(), ids.cols()), (2, 3));
        assert_eq!((dists.rows(), dists.cols()), (2, 3));
        for q in 0..2 {
            for (r, n) in results.row(q).iter().enumerate() {
                assert_eq!(ids.row(q)[r], n.raw_id());
                assert_eq!(dists.row(q)[r].to_bits(), n.dist_real.to_bits());
            }
        }
    }

    #[test]
    fn test_search_with_budget() {
        let index = build(vec![vec![3.0, 2.0, 1.0], vec![-3.0, -2.0, -1.0]], 1, 1);
        let narrow = index.search_with_budget(&[3.0, 2.0, 1.0], 1, 1).unwrap();
        let wide = index.search_with_budget(&[3.0, 2.0, 1.0], 1, 3).unwrap();
        assert_eq!(narrow[0].id, Some(0));
        assert_eq!(narrow[0].dist_approx, 1);
        assert_eq!(wide[0].id, Some(0));
        assert_eq!(wide[0].dist_approx, 1);
    }

    #[test]
    fn test_batch_with_budget_matches_single_queries() {
        let dataset = Matrix::<f32>::random(500, 24, 17);
        let queries = Matrix::<f32>::random(12, 24, 18);
        let index = PivotIndex::build(dataset, IndexConfig::new(6, 8)).unwrap();

        for x in [3, 8, 24] {
            let batch = index.batch_search_with_budget(&queries, 5, x).unwrap();
            assert_eq!(batch.num_queries(), 12);
            for q in 0..queries.rows() {
                let single = index.search_with_budget(queries.row(q), 5, x).unwrap();
                assert_eq!(batch.row(q), single.as_slice(), "query {} budget {}", q, x);
            }
        }

        let default_budget = index.batch_search_with_budget(&queries, 5, 8).unwrap();
        assert_eq!(default_budget, index.batch_search(&queries, 5).unwrap());
    }

    #[test]
    fn test_id_matrix_rejects_ids_beyond_i32() {
        let too_large = i32::MAX as usize + 1;
        let results = KnnResults::<f32> {
            k: 2,
            queries: 1,
            neighbors: vec![
                Neighbor {
                    id: Some(too_large),
                    dist_approx: 0,
                    dist_real: 1.0,
                },
                Neighbor::empty(),
            ],
        };
        assert!(matches!(
            results.to_id_matrix(),
            Err(PivotKnnError::InvalidParameter(_))
        ));
        assert_eq!(results.row(0)[0].raw_id(), i32::MAX);

        let fitting = KnnResults::<f32> {
            k: 2,
            queries: 1,
            neighbors: vec![
                Neighbor {
                    id: Some(i32::MAX as usize),
                    dist_approx: 0,
                    dist_real: 1.0,
                },
                Neighbor::empty(),
            ],
        };
        assert_eq!(fitting.to_id_matrix().unwrap().as_slice(), &[i32::MAX, -1]);
    }
}
