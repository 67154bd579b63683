//! Comparison of query results against reference output.
//!
//! Reference data is a pair of `Q × k` matrices: neighbor ids (`-1` for an
//! empty slot) and real distances. Slots are compared positionally, so the
//! reference must follow the same insertion-order convention as the query.
//! A slot matches when the ids are equal and the distances differ by less
//! than [`Float::COMPARE_TOLERANCE`]. Two empty slots always match, whatever
//! sentinel the reference used for their distance.

use std::collections::HashSet;
use std::fmt;

use crate::error::{PivotKnnError, Result};
use crate::index::KnnResults;
use crate::matrix::Matrix;
use crate::types::Float;

/// One slot of one query, next to its reference value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankComparison<T> {
    /// Slot position.
    pub rank: usize,
    /// Computed id (`-1` when empty).
    pub id: i32,
    /// Reference id.
    pub ref_id: i32,
    /// Computed real distance.
    pub dist: T,
    /// Reference real distance.
    pub ref_dist: T,
    /// Ids are equal.
    pub id_ok: bool,
    /// Distances agree within tolerance.
    pub dist_ok: bool,
}

impl<T> RankComparison<T> {
    /// Both id and distance agree.
    pub fn is_match(&self) -> bool {
        self.id_ok && self.dist_ok
    }
}

/// Per-query comparison.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryComparison<T> {
    /// Query row.
    pub query: usize,
    /// One entry per slot.
    pub ranks: Vec<RankComparison<T>>,
    /// Set-overlap recall of the non-empty ids against the reference.
    pub recall: f32,
}

impl<T> QueryComparison<T> {
    /// Every slot agrees.
    pub fn all_match(&self) -> bool {
        self.ranks.iter().all(RankComparison::is_match)
    }
}

/// Outcome of [`compare_results`].
#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonReport<T> {
    /// One entry per query.
    pub queries: Vec<QueryComparison<T>>,
}

impl<T> ComparisonReport<T> {
    /// Number of queries whose slots all agree.
    pub fn matching_queries(&self) -> usize {
        self.queries.iter().filter(|q| q.all_match()).count()
    }

    /// True if every query agrees with the reference.
    pub fn all_match(&self) -> bool {
        self.queries.iter().all(QueryComparison::all_match)
    }

    /// Mean recall over all queries, 1.0 for an empty report.
    pub fn mean_recall(&self) -> f32 {
        if self.queries.is_empty() {
            return 1.0;
        }
        self.queries.iter().map(|q| q.recall).sum::<f32>() / self.queries.len() as f32
    }
}

impl<T: Float> fmt::Display for ComparisonReport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==============================")?;
        writeln!(f, " RESULT COMPARISON")?;
        writeln!(f, "==============================")?;
        for query in &self.queries {
            writeln!(f)?;
            writeln!(f, "Query {}:", query.query)?;
            for r in &query.ranks {
                writeln!(
                    f,
                    "  k={} -> id: {} (ref {})   dist: {:.6} (ref {:.6}){}",
                    r.rank,
                    r.id,
                    r.ref_id,
                    r.dist,
                    r.ref_dist,
                    if r.is_match() { "  OK" } else { "  *** MISMATCH ***" }
                )?;
            }
            if query.all_match() {
                writeln!(f, "  All values match.")?;
            } else {
                writeln!(f, "  Differences found (recall {:.2}).", query.recall)?;
            }
        }
        writeln!(f)?;
        write!(
            f,
            "{}/{} queries match, mean recall {:.4}",
            self.matching_queries(),
            self.queries.len(),
            self.mean_recall()
        )
    }
}

/// Compare `results` slot by slot with reference ids and distances.
///
/// # Errors
/// [`PivotKnnError::DimensionMismatch`] if either reference matrix is not
/// `num_queries × k`.
pub fn compare_results<T: Float>(
    results: &KnnResults<T>,
    ref_ids: &Matrix<i32>,
    ref_dist: &Matrix<T>,
) -> Result<ComparisonReport<T>> {
    check_shape(results, ref_ids.rows(), ref_ids.cols())?;
    check_shape(results, ref_dist.rows(), ref_dist.cols())?;

    let queries = results
        .iter()
        .enumerate()
        .map(|(q, row)| {
            let ids = ref_ids.row(q);
            let dists = ref_dist.row(q);

            let ranks = row
                .iter()
                .enumerate()
                .map(|(rank, n)| {
                    let id = n.raw_id();
                    let ref_id = ids[rank];
                    let id_ok = id == ref_id;
                    let both_empty = n.is_empty() && ref_id < 0;
                    let dist_ok = both_empty
                        || (n.dist_real - dists[rank]).abs() < T::COMPARE_TOLERANCE;
                    RankComparison {
                        rank,
                        id,
                        ref_id,
                        dist: n.dist_real,
                        ref_dist: dists[rank],
                        id_ok,
                        dist_ok,
                    }
                })
                .collect();

            let predicted: Vec<i32> = row.iter().filter(|n| !n.is_empty()).map(|n| n.raw_id()).collect();
            let truth: Vec<i32> = ids.iter().copied().filter(|&id| id >= 0).collect();

            QueryComparison {
                query: q,
                ranks,
                recall: recall_at_k(&predicted, &truth, truth.len()),
            }
        })
        .collect();

    Ok(ComparisonReport { queries })
}

fn check_shape<T: Float>(results: &KnnResults<T>, rows: usize, cols: usize) -> Result<()> {
    if rows != results.num_queries() {
        return Err(PivotKnnError::dimension_mismatch(results.num_queries(), rows));
    }
    if cols != results.k() {
        return Err(PivotKnnError::dimension_mismatch(results.k(), cols));
    }
    Ok(())
}

/// Compute recall@k between predicted and ground truth ids.
///
/// Recall is the fraction of the first `k` true neighbors found among the
/// first `k` predicted ones, regardless of order. Returns 1.0 when `k` is 0.
pub fn recall_at_k(predicted: &[i32], ground_truth: &[i32], k: usize) -> f32 {
    if k == 0 {
        return 1.0;
    }
    let pred_set: HashSet<i32> = predicted.iter().take(k).copied().collect();
    let truth_set: HashSet<i32> = ground_truth.iter().take(k).copied().collect();

    let intersection = pred_set.intersection(&truth_set).count();
    intersection as f32 / k as f32
}
