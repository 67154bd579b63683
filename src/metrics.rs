//! Metrics and statistics for index monitoring.
//!
//! # Index Statistics
//!
//! ```ignore
//! let index = PivotIndex::build(dataset, IndexConfig::new(16, 64))?;
//! println!("{}", index.statistics().summary());
//! // IndexStatistics:
//! //   Rows: 2000 x 256, pivots: 16 (16 distinct)
//! //   Quantization: x=64 (effective 64)
//! //   Memory: 3.05 MB (sketches 0.98 MB, table 0.12 MB, dataset 1.95 MB)
//! //   Kernel: avx2
//! ```
//!
//! # Query Statistics
//!
//! ```ignore
//! let (neighbors, stats) = index.search_with_stats(&query, 8)?;
//! println!("pruned {:.1}% of rows", stats.pruning_ratio() * 100.0);
//! ```

use std::time::Duration;

use serde::Serialize;

/// Statistics about the current state of a pivot index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexStatistics {
    /// Number of dataset rows (`n`).
    pub num_rows: usize,
    /// Vector dimension (`D`).
    pub dimension: usize,
    /// Number of pivots (`h`).
    pub num_pivots: usize,
    /// Number of distinct pivot rows; below `num_pivots` when pivots alias.
    pub distinct_pivots: usize,
    /// Configured quantization budget (`x`).
    pub quantization: usize,
    /// Components actually kept per sketch, `min(x, D)`.
    pub effective_quantization: usize,
    /// Bytes held by dataset and pivot sketches.
    pub sketch_bytes: usize,
    /// Bytes held by the `n × h` distance table.
    pub table_bytes: usize,
    /// Bytes held by the owned dataset.
    pub dataset_bytes: usize,
    /// Sketch kernel in use.
    pub kernel: &'static str,
}

impl IndexStatistics {
    /// Total bytes owned by the index.
    pub fn memory_bytes(&self) -> usize {
        self.sketch_bytes + self.table_bytes + self.dataset_bytes
    }

    /// True if several pivots refer to the same dataset row.
    pub fn aliased_pivots(&self) -> bool {
        self.distinct_pivots < self.num_pivots
    }

    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        const MB: f64 = 1024.0 * 1024.0;
        format!(
            "IndexStatistics:\n  \
             Rows: {} x {}, pivots: {} ({} distinct)\n  \
             Quantization: x={} (effective {})\n  \
             Memory: {:.2} MB (sketches {:.2} MB, table {:.2} MB, dataset {:.2} MB)\n  \
             Kernel: {}",
            self.num_rows,
            self.dimension,
            self.num_pivots,
            self.distinct_pivots,
            self.quantization,
            self.effective_quantization,
            self.memory_bytes() as f64 / MB,
            self.sketch_bytes as f64 / MB,
            self.table_bytes as f64 / MB,
            self.dataset_bytes as f64 / MB,
            self.kernel
        )
    }
}

/// Statistics about one or more bounded k-NN queries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryStatistics {
    /// Number of queries aggregated.
    pub queries: usize,
    /// Wall-clock time spent (summed over queries when merged).
    pub query_time: Duration,
    /// Dataset rows visited.
    pub rows_scanned: usize,
    /// Rows skipped because their lower bound reached the current worst candidate.
    pub rows_pruned: usize,
    /// Exact sketch distances evaluated against dataset rows.
    pub exact_distances: usize,
    /// Slots holding a dataset row at the end of the query.
    pub finalists: usize,
}

impl QueryStatistics {
    /// Get query time in milliseconds.
    pub fn query_time_ms(&self) -> f64 {
        self.query_time.as_secs_f64() * 1000.0
    }

    /// Fraction of scanned rows that were pruned, 0.0 when nothing was scanned.
    pub fn pruning_ratio(&self) -> f64 {
        if self.rows_scanned == 0 {
            0.0
        } else {
            self.rows_pruned as f64 / self.rows_scanned as f64
        }
    }

    /// Accumulate another set of statistics into this one.
    pub fn merge(&mut self, other: &QueryStatistics) {
        self.queries += other.queries;
        self.query_time += other.query_time;
        self.rows_scanned += other.rows_scanned;
        self.rows_pruned += other.rows_pruned;
        self.exact_distances += other.exact_distances;
        self.finalists += other.finalists;
    }

    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "QueryStatistics:\n  \
             Queries: {}\n  \
             Time: {:.3}ms\n  \
             Rows scanned: {}\n  \
             Rows pruned: {} ({:.1}%)\n  \
             Exact sketch distances: {}\n  \
             Finalists: {}",
            self.queries,
            self.query_time_ms(),
            self.rows_scanned,
            self.rows_pruned,
            self.pruning_ratio() * 100.0,
            self.exact_distances,
            self.finalists
        )
    }
}

/// Builder for collecting statistics during a query.
#[derive(Default)]
pub struct QueryStatsBuilder {
    stats: QueryStatistics,
}

impl QueryStatsBuilder {
    /// Create a new builder for a single query.
    pub fn new() -> Self {
        Self {
            stats: QueryStatistics {
                queries: 1,
                ..QueryStatistics::default()
            },
        }
    }

    /// Record one visited row.
    #[inline]
    pub fn row_scanned(&mut self) {
        self.stats.rows_scanned += 1;
    }

    /// Record one pruned row.
    #[inline]
    pub fn row_pruned(&mut self) {
        self.stats.rows_pruned += 1;
    }

    /// Record one exact sketch distance evaluation.
    #[inline]
    pub fn exact_distance(&mut self) {
        self.stats.exact_distances += 1;
    }

    /// Record the number of occupied slots after the scan.
    pub fn finalists(&mut self, count: usize) {
        self.stats.finalists = count;
    }

    /// Set the query execution time.
    pub fn set_query_time(&mut self, duration: Duration) {
        self.stats.query_time = duration;
    }

    /// Build the final statistics.
    pub fn build(self) -> QueryStatistics {
        self.stats
    }
}

/// Timing report for one build-and-query run.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct BenchmarkReport {
    /// Element type of dataset and queries.
    pub precision: &'static str,
    /// Sketch kernel used.
    pub kernel: &'static str,
    /// Dataset rows.
    pub rows: usize,
    /// Vector dimension.
    pub dimension: usize,
    /// Number of queries.
    pub queries: usize,
    /// Pivots (`h`).
    pub pivots: usize,
    /// Neighbors per query (`k`).
    pub neighbors: usize,
    /// Quantization budget (`x`).
    pub quantization: usize,
    /// Index build time in milliseconds.
    pub build_ms: f64,
    /// Batch query time in milliseconds.
    pub query_ms: f64,
    /// Build plus query time in milliseconds.
    pub total_ms: f64,
    /// Queries per second over the batch.
    pub throughput_qps: f64,
    /// Fraction of rows pruned over the batch.
    pub pruning_ratio: f64,
}

impl BenchmarkReport {
    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "=====================================\n\
             \x20              BENCHMARK\n\
             =====================================\n\
             precision / kernel : {} / {}\n\
             dataset            : {} x {}\n\
             queries            : {} (h={}, k={}, x={})\n\
             build index        : {:.2} ms\n\
             knn queries        : {:.2} ms ({:.0} queries/s)\n\
             total runtime      : {:.2} ms\n\
             rows pruned        : {:.1}%\n\
             =====================================",
            self.precision,
            self.kernel,
            self.rows,
            self.dimension,
            self.queries,
            self.pivots,
            self.neighbors,
            self.quantization,
            self.build_ms,
            self.query_ms,
            self.throughput_qps,
            self.total_ms,
            self.pruning_ratio * 100.0
        )
    }
}

/// Convert a duration to fractional milliseconds.
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
