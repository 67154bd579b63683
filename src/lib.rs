//! pivot-knn: approximate k-nearest-neighbor search with a pivot table over
//! signed binary sketches.
//!
//! Every vector is reduced to a *sketch*: the positions and signs of its `x`
//! largest-magnitude components. A handful of dataset rows serve as pivots,
//! and the sketch distance of every row to every pivot is precomputed. At
//! query time those distances bound the query-to-row sketch distance from
//! below, so most rows are discarded without being compared at all.
//!
//! # Features
//!
//! - **SIMD Sketch Distance**: SSE2/AVX2/NEON kernels, bit-exact with the scalar baseline
//! - **Automatic CPU Detection**: Falls back to scalar on unsupported hardware
//! - **Parallel Build and Batch Query**: Multi-core scaling with Rayon
//! - **f32 and f64 Datasets**: one generic implementation
//!
//! # Example
//!
//! ```
//! use pivot_knn::{Matrix, PivotIndexBuilder};
//!
//! let dataset = Matrix::<f32>::random(1000, 64, 1);
//! let queries = Matrix::<f32>::random(10, 64, 2);
//!
//! let index = PivotIndexBuilder::new()
//!     .pivots(16)
//!     .quantization(16)
//!     .build(dataset)
//!     .unwrap();
//!
//! let results = index.batch_search(&queries, 8).unwrap();
//! for neighbor in results.sorted_row(0) {
//!     println!("{:?} at {}", neighbor.id, neighbor.dist_real);
//! }
//! ```

pub mod compare;
pub mod config;
pub mod constants;
pub mod distance;
pub mod error;
pub mod index;
pub mod matrix;
pub mod metrics;
pub mod quantize;
pub mod types;

// Re-export commonly used types at crate root
pub use compare::{compare_results, recall_at_k, ComparisonReport};
pub use config::{KernelChoice, Precision, RunConfig};
pub use distance::{sketch_distance, SketchKernel};
pub use error::{PivotKnnError, Result};
pub use index::{IndexConfig, KnnResults, Neighbor, PivotIndex, PivotIndexBuilder};
pub use matrix::Matrix;
pub use metrics::{BenchmarkReport, IndexStatistics, QueryStatistics};
pub use quantize::{quantize, Quantizer, Sketch, SketchRef};
pub use types::{Float, MatrixElement};
