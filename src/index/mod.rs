//! Pivot index: construction and bounded k-NN queries.

pub mod builder;
pub mod pivot;
pub mod query;

pub use builder::{IndexConfig, PivotIndexBuilder};
pub use pivot::{select_pivots, PivotIndex};
pub use query::{KnnResults, Neighbor};
