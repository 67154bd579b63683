//! Signed binary sketches.
//!
//! A sketch keeps the `x` components of a vector with the largest absolute
//! value and records only their sign: `positive[i] = 1` when component `i`
//! was kept and is `>= 0`, `negative[i] = 1` when it was kept and is `< 0`.
//! Every other position is zero in both masks.
//!
//! Ranking uses a strict total order: larger `|v[i]|` first, and among equal
//! magnitudes the lower index first. The selected set is therefore a pure
//! function of the vector and `x`. `NaN` components rank above every other
//! value and, failing the `>= 0` test, are recorded as negative.

use std::cmp::Ordering;

use crate::types::Float;

/// An owned sketch: two byte masks of length `D` holding 0 or 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sketch {
    positive: Vec<u8>,
    negative: Vec<u8>,
}

/// A borrowed sketch, as stored contiguously inside an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SketchRef<'a> {
    /// Mask of kept, non-negative components.
    pub positive: &'a [u8],
    /// Mask of kept, negative components.
    pub negative: &'a [u8],
}

impl Sketch {
    /// An all-zero sketch of dimension `dim`.
    pub fn zeroed(dim: usize) -> Self {
        Self {
            positive: vec![0; dim],
            negative: vec![0; dim],
        }
    }

    /// Quantize `v` keeping its `x` dominant components.
    pub fn from_vector<T: Float>(v: &[T], x: usize) -> Self {
        Quantizer::new(x).quantize(v)
    }

    /// Dimension of the sketch.
    pub fn dim(&self) -> usize {
        self.positive.len()
    }

    /// Borrow as a [`SketchRef`].
    #[inline]
    pub fn as_sketch_ref(&self) -> SketchRef<'_> {
        SketchRef {
            positive: &self.positive,
            negative: &self.negative,
        }
    }

    /// Mask of kept, non-negative components.
    pub fn positive(&self) -> &[u8] {
        &self.positive
    }

    /// Mask of kept, negative components.
    pub fn negative(&self) -> &[u8] {
        &self.negative
    }
}

impl<'a> SketchRef<'a> {
    /// Dimension of the sketch.
    #[inline]
    pub fn dim(&self) -> usize {
        self.positive.len()
    }

    /// Number of kept components across both masks.
    pub fn count_selected(&self) -> usize {
        self.positive
            .iter()
            .chain(self.negative.iter())
            .filter(|&&b| b != 0)
            .count()
    }
}

/// Quantizer for a fixed budget `x`, reusing its ranking buffer across calls.
///
/// One quantizer per thread: the scratch buffer is not shared.
#[derive(Clone, Debug)]
pub struct Quantizer {
    budget: usize,
    order: Vec<usize>,
}

impl Quantizer {
    /// Create a quantizer keeping `budget` components per vector.
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            order: Vec::new(),
        }
    }

    /// Quantize `v` into a fresh sketch.
    pub fn quantize<T: Float>(&mut self, v: &[T]) -> Sketch {
        let mut sketch = Sketch::zeroed(v.len());
        self.quantize_into(v, &mut sketch.positive, &mut sketch.negative);
        sketch
    }

    /// Quantize `v` into caller-provided masks, overwriting them entirely.
    ///
    /// # Panics
    /// Panics if either mask length differs from `v.len()`.
    pub fn quantize_into<T: Float>(&mut self, v: &[T], positive: &mut [u8], negative: &mut [u8]) {
        let dim = v.len();
        assert_eq!(positive.len(), dim, "Sketch dimensions must match");
        assert_eq!(negative.len(), dim, "Sketch dimensions must match");

        positive.fill(0);
        negative.fill(0);

        let keep = self.budget.min(dim);
        if keep == 0 {
            return;
        }

        self.order.clear();
        self.order.extend(0..dim);

        let rank = |&a: &usize, &b: &usize| -> Ordering {
            v[b].abs().total_cmp(&v[a].abs()).then(a.cmp(&b))
        };
        if keep < dim {
            // The order is total, so the partition holds exactly the top `keep` indices.
            self.order.select_nth_unstable_by(keep - 1, rank);
        }

        for &i in &self.order[..keep] {
            if v[i].is_non_negative() {
                positive[i] = 1;
            } else {
                negative[i] = 1;
            }
        }
    }
}

/// Quantize `v` keeping its `x` dominant components.
pub fn quantize<T: Float>(v: &[T], x: usize) -> Sketch {
    Sketch::from_vector(v, x)
}
