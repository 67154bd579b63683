//! Element types stored in matrices and indexed by the pivot table.
//!
//! [`MatrixElement`] covers anything that can live in a `.ds2` matrix
//! (vectors and reference neighbor ids). [`Float`] narrows that to the two
//! vector element types the index works with, `f32` and `f64`.

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::ops::Sub;

use crate::constants::tolerance;
use crate::distance::simd;

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for i32 {}
}

/// A fixed-width numeric element with a little-endian byte encoding.
pub trait MatrixElement: sealed::Sealed + Copy + Default + Debug + Send + Sync + 'static {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Decode from exactly `SIZE` little-endian bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding to `out`.
    fn extend_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_matrix_element {
    ($t:ty, $n:expr) => {
        impl MatrixElement for $t {
            const SIZE: usize = $n;

            #[inline]
            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut buf = [0u8; $n];
                buf.copy_from_slice(bytes);
                <$t>::from_le_bytes(buf)
            }

            #[inline]
            fn extend_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_matrix_element!(f32, 4);
impl_matrix_element!(f64, 8);
impl_matrix_element!(i32, 4);

/// Floating-point vector element: the quantizer and the real distance are generic over this.
pub trait Float: MatrixElement + PartialOrd + Display + Sub<Output = Self> {
    /// Sentinel for a real distance that was never computed.
    const INFINITY: Self;

    /// Absolute tolerance for comparing real distances against reference output.
    const COMPARE_TOLERANCE: Self;

    /// Name used in reports (`"f32"` / `"f64"`).
    const NAME: &'static str;

    /// Absolute value.
    fn abs(self) -> Self;

    /// True for `+0.0`, `-0.0` and positive values: zero counts as non-negative.
    fn is_non_negative(self) -> bool;

    /// Total order used to rank absolute values.
    fn total_cmp(&self, other: &Self) -> Ordering;

    /// Exact Euclidean distance, dispatched to the fastest available implementation.
    fn euclidean_distance(a: &[Self], b: &[Self]) -> Self;

    /// Narrowing conversion used for random data generation.
    fn from_f64(value: f64) -> Self;
}

impl Float for f32 {
    const INFINITY: Self = f32::INFINITY;
    const COMPARE_TOLERANCE: Self = tolerance::F32;
    const NAME: &'static str = "f32";

    #[inline]
    fn abs(self) -> Self {
        f32::abs(self)
    }

    #[inline]
    fn is_non_negative(self) -> bool {
        self >= 0.0
    }

    #[inline]
    fn total_cmp(&self, other: &Self) -> Ordering {
        f32::total_cmp(self, other)
    }

    #[inline]
    fn euclidean_distance(a: &[Self], b: &[Self]) -> Self {
        simd::euclidean_distance(a, b)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Float for f64 {
    const INFINITY: Self = f64::INFINITY;
    const COMPARE_TOLERANCE: Self = tolerance::F64;
    const NAME: &'static str = "f64";

    #[inline]
    fn abs(self) -> Self {
        f64::abs(self)
    }

    #[inline]
    fn is_non_negative(self) -> bool {
        self >= 0.0
    }

    #[inline]
    fn total_cmp(&self, other: &Self) -> Ordering {
        f64::total_cmp(self, other)
    }

    #[inline]
    fn euclidean_distance(a: &[Self], b: &[Self]) -> Self {
        simd::euclidean_distance_f64(a, b)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}
