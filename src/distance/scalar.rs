//! Scalar (non-SIMD) distance function implementations.
//! These serve as baselines for comparison and fallbacks on every platform.

/// Compute the signed sketch distance between `(vp, vn)` and `(wp, wn)`.
///
/// Returns `|vp∩wp| + |vn∩wn| − |vp∩wn| − |vn∩wp|` where each operand is a
/// byte mask holding 0 or 1 per dimension. Counts are sums of the bytewise
/// AND, which is what the SIMD kernels compute as well.
#[inline]
pub fn sketch_distance(vp: &[u8], vn: &[u8], wp: &[u8], wn: &[u8]) -> i32 {
    let d = vp.len();
    assert!(
        vn.len() == d && wp.len() == d && wn.len() == d,
        "Sketch dimensions must match"
    );
    let (vn, wp, wn) = (&vn[..d], &wp[..d], &wn[..d]);

    let mut pp = 0i32;
    let mut nn = 0i32;
    let mut pn = 0i32;
    let mut np = 0i32;

    for i in 0..d {
        pp += (vp[i] & wp[i]) as i32;
        nn += (vn[i] & wn[i]) as i32;
        pn += (vp[i] & wn[i]) as i32;
        np += (vn[i] & wp[i]) as i32;
    }

    pp + nn - pn - np
}

/// Compute the Euclidean (L2) distance between two vectors.
///
/// Returns sqrt(sum((a[i] - b[i])^2))
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let sum: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum();

    sum.sqrt()
}

/// Compute the Euclidean (L2) distance between two `f64` vectors.
#[inline]
pub fn euclidean_distance_f64(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum();

    sum.sqrt()
}
