//! SIMD-optimized distance function implementations.
//!
//! Supports multiple SIMD instruction sets with automatic runtime detection:
//! - **AVX2** (x86_64): 32 sketch bytes or 8 `f32` / 4 `f64` per iteration
//! - **SSE2** (x86_64): 16 sketch bytes per iteration, part of the x86_64 baseline
//! - **NEON** (aarch64): 16 sketch bytes or 4 `f32` / 2 `f64` per iteration
//! - **Scalar**: Fallback for all platforms
//!
//! Sketch kernels AND the byte masks and widen the per-byte counts with a
//! sum-of-absolute-differences against zero, so every path returns exactly
//! the integer the scalar loop returns. Tails shorter than one block are
//! handed to the scalar implementation.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

use super::scalar;

#[cfg(target_arch = "x86_64")]
use crate::constants::simd::{AVX2_BLOCK, SSE2_BLOCK};

#[cfg(target_arch = "aarch64")]
use crate::constants::simd::NEON_BLOCK;

// =============================================================================
// Sketch distance kernels (x86_64)
// =============================================================================

/// Compute the sketch distance using AVX2 intrinsics.
///
/// # Safety
/// - Requires the AVX2 CPU feature to be available.
/// - The caller must ensure the CPU supports this feature before calling.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
pub unsafe fn sketch_distance_avx2(vp: &[u8], vn: &[u8], wp: &[u8], wn: &[u8]) -> i32 {
    let len = vp.len();
    assert!(
        vn.len() == len && wp.len() == len && wn.len() == len,
        "Sketch dimensions must match"
    );

    let zero = _mm256_setzero_si256();
    let mut acc_pp = zero;
    let mut acc_nn = zero;
    let mut acc_pn = zero;
    let mut acc_np = zero;
    let mut i = 0;

    while i + AVX2_BLOCK <= len {
        let a_p = _mm256_loadu_si256(vp.as_ptr().add(i) as *const __m256i);
        let a_n = _mm256_loadu_si256(vn.as_ptr().add(i) as *const __m256i);
        let b_p = _mm256_loadu_si256(wp.as_ptr().add(i) as *const __m256i);
        let b_n = _mm256_loadu_si256(wn.as_ptr().add(i) as *const __m256i);

        // vpsadbw sums each group of 8 bytes into a 64-bit lane.
        acc_pp = _mm256_add_epi64(acc_pp, _mm256_sad_epu8(_mm256_and_si256(a_p, b_p), zero));
        acc_nn = _mm256_add_epi64(acc_nn, _mm256_sad_epu8(_mm256_and_si256(a_n, b_n), zero));
        acc_pn = _mm256_add_epi64(acc_pn, _mm256_sad_epu8(_mm256_and_si256(a_p, b_n), zero));
        acc_np = _mm256_add_epi64(acc_np, _mm256_sad_epu8(_mm256_and_si256(a_n, b_p), zero));

        i += AVX2_BLOCK;
    }

    let positive = _mm256_add_epi64(acc_pp, acc_nn);
    let negative = _mm256_add_epi64(acc_pn, acc_np);
    let pos_lanes: [i64; 4] = std::mem::transmute(positive);
    let neg_lanes: [i64; 4] = std::mem::transmute(negative);
    let body = pos_lanes.iter().sum::<i64>() - neg_lanes.iter().sum::<i64>();

    body as i32 + scalar::sketch_distance(&vp[i..], &vn[i..], &wp[i..], &wn[i..])
}

/// Compute the sketch distance using SSE2 intrinsics.
///
/// # Safety
/// - Requires the SSE2 CPU feature, which every x86_64 CPU provides.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
#[inline]
pub unsafe fn sketch_distance_sse2(vp: &[u8], vn: &[u8], wp: &[u8], wn: &[u8]) -> i32 {
    let len = vp.len();
    assert!(
        vn.len() == len && wp.len() == len && wn.len() == len,
        "Sketch dimensions must match"
    );

    let zero = _mm_setzero_si128();
    let mut acc_pos = zero;
    let mut acc_neg = zero;
    let mut i = 0;

    while i + SSE2_BLOCK <= len {
        let a_p = _mm_loadu_si128(vp.as_ptr().add(i) as *const __m128i);
        let a_n = _mm_loadu_si128(vn.as_ptr().add(i) as *const __m128i);
        let b_p = _mm_loadu_si128(wp.as_ptr().add(i) as *const __m128i);
        let b_n = _mm_loadu_si128(wn.as_ptr().add(i) as *const __m128i);

        acc_pos = _mm_add_epi64(acc_pos, _mm_sad_epu8(_mm_and_si128(a_p, b_p), zero));
        acc_pos = _mm_add_epi64(acc_pos, _mm_sad_epu8(_mm_and_si128(a_n, b_n), zero));
        acc_neg = _mm_add_epi64(acc_neg, _mm_sad_epu8(_mm_and_si128(a_p, b_n), zero));
        acc_neg = _mm_add_epi64(acc_neg, _mm_sad_epu8(_mm_and_si128(a_n, b_p), zero));

        i += SSE2_BLOCK;
    }

    let pos_lanes: [i64; 2] = std::mem::transmute(acc_pos);
    let neg_lanes: [i64; 2] = std::mem::transmute(acc_neg);
    let body = (pos_lanes[0] + pos_lanes[1]) - (neg_lanes[0] + neg_lanes[1]);

    body as i32 + scalar::sketch_distance(&vp[i..], &vn[i..], &wp[i..], &wn[i..])
}

// =============================================================================
// Sketch distance kernel (aarch64)
// =============================================================================

/// Compute the sketch distance using ARM NEON intrinsics.
///
/// NEON is always available on aarch64, so no runtime detection needed.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn sketch_distance_neon(vp: &[u8], vn: &[u8], wp: &[u8], wn: &[u8]) -> i32 {
    let len = vp.len();
    assert!(
        vn.len() == len && wp.len() == len && wn.len() == len,
        "Sketch dimensions must match"
    );

    let mut positive = 0u32;
    let mut negative = 0u32;
    let mut i = 0;

    while i + NEON_BLOCK <= len {
        unsafe {
            let a_p = vld1q_u8(vp.as_ptr().add(i));
            let a_n = vld1q_u8(vn.as_ptr().add(i));
            let b_p = vld1q_u8(wp.as_ptr().add(i));
            let b_n = vld1q_u8(wn.as_ptr().add(i));

            // Widening horizontal add: 16 bytes -> u16, no overflow for 0/1 masks.
            positive += vaddlvq_u8(vandq_u8(a_p, b_p)) as u32;
            positive += vaddlvq_u8(vandq_u8(a_n, b_n)) as u32;
            negative += vaddlvq_u8(vandq_u8(a_p, b_n)) as u32;
            negative += vaddlvq_u8(vandq_u8(a_n, b_p)) as u32;
        }
        i += NEON_BLOCK;
    }

    (positive as i32 - negative as i32)
        + scalar::sketch_distance(&vp[i..], &vn[i..], &wp[i..], &wn[i..])
}

// =============================================================================
// Euclidean distance (x86_64)
// =============================================================================

/// Compute Euclidean distance using AVX2 and FMA intrinsics.
///
/// Processes 8 floats per iteration.
///
/// # Safety
/// - Requires AVX2 and FMA CPU features to be available.
/// - The caller must ensure the CPU supports these features before calling.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
pub unsafe fn euclidean_distance_avx2(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len();
    let mut sum = _mm256_setzero_ps();
    let mut i = 0;

    while i + 8 <= len {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        let diff = _mm256_sub_ps(va, vb);
        sum = _mm256_fmadd_ps(diff, diff, sum);
        i += 8;
    }

    let sum_array: [f32; 8] = std::mem::transmute(sum);
    let mut total: f32 = sum_array.iter().sum();

    while i < len {
        let diff = a[i] - b[i];
        total += diff * diff;
        i += 1;
    }

    total.sqrt()
}

/// Compute `f64` Euclidean distance using AVX2 and FMA intrinsics.
///
/// Processes 4 doubles per iteration.
///
/// # Safety
/// - Requires AVX2 and FMA CPU features to be available.
/// - The caller must ensure the CPU supports these features before calling.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
pub unsafe fn euclidean_distance_f64_avx2(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len();
    let mut sum = _mm256_setzero_pd();
    let mut i = 0;

    while i + 4 <= len {
        let va = _mm256_loadu_pd(a.as_ptr().add(i));
        let vb = _mm256_loadu_pd(b.as_ptr().add(i));
        let diff = _mm256_sub_pd(va, vb);
        sum = _mm256_fmadd_pd(diff, diff, sum);
        i += 4;
    }

    let sum_array: [f64; 4] = std::mem::transmute(sum);
    let mut total: f64 = sum_array.iter().sum();

    while i < len {
        let diff = a[i] - b[i];
        total += diff * diff;
        i += 1;
    }

    total.sqrt()
}

// =============================================================================
// Euclidean distance (aarch64)
// =============================================================================

/// Compute Euclidean distance using ARM NEON intrinsics.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn euclidean_distance_neon(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len();
    let mut i = 0;
    let mut sum = unsafe { vdupq_n_f32(0.0) };

    while i + 4 <= len {
        unsafe {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            let diff = vsubq_f32(va, vb);
            sum = vfmaq_f32(sum, diff, diff);
        }
        i += 4;
    }

    let mut total = unsafe { vaddvq_f32(sum) };

    while i < len {
        let diff = a[i] - b[i];
        total += diff * diff;
        i += 1;
    }

    total.sqrt()
}

/// Compute `f64` Euclidean distance using ARM NEON intrinsics.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn euclidean_distance_f64_neon(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len();
    let mut i = 0;
    let mut sum = unsafe { vdupq_n_f64(0.0) };

    while i + 2 <= len {
        unsafe {
            let va = vld1q_f64(a.as_ptr().add(i));
            let vb = vld1q_f64(b.as_ptr().add(i));
            let diff = vsubq_f64(va, vb);
            sum = vfmaq_f64(sum, diff, diff);
        }
        i += 2;
    }

    let mut total = unsafe { vaddvq_f64(sum) };

    while i < len {
        let diff = a[i] - b[i];
        total += diff * diff;
        i += 1;
    }

    total.sqrt()
}

// =============================================================================
// Auto-dispatching Public API
// =============================================================================

/// Compute the sketch distance with automatic CPU feature detection.
///
/// Dispatch order (fastest first):
/// 1. AVX2 (x86_64) - 32 bytes/iteration
/// 2. SSE2 (x86_64) - 16 bytes/iteration
/// 3. NEON (aarch64) - 16 bytes/iteration
/// 4. Scalar fallback
#[inline]
pub fn sketch_distance(vp: &[u8], vn: &[u8], wp: &[u8], wn: &[u8]) -> i32 {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: We just verified that AVX2 is supported
            return unsafe { sketch_distance_avx2(vp, vn, wp, wn) };
        }
        // SAFETY: SSE2 is part of the x86_64 baseline
        return unsafe { sketch_distance_sse2(vp, vn, wp, wn) };
    }

    #[cfg(target_arch = "aarch64")]
    {
        return sketch_distance_neon(vp, vn, wp, wn);
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    scalar::sketch_distance(vp, vn, wp, wn)
}

/// Compute Euclidean distance with automatic CPU feature detection.
///
/// Dispatch order (fastest first):
/// 1. AVX2+FMA (x86_64) - 8 floats/iteration
/// 2. NEON (aarch64) - 4 floats/iteration
/// 3. Scalar fallback
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            // SAFETY: We just verified that AVX2 and FMA are supported
            return unsafe { euclidean_distance_avx2(a, b) };
        }
        return scalar::euclidean_distance(a, b);
    }

    #[cfg(target_arch = "aarch64")]
    {
        return euclidean_distance_neon(a, b);
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    scalar::euclidean_distance(a, b)
}

/// Compute `f64` Euclidean distance with automatic CPU feature detection.
#[inline]
pub fn euclidean_distance_f64(a: &[f64], b: &[f64]) -> f64 {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            // SAFETY: We just verified that AVX2 and FMA are supported
            return unsafe { euclidean_distance_f64_avx2(a, b) };
        }
        return scalar::euclidean_distance_f64(a, b);
    }

    #[cfg(target_arch = "aarch64")]
    {
        return euclidean_distance_f64_neon(a, b);
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    scalar::euclidean_distance_f64(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_mask(rng: &mut StdRng, len: usize) -> Vec<u8> {
        (0..len).map(|_| rng.gen_range(0..=1u8)).collect()
    }

    #[test]
    fn test_sketch_dispatch_matches_scalar() {
        let mut rng = StdRng::seed_from_u64(11);
        for len in 0..=130 {
            let (vp, vn, wp, wn) = (
                random_mask(&mut rng, len),
                random_mask(&mut rng, len),
                random_mask(&mut rng, len),
                random_mask(&mut rng, len),
            );
            assert_eq!(
                sketch_distance(&vp, &vn, &wp, &wn),
                scalar::sketch_distance(&vp, &vn, &wp, &wn),
                "length {}",
                len
            );
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_sse2_directly() {
        let mut rng = StdRng::seed_from_u64(12);
        for len in [15, 16, 17, 31, 48, 100] {
            let (vp, vn, wp, wn) = (
                random_mask(&mut rng, len),
                random_mask(&mut rng, len),
                random_mask(&mut rng, len),
                random_mask(&mut rng, len),
            );
            let expected = scalar::sketch_distance(&vp, &vn, &wp, &wn);
            let sse2 = unsafe { sketch_distance_sse2(&vp, &vn, &wp, &wn) };
            assert_eq!(expected, sse2, "length {}", len);
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_avx2_directly() {
        if !is_x86_feature_detected!("avx2") {
            println!("AVX2 not available, skipping direct test");
            return;
        }

        // All-ones masks stress the widening: every AND byte contributes.
        let ones = vec![1u8; 257];
        let zeros = vec![0u8; 257];
        let result = unsafe { sketch_distance_avx2(&ones, &zeros, &ones, &zeros) };
        assert_eq!(result, 257);
        let result = unsafe { sketch_distance_avx2(&ones, &zeros, &zeros, &ones) };
        assert_eq!(result, -257);
    }

    #[test]
    fn test_euclidean_simple() {
        let a = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let b = vec![3.0, 4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let result = euclidean_distance(&a, &b);
        assert!((result - 5.0).abs() < 1e-5, "Expected 5.0, got {}", result);
    }

    #[test]
    fn test_non_multiple_of_8() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];

        let scalar_result = scalar::euclidean_distance(&a, &b);
        let simd_result = euclidean_distance(&a, &b);

        assert!(
            (scalar_result - simd_result).abs() < 1e-5,
            "Scalar: {}, SIMD: {}",
            scalar_result,
            simd_result
        );
    }

    #[test]
    fn test_f64_matches_scalar() {
        for dim in [1, 3, 4, 7, 64, 256] {
            let a: Vec<f64> = (0..dim).map(|x| (x as f64) * 0.01).collect();
            let b: Vec<f64> = (0..dim).map(|x| (x as f64) * 0.02 - 1.0).collect();

            let scalar_dist = scalar::euclidean_distance_f64(&a, &b);
            let simd_dist = euclidean_distance_f64(&a, &b);
            assert!(
                (scalar_dist - simd_dist).abs() < 1e-9,
                "Dimension {}: Scalar: {}, SIMD: {}",
                dim,
                scalar_dist,
                simd_dist
            );
        }
    }

    #[test]
    fn test_identical_vectors() {
        let a: Vec<f32> = (0..64).map(|x| x as f32).collect();
        let result = euclidean_distance(&a, &a);
        assert!(
            result.abs() < 1e-6,
            "Distance to self should be 0, got {}",
            result
        );
    }
}
