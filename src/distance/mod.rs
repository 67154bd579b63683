//! Distance computation module providing both scalar and SIMD implementations.
//!
//! Two distances live here:
//! - the **sketch distance** `d̃ = |p∩p| + |n∩n| − |p∩n| − |n∩p|` between two
//!   signed binary sketches, the inner loop of index construction and query;
//! - the exact **Euclidean distance**, used only to score finalists.
//!
//! The auto-dispatching functions select the fastest implementation at
//! runtime. [`SketchKernel`] exposes the sketch implementations as an
//! explicit strategy so a run can be pinned to one of them.

pub mod scalar;
pub mod simd;

use std::fmt;

pub use simd::{euclidean_distance, euclidean_distance_f64};

use crate::error::{PivotKnnError, Result};
use crate::quantize::SketchRef;

/// Signature of a resolved sketch distance implementation.
pub type SketchDistanceFn = fn(SketchRef<'_>, SketchRef<'_>) -> i32;

/// Compute the sketch distance between two sketches using the fastest available kernel.
///
/// # Panics
/// Panics if the sketches have different dimensions.
#[inline]
pub fn sketch_distance(a: SketchRef<'_>, b: SketchRef<'_>) -> i32 {
    simd::sketch_distance(a.positive, a.negative, b.positive, b.negative)
}

/// Implementation strategy for the sketch distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SketchKernel {
    /// Portable byte loop.
    Scalar,
    /// 128-bit SSE2 (x86_64).
    Sse2,
    /// 256-bit AVX2 (x86_64).
    Avx2,
    /// 128-bit NEON (aarch64).
    Neon,
}

impl SketchKernel {
    /// Every kernel, fastest first.
    pub const ALL: [SketchKernel; 4] = [
        SketchKernel::Avx2,
        SketchKernel::Sse2,
        SketchKernel::Neon,
        SketchKernel::Scalar,
    ];

    /// The fastest kernel supported by the running CPU.
    pub fn detect() -> Self {
        Self::ALL
            .into_iter()
            .find(|kernel| kernel.is_available())
            .unwrap_or(SketchKernel::Scalar)
    }

    /// Kernels usable on the running CPU, fastest first.
    pub fn available() -> Vec<Self> {
        Self::ALL.into_iter().filter(|k| k.is_available()).collect()
    }

    /// True if this kernel can run on the current CPU.
    pub fn is_available(self) -> bool {
        match self {
            SketchKernel::Scalar => true,
            #[cfg(target_arch = "x86_64")]
            SketchKernel::Sse2 => true,
            #[cfg(target_arch = "x86_64")]
            SketchKernel::Avx2 => is_x86_feature_detected!("avx2"),
            #[cfg(target_arch = "aarch64")]
            SketchKernel::Neon => true,
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Lower-case name, as accepted on the command line.
    pub fn name(self) -> &'static str {
        match self {
            SketchKernel::Scalar => "scalar",
            SketchKernel::Sse2 => "sse2",
            SketchKernel::Avx2 => "avx2",
            SketchKernel::Neon => "neon",
        }
    }

    /// Resolve to a callable implementation, failing if the CPU lacks support.
    pub fn resolve(self) -> Result<SketchDistanceFn> {
        if !self.is_available() {
            return Err(PivotKnnError::UnsupportedKernel(self.name().to_string()));
        }
        let kernel: SketchDistanceFn = match self {
            #[cfg(target_arch = "x86_64")]
            SketchKernel::Avx2 => avx2_kernel,
            #[cfg(target_arch = "x86_64")]
            SketchKernel::Sse2 => sse2_kernel,
            #[cfg(target_arch = "aarch64")]
            SketchKernel::Neon => neon_kernel,
            _ => scalar_kernel,
        };
        Ok(kernel)
    }

    /// Compute the sketch distance with this kernel, falling back to scalar when unavailable.
    #[inline]
    pub fn compute(self, a: SketchRef<'_>, b: SketchRef<'_>) -> i32 {
        match self.resolve() {
            Ok(kernel) => kernel(a, b),
            Err(_) => scalar_kernel(a, b),
        }
    }
}

impl Default for SketchKernel {
    fn default() -> Self {
        Self::detect()
    }
}

impl fmt::Display for SketchKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn scalar_kernel(a: SketchRef<'_>, b: SketchRef<'_>) -> i32 {
    scalar::sketch_distance(a.positive, a.negative, b.positive, b.negative)
}

#[cfg(target_arch = "x86_64")]
fn sse2_kernel(a: SketchRef<'_>, b: SketchRef<'_>) -> i32 {
    // SAFETY: SSE2 is part of the x86_64 baseline
    unsafe { simd::sketch_distance_sse2(a.positive, a.negative, b.positive, b.negative) }
}

#[cfg(target_arch = "x86_64")]
fn avx2_kernel(a: SketchRef<'_>, b: SketchRef<'_>) -> i32 {
    // SAFETY: only reachable through `resolve`, which checked AVX2 support
    unsafe { simd::sketch_distance_avx2(a.positive, a.negative, b.positive, b.negative) }
}

#[cfg(target_arch = "aarch64")]
fn neon_kernel(a: SketchRef<'_>, b: SketchRef<'_>) -> i32 {
    simd::sketch_distance_neon(a.positive, a.negative, b.positive, b.negative)
}
