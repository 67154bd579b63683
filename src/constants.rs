//! Named constants for configuration values.
//!
//! This module centralizes default parameters, SIMD block widths and
//! comparison tolerances used throughout the codebase.

/// Default run parameters, matching the reference benchmark configuration.
pub mod defaults {
    /// Default number of pivots (`h`).
    pub const PIVOTS: usize = 16;

    /// Default number of neighbors per query (`k`).
    pub const NEIGHBORS: usize = 8;

    /// Default quantization budget (`x`): dominant components kept per sketch.
    pub const QUANTIZATION: usize = 64;
}

/// Block widths of the sketch distance kernels, in bytes per iteration.
pub mod simd {
    /// AVX2 processes 32 sketch bytes per iteration.
    pub const AVX2_BLOCK: usize = 32;

    /// SSE2 processes 16 sketch bytes per iteration.
    pub const SSE2_BLOCK: usize = 16;

    /// NEON processes 16 sketch bytes per iteration.
    pub const NEON_BLOCK: usize = 16;
}

/// Absolute tolerances used when comparing real distances against reference output.
pub mod tolerance {
    /// Tolerance for 32-bit distances.
    pub const F32: f32 = 1e-3;

    /// Tolerance for 64-bit distances.
    pub const F64: f64 = 1e-9;
}

/// Constants for the `.ds2` matrix file format.
pub mod format {
    /// Header size: `u32` row count followed by `u32` column count, little-endian.
    pub const HEADER_BYTES: usize = 8;

    /// Id written for an empty neighbor slot.
    pub const EMPTY_ID: i32 = -1;
}
