//! Run configuration for the `pivot-knn` benchmark driver.
//!
//! [`RunConfig`] is parsed from the command line with clap. `-h` sets the
//! pivot count, so help is only available as `--help`.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;

use crate::constants::defaults;
use crate::distance::SketchKernel;
use crate::error::{PivotKnnError, Result};

/// Element type of dataset and query files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 32-bit floats.
    #[default]
    F32,
    /// 64-bit floats.
    F64,
}

impl Precision {
    /// Lower-case name.
    pub fn name(self) -> &'static str {
        match self {
            Precision::F32 => "f32",
            Precision::F64 => "f64",
        }
    }
}

/// Sketch kernel requested on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelChoice {
    /// Fastest kernel the CPU supports.
    #[default]
    Auto,
    /// Portable byte loop.
    Scalar,
    /// SSE2 (x86_64).
    Sse2,
    /// AVX2 (x86_64).
    Avx2,
    /// NEON (aarch64).
    Neon,
}

impl KernelChoice {
    /// Map to a concrete kernel; availability is checked when the index is built.
    pub fn resolve(self) -> SketchKernel {
        match self {
            KernelChoice::Auto => SketchKernel::detect(),
            KernelChoice::Scalar => SketchKernel::Scalar,
            KernelChoice::Sse2 => SketchKernel::Sse2,
            KernelChoice::Avx2 => SketchKernel::Avx2,
            KernelChoice::Neon => SketchKernel::Neon,
        }
    }
}

/// Options of one build-and-query run.
#[derive(Clone, Debug, Parser, Serialize)]
#[command(
    name = "pivot-knn",
    version,
    about = "Approximate k-NN search with a pivot table over signed binary sketches",
    disable_help_flag = true
)]
pub struct RunConfig {
    /// Dataset matrix (.ds2)
    #[arg(short = 'd', long = "dataset")]
    pub dataset: PathBuf,

    /// Query matrix (.ds2)
    #[arg(short = 'q', long = "queries")]
    pub queries: PathBuf,

    /// Number of pivots
    #[arg(short = 'h', long = "pivots", default_value_t = defaults::PIVOTS)]
    pub pivots: usize,

    /// Number of neighbors per query
    #[arg(short = 'k', long = "neighbors", default_value_t = defaults::NEIGHBORS)]
    pub neighbors: usize,

    /// Dominant components kept per sketch
    #[arg(short = 'x', long = "quantization", default_value_t = defaults::QUANTIZATION)]
    pub quantization: usize,

    /// Element type of dataset and query files
    #[arg(long, value_enum, default_value_t = Precision::F32)]
    pub precision: Precision,

    /// Sketch distance kernel
    #[arg(long, value_enum, default_value_t = KernelChoice::Auto)]
    pub kernel: KernelChoice,

    /// Worker threads (defaults to one per core)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Reference neighbor ids (.ds2, i32), compared against the results
    #[arg(long, requires = "ref_dist")]
    pub ref_ids: Option<PathBuf>,

    /// Reference neighbor distances (.ds2, same precision as the dataset)
    #[arg(long, requires = "ref_ids")]
    pub ref_dist: Option<PathBuf>,

    /// Write result ids here (.ds2, i32)
    #[arg(long)]
    pub output_ids: Option<PathBuf>,

    /// Write result distances here (.ds2)
    #[arg(long)]
    pub output_dist: Option<PathBuf>,

    /// Print the benchmark report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Print the per-query comparison table
    #[arg(short = 'v', long, default_value_t = false)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    pub log_json: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    #[serde(skip)]
    help: Option<bool>,
}

impl RunConfig {
    /// A configuration with default parameters for the given inputs.
    pub fn new(dataset: impl Into<PathBuf>, queries: impl Into<PathBuf>) -> Self {
        Self {
            dataset: dataset.into(),
            queries: queries.into(),
            pivots: defaults::PIVOTS,
            neighbors: defaults::NEIGHBORS,
            quantization: defaults::QUANTIZATION,
            precision: Precision::default(),
            kernel: KernelChoice::default(),
            threads: None,
            ref_ids: None,
            ref_dist: None,
            output_ids: None,
            output_dist: None,
            json: false,
            verbose: false,
            log_json: false,
            help: None,
        }
    }

    /// Check that `h`, `k`, `x` and the thread count are positive and that
    /// reference files come in pairs.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("pivots (-h)", self.pivots),
            ("neighbors (-k)", self.neighbors),
            ("quantization (-x)", self.quantization),
        ] {
            if value == 0 {
                return Err(PivotKnnError::invalid_parameter(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        if self.threads == Some(0) {
            return Err(PivotKnnError::invalid_parameter(
                "threads must be greater than 0",
            ));
        }
        if self.ref_ids.is_some() != self.ref_dist.is_some() {
            return Err(PivotKnnError::invalid_parameter(
                "--ref-ids and --ref-dist must be given together",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_flags() {
        let config = RunConfig::try_parse_from([
            "pivot-knn", "-d", "data.ds2", "-q", "queries.ds2", "-h", "4", "-k", "3", "-x", "12",
        ])
        .unwrap();
        assert_eq!(config.dataset, PathBuf::from("data.ds2"));
        assert_eq!(config.queries, PathBuf::from("queries.ds2"));
        assert_eq!(config.pivots, 4);
        assert_eq!(config.neighbors, 3);
        assert_eq!(config.quantization, 12);
        assert_eq!(config.precision, Precision::F32);
        assert_eq!(config.kernel, KernelChoice::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::try_parse_from(["pivot-knn", "-d", "a", "-q", "b"]).unwrap();
        assert_eq!(config.pivots, defaults::PIVOTS);
        assert_eq!(config.neighbors, defaults::NEIGHBORS);
        assert_eq!(config.quantization, defaults::QUANTIZATION);
    }

    #[test]
    fn test_long_flags_and_enums() {
        let config = RunConfig::try_parse_from([
            "pivot-knn",
            "--dataset",
            "a",
            "--queries",
            "b",
            "--precision",
            "f64",
            "--kernel",
            "scalar",
            "--threads",
            "2",
            "--ref-ids",
            "ids.ds2",
            "--ref-dist",
            "dist.ds2",
            "--json",
        ])
        .unwrap();
        assert_eq!(config.precision, Precision::F64);
        assert_eq!(config.kernel.resolve(), SketchKernel::Scalar);
        assert_eq!(config.threads, Some(2));
        assert!(config.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reference_files_are_paired() {
        assert!(RunConfig::try_parse_from(["pivot-knn", "-d", "a", "-q", "b", "--ref-ids", "r"]).is_err());

        let mut config = RunConfig::new("a", "b");
        config.ref_dist = Some(PathBuf::from("r"));
        assert!(matches!(
            config.validate(),
            Err(PivotKnnError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let mut config = RunConfig::new("a", "b");
        config.neighbors = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::new("a", "b");
        config.threads = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_precision_name_matches_element_type() {
        use crate::types::Float;
        assert_eq!(Precision::F32.name(), <f32 as Float>::NAME);
        assert_eq!(Precision::F64.name(), <f64 as Float>::NAME);
    }

    #[test]
    fn test_serializes_without_help() {
        let json = serde_json::to_value(RunConfig::new("a", "b")).unwrap();
        assert_eq!(json["pivots"], 16);
        assert_eq!(json["precision"], "f32");
        assert_eq!(json["kernel"], "auto");
        assert!(json.get("help").is_none());
    }

    #[test]
    fn test_command_is_well_formed() {
        use clap::CommandFactory;
        RunConfig::command().debug_assert();
    }
}
