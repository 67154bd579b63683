use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pivot_knn::metrics::duration_ms;
use pivot_knn::{
    compare_results, BenchmarkReport, Float, Matrix, PivotIndexBuilder, PivotKnnError, Precision,
    Result, RunConfig,
};

fn main() -> ExitCode {
    let config = RunConfig::parse();
    init_tracing(config.log_json);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pivot_knn=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(config: &RunConfig) -> Result<()> {
    config.validate()?;

    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| PivotKnnError::invalid_parameter(e.to_string()))?;
    }

    match config.precision {
        Precision::F32 => run_with::<f32>(config),
        Precision::F64 => run_with::<f64>(config),
    }
}

fn run_with<T: Float>(config: &RunConfig) -> Result<()> {
    let dataset = Matrix::<T>::load(&config.dataset)?;
    let queries = Matrix::<T>::load(&config.queries)?;
    tracing::info!(
        rows = dataset.rows(),
        queries = queries.rows(),
        dimension = dataset.cols(),
        precision = T::NAME,
        "loaded matrices"
    );

    if queries.cols() != dataset.cols() {
        return Err(PivotKnnError::dimension_mismatch(dataset.cols(), queries.cols()));
    }
    let rows = dataset.rows();
    let dimension = dataset.cols();

    let total_start = Instant::now();
    let index = PivotIndexBuilder::new()
        .pivots(config.pivots)
        .quantization(config.quantization)
        .kernel(config.kernel.resolve())
        .build(dataset)?;
    let build_time = total_start.elapsed();
    tracing::debug!("{}", index.statistics().summary());

    let query_start = Instant::now();
    let (results, stats) = index.batch_search_with_stats(&queries, config.neighbors)?;
    let query_time = query_start.elapsed();
    let total_time = total_start.elapsed();
    tracing::debug!("{}", stats.summary());

    if let Some(path) = &config.output_ids {
        results.to_id_matrix()?.write(path)?;
        tracing::info!(path = %path.display(), "wrote result ids");
    }
    if let Some(path) = &config.output_dist {
        results.to_distance_matrix()?.write(path)?;
        tracing::info!(path = %path.display(), "wrote result distances");
    }

    if let (Some(ids_path), Some(dist_path)) = (&config.ref_ids, &config.ref_dist) {
        let ref_ids = Matrix::<i32>::load(ids_path)?;
        let ref_dist = Matrix::<T>::load(dist_path)?;
        let report = compare_results(&results, &ref_ids, &ref_dist)?;
        if config.verbose {
            println!("{}", report);
        }
        tracing::info!(
            matching = report.matching_queries(),
            queries = report.queries.len(),
            mean_recall = report.mean_recall(),
            "compared against reference"
        );
    }

    let query_ms = duration_ms(query_time);
    let report = BenchmarkReport {
        precision: config.precision.name(),
        kernel: index.kernel().name(),
        rows,
        dimension,
        queries: queries.rows(),
        pivots: config.pivots,
        neighbors: config.neighbors,
        quantization: config.quantization,
        build_ms: duration_ms(build_time),
        query_ms,
        total_ms: duration_ms(total_time),
        throughput_qps: if query_ms > 0.0 {
            queries.rows() as f64 * 1000.0 / query_ms
        } else {
            0.0
        },
        pruning_ratio: stats.pruning_ratio(),
    };

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }
    Ok(())
}
