//! Basic usage example demonstrating sketches and the pivot index.
//!
//! Run with: cargo run --release --example basic_usage

use std::time::Instant;

use pivot_knn::{quantize, sketch_distance, Matrix, PivotIndexBuilder, SketchKernel};

fn main() -> pivot_knn::Result<()> {
    println!("=== Signed Binary Sketches ===\n");

    let v = [2.3f32, -6.7, 1.5, 4.5];
    let w = [-3.2f32, 0.5, 7.1, -2.0];
    let sv = quantize(&v, 2);
    let sw = quantize(&w, 2);
    println!("v = {:?}\n  positive {:?}\n  negative {:?}", v, sv.positive(), sv.negative());
    println!("w = {:?}\n  positive {:?}\n  negative {:?}", w, sw.positive(), sw.negative());
    println!(
        "sketch distance(v, w) = {}, sketch distance(v, v) = {}",
        sketch_distance(sv.as_sketch_ref(), sw.as_sketch_ref()),
        sketch_distance(sv.as_sketch_ref(), sv.as_sketch_ref())
    );

    println!("\n=== Kernels ===\n");
    println!("available: {:?}", SketchKernel::available());
    println!("detected:  {}", SketchKernel::detect());

    println!("\n=== Pivot Index ===\n");

    let n = 20_000;
    let dim = 128;
    let dataset = Matrix::<f32>::random(n, dim, 1);
    let queries = Matrix::<f32>::random(200, dim, 2);

    let start = Instant::now();
    let index = PivotIndexBuilder::new()
        .pivots(16)
        .quantization(32)
        .build(dataset)?;
    println!("built in {:.2?}", start.elapsed());
    println!("{}\n", index.statistics().summary());

    let (results, stats) = index.batch_search_with_stats(&queries, 8)?;
    println!("{}\n", stats.summary());

    println!("Query 0, sorted by real distance:");
    for neighbor in results.sorted_row(0) {
        println!(
            "  id {:>6}  sketch {:>4}  real {:.4}",
            neighbor.raw_id(),
            neighbor.dist_approx,
            neighbor.dist_real
        );
    }

    Ok(())
}
