// SPDX-License-Identifier: AGPL-3.0-only

//! Thread-count sweep for the dot-product stage on the MNIST geometry.
//!
//! Runs the 8192 × 256 → 10 workload sequentially, then with pools of 2, 4,
//! 8 and 16 threads, each with and without the prefetching loader, and
//! reports throughput against the sequential baseline.
//!
//! Usage:
//!   cargo run --release --bin bench_parallelism
//!   RUST_LOG=mmult_driver=debug cargo run --release --bin bench_parallelism

use anyhow::{ensure, Result};
use mmult_chip::presets::Mnist;
use mmult_chip::Geometry;
use mmult_driver::host::{self, Workload};
use mmult_driver::transports::{MemorySink, MemorySource};
use mmult_driver::{Engine, EngineConfig};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const ITERATIONS: usize = 5;
const SEED: u64 = 0x6d6d_756c_74;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let dims = Mnist::DIMS;
    let work = Workload::<Mnist>::synthetic(SEED);
    let stream = work.stream()?;
    let expected = work.reference()?;

    println!("Dot-product parallelism sweep");
    println!("=============================");
    println!("Geometry : {dims}");
    println!("Iter     : {ITERATIONS} per configuration");
    println!();
    println!(
        "  {:>7}  {:>9}  {:>10}  {:>12}  {:>9}  {:>10}",
        "threads", "pipelined", "ms/run", "rows/s", "GMAC/s", "vs seq"
    );
    println!("  {:-<7}  {:-<9}  {:-<10}  {:-<12}  {:-<9}  {:-<10}", "", "", "", "", "", "");

    let mut baseline_ms: Option<f64> = None;

    for &threads in &[1usize, 2, 4, 8, 16] {
        for pipelined in [false, true] {
            let config = EngineConfig::default()
                .with_threads(threads)
                .with_prefetch_depth(2);
            let mut engine = Engine::<Mnist>::new(config)?;
            let mut sink = MemorySink::with_capacity(dims.output_words());

            let t0 = Instant::now();
            for _ in 0..ITERATIONS {
                engine.reset();
                sink.clear();
                let source = MemorySource::new(stream.iter().copied());
                if pipelined {
                    engine.run_pipelined(source, &mut sink)?;
                } else {
                    engine.run(source, &mut sink)?;
                }
            }
            let ms = t0.elapsed().as_secs_f64() * 1000.0 / ITERATIONS as f64;

            let out = host::decode_outputs::<Mnist>(sink.beats())?;
            ensure!(
                out.iter().zip(&expected).all(|(&o, &e)| i64::from(o) == e),
                "{threads} threads, pipelined={pipelined}: output differs from reference"
            );

            let baseline = *baseline_ms.get_or_insert(ms);
            let rows_per_sec = dims.batch as f64 * 1000.0 / ms;
            let gmacs = (dims.batch * dims.classes * dims.feat) as f64 / ms / 1e6;
            println!(
                "  {:>7}  {:>9}  {:>10.2}  {:>12.0}  {:>9.3}  {:>9.2}×",
                threads,
                if pipelined { "yes" } else { "no" },
                ms,
                rows_per_sec,
                gmacs,
                baseline / ms
            );
        }
    }

    println!();
    println!("All configurations matched the reference transform.");

    Ok(())
}
