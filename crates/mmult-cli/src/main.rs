//! `mmult`: command-line driver for the streaming matrix-multiply engine.
//!
//! ```text
//! USAGE:
//!   mmult info     [--preset P]                       Geometry, ratios, stream lengths
//!   mmult run      --input F --output F [--preset P]  Run on a little-endian word image
//!   mmult selftest [--preset P]                       Synthetic workload vs reference
//! ```
//!
//! Run and selftest accept `--threads N`, `--pipelined` and `--prefetch D`.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand, ValueEnum};
use mmult_chip::presets::{Compact, Mnist, Unit};
use mmult_chip::{Geometry, Lane, Word};
use mmult_driver::host::{self, Workload};
use mmult_driver::transports::{BytesSink, BytesSource, MemorySink, MemorySource};
use mmult_driver::{Engine, EngineConfig, RunReport, WordSink, WordSource};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mmult", about = "Streaming tile matrix-multiply engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print dimensions, packing ratios, buffer sizes and stream lengths.
    Info {
        /// Geometry preset.
        #[arg(long, value_enum, default_value_t = Preset::Mnist)]
        preset: Preset,
    },
    /// Run the engine on an input stream image and write the output image.
    Run {
        /// Input stream: little-endian words, offsets then weights then tiles.
        #[arg(long)]
        input: PathBuf,
        /// Output stream: little-endian words.
        #[arg(long)]
        output: PathBuf,
        /// Geometry preset.
        #[arg(long, value_enum, default_value_t = Preset::Mnist)]
        preset: Preset,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Run a deterministic synthetic workload and check it against the reference.
    Selftest {
        /// Geometry preset.
        #[arg(long, value_enum, default_value_t = Preset::Compact)]
        preset: Preset,
        /// Workload seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[command(flatten)]
        exec: ExecArgs,
    },
}

#[derive(Args, Clone, Copy)]
struct ExecArgs {
    /// Dot-product threads (0 or 1: sequential; omit to size from the geometry).
    #[arg(long)]
    threads: Option<usize>,
    /// Load tiles on a prefetch thread.
    #[arg(long)]
    pipelined: bool,
    /// Tiles the prefetch thread may run ahead.
    #[arg(long, default_value_t = 2)]
    prefetch: usize,
}

impl ExecArgs {
    fn config<G: Geometry>(self) -> EngineConfig {
        let config = EngineConfig::for_dims(&G::DIMS).with_prefetch_depth(self.prefetch);
        match self.threads {
            Some(n) => config.with_threads(n),
            None => config,
        }
    }

    fn execute<G, S, K>(self, source: S, sink: K) -> Result<RunReport>
    where
        G: Geometry,
        S: WordSource<G::Word> + Send,
        K: WordSink<G::Word>,
    {
        let mut engine = Engine::<G>::new(self.config::<G>())?;
        info!(
            "{}: {}, prefetch {}",
            G::NAME,
            engine.config().parallelism,
            engine.config().prefetch_depth
        );
        let report = if self.pipelined {
            engine.run_pipelined(source, sink)?
        } else {
            engine.run(source, sink)?
        };
        Ok(report)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    /// 8192 × 256 → 10, tiles of 128, u64 words (reference kernel).
    Mnist,
    /// 64 × 32 → 4, tiles of 16, u64 words.
    Compact,
    /// 2 × 4 → 2, one row per tile, u32 words.
    Unit,
}

/// Call `$f::<G>($args)` with the geometry type of `$preset`.
macro_rules! with_preset {
    ($preset:expr, $f:ident ( $($args:expr),* )) => {
        match $preset {
            Preset::Mnist => $f::<Mnist>($($args),*),
            Preset::Compact => $f::<Compact>($($args),*),
            Preset::Unit => $f::<Unit>($($args),*),
        }
    };
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Info { preset } => with_preset!(preset, cmd_info())?,
        Cmd::Run {
            input,
            output,
            preset,
            exec,
        } => with_preset!(preset, cmd_run(&input, &output, exec))?,
        Cmd::Selftest { preset, seed, exec } => with_preset!(preset, cmd_selftest(seed, exec))?,
    }

    Ok(())
}

fn cmd_info<G: Geometry>() -> Result<()> {
    let d = G::DIMS;
    d.validate()?;
    let (lo, hi) = d.product_range();

    println!("Geometry      : {}", d.name);
    println!("BATCH×FEAT    : {} × {}", d.batch, d.feat);
    println!("CLASSES       : {}", d.classes);
    println!("TILING        : {} rows ({} tiles)", d.tiling, d.tiles());
    println!(
        "Lanes         : word u{}, in {} ×{}, w {} ×{}, out {} ×{}",
        d.word_bits,
        d.input.name,
        d.in_ratio(),
        d.weight.name,
        d.w_ratio(),
        d.output.name,
        d.out_ratio()
    );
    println!(
        "Input stream  : {} words ({} offset + {} weight + {} × {} tile)",
        d.input_words(),
        d.offset_words(),
        d.weight_words(),
        d.tiles(),
        d.tile_words()
    );
    println!("Output stream : {} words", d.output_words());
    println!("Buffers       : {} bytes", d.buffer_bytes());
    let config = EngineConfig::for_dims(&d);
    println!(
        "Default exec  : {}{}, prefetch {}",
        config.parallelism,
        if config.parallelism.is_parallel() { " (rayon pool)" } else { "" },
        config.prefetch_depth
    );
    println!(
        "Accumulator   : products in [{lo}, {hi}], FEAT ≤ {} fits {}",
        d.max_safe_feat(),
        d.output.name
    );

    Ok(())
}

fn cmd_run<G: Geometry>(input: &Path, output: &Path, exec: ExecArgs) -> Result<()> {
    let dims = G::DIMS;
    let image = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;

    let expected = dims.input_words() * G::Word::BYTES;
    if image.len() < expected {
        bail!(
            "{}: {} bytes, {} needs {} ({} words)",
            input.display(),
            image.len(),
            dims.name,
            expected,
            dims.input_words()
        );
    }
    if image.len() > expected {
        warn!(
            "{}: {} trailing bytes ignored",
            input.display(),
            image.len() - expected
        );
    }

    let source = BytesSource::<G::Word>::new(Bytes::from(image));
    let mut sink = BytesSink::<G::Word>::with_capacity(dims.output_words());
    let report = exec.execute::<G, _, _>(source, &mut sink)?;

    info!("{} output words, end marked: {}", sink.words(), sink.end_marked());
    std::fs::write(output, sink.freeze())
        .with_context(|| format!("writing {}", output.display()))?;

    print_report(&report);
    Ok(())
}

fn cmd_selftest<G: Geometry>(seed: u64, exec: ExecArgs) -> Result<()> {
    let work = Workload::<G>::synthetic(seed);
    let stream = work.stream()?;
    let expected = work.reference()?;

    let mut sink = MemorySink::with_capacity(G::DIMS.output_words());
    let report = exec.execute::<G, _, _>(MemorySource::new(stream), &mut sink)?;
    let out = host::decode_outputs::<G>(sink.beats())?;

    let classes = G::DIMS.classes;
    let mismatches: Vec<(usize, i64, i64)> = out
        .iter()
        .zip(&expected)
        .enumerate()
        .filter_map(|(i, (o, &e))| {
            let got = o.widen();
            (got != e).then_some((i, got, e))
        })
        .collect();

    print_report(&report);

    for &(i, got, want) in mismatches.iter().take(10) {
        println!("  row {:>5} class {:>3}: got {got}, want {want}", i / classes, i % classes);
    }
    if !mismatches.is_empty() {
        bail!("{} of {} outputs differ from the reference", mismatches.len(), out.len());
    }

    println!("✅ {} outputs match the reference (seed {seed})", out.len());
    Ok(())
}

fn print_report(r: &RunReport) {
    println!(
        "{}: {} tiles, {} words in, {} words out{}",
        r.geometry,
        r.tiles,
        r.words_consumed,
        r.words_produced,
        if r.pipelined { ", pipelined" } else { "" }
    );
    println!(
        "  params {:?}  load {:?}  compute {:?}  store {:?}  total {:?}",
        r.load_params, r.load_tiles, r.compute, r.store, r.total
    );
    println!(
        "  {:.0} rows/s  {:.3} GMAC/s  {:.1} µs/tile",
        r.rows_per_sec(),
        r.gmacs_per_sec(),
        r.tile_latency_us()
    );
}
