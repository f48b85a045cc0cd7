//! Streaming over channels
//!
//! A producer thread feeds the input stream word by word, the engine runs
//! with a prefetching loader, and a consumer thread collects output beats
//! until the end marker.

use mmult_chip::presets::Compact;
use mmult_driver::host;
use mmult_driver::prelude::*;
use mmult_driver::transports::{channel_sink, channel_source};
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("mmult_driver=info")
        .init();

    let dims = Compact::DIMS;
    println!("🧮 {dims}\n");

    let work = Workload::<Compact>::synthetic(7);
    let stream = work.stream()?;
    let (tx, source) = channel_source(16);
    let (sink, rx) = channel_sink(16);

    let producer = thread::spawn(move || {
        for word in stream {
            if tx.send(word).is_err() {
                break;
            }
        }
    });
    let consumer = thread::spawn(move || {
        let mut beats = Vec::new();
        for beat in rx {
            beats.push(beat);
            if beat.last {
                break;
            }
        }
        beats
    });

    let mut engine = Engine::<Compact>::new(EngineConfig::default().with_prefetch_depth(2))?;
    let report = engine.run_pipelined(source.with_timeout(Duration::from_secs(1)), sink)?;

    let _ = producer.join();
    let beats = consumer.join().unwrap_or_default();
    println!("📥 {} beats, last marked: {}", beats.len(), beats.last().is_some_and(|b| b.last));

    let out = host::decode_outputs::<Compact>(&beats)?;
    let expected = work.reference()?;
    let matched = out.iter().zip(&expected).filter(|&(&o, &e)| i64::from(o) == e).count();
    println!("✅ {matched}/{} outputs match the reference", out.len());
    println!("   {:.0} rows/s, {:.1} µs/tile", report.rows_per_sec(), report.tile_latency_us());

    Ok(())
}
