//! Streaming tile-based matrix-multiply engine.
//!
//! Consumes an ordered stream of packed words (offsets, weights, then
//! `BATCH / TILING` input tiles) and produces `X · Wᵗ + o` as an ordered
//! stream of packed words, the last one carrying the end-of-stream marker.
//!
//! # Pipeline
//!
//! ```text
//! WordSource ─▶ Parameters::load ─▶ { InputTile::fill ─▶ DotEngine ─▶ TileStore } × tiles ─▶ WordSink
//! ```
//!
//! Geometry is a compile-time [`Geometry`](mmult_chip::Geometry) type; an
//! `Engine<G>` for an inconsistent `G` does not build. Run-time knobs live in
//! [`EngineConfig`].
//!
//! # Quick start
//!
//! ```
//! use mmult_chip::presets::Compact;
//! use mmult_driver::host::Workload;
//! use mmult_driver::transports::{MemorySink, MemorySource};
//! use mmult_driver::{host, Engine, EngineConfig};
//!
//! # fn main() -> mmult_driver::Result<()> {
//! let work = Workload::<Compact>::synthetic(42);
//! let mut engine = Engine::<Compact>::new(EngineConfig::default().with_threads(2))?;
//! let mut sink = MemorySink::new();
//! let report = engine.run(MemorySource::new(work.stream()?), &mut sink)?;
//!
//! let out = host::decode_outputs::<Compact>(sink.beats())?;
//! let expected = work.reference()?;
//! assert!(out.iter().zip(&expected).all(|(&o, &e)| i64::from(o) == e));
//! println!("{} tiles, {:.2} GMAC/s", report.tiles, report.gmacs_per_sec());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Stage |
//! |--------|-------|
//! | `params` | Parameter Loader |
//! | `tile` | Tile Loader buffers |
//! | `compute` | Dot-Product Engine |
//! | `store` | Tile Store |
//! | `engine` | State machine, sequential and pipelined runs |
//! | [`transports`] | Memory, channel and byte-buffer streams |
//! | [`host`] | Stream encoding, decoding and the reference transform |

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod compute;
mod config;
mod engine;
mod error;
pub mod host;
mod params;
mod store;
mod tile;
mod transport;
pub mod transports;

pub use compute::{dot_cell, DotEngine};
pub use config::{EngineConfig, Parallelism, PARALLEL_THRESHOLD_MACS};
pub use engine::{Engine, RunReport, Stage};
pub use error::{EngineError, ErrorKind, Result};
pub use params::Parameters;
pub use store::TileStore;
pub use tile::{InputTile, OutputTile};
pub use transport::{Metered, TransportType, WordSink, WordSource};

/// Commonly used types.
pub mod prelude {
    pub use crate::host::Workload;
    pub use crate::transports::{BytesSink, BytesSource, MemorySink, MemorySource};
    pub use crate::{
        Engine, EngineConfig, EngineError, ErrorKind, Parallelism, Result, RunReport, Stage,
        WordSink, WordSource,
    };
    pub use mmult_chip::{Beat, Geometry};
}
