//! Engine state machine
//!
//! ```text
//! INIT → LOAD_PARAMS → { LOAD_TILE → COMPUTE_TILE → STORE_TILE } × tiles → DONE
//!                 any error ↘ FAILED
//! ```
//!
//! One run consumes exactly [`Dims::input_words`] words and produces exactly
//! [`Dims::output_words`] beats. `DONE` and `FAILED` are terminal; a new run
//! needs [`Engine::reset`], which keeps every buffer allocated.
//!
//! [`Dims::input_words`]: mmult_chip::Dims::input_words
//! [`Dims::output_words`]: mmult_chip::Dims::output_words

mod pipeline;

use crate::compute::DotEngine;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::params::Parameters;
use crate::store::TileStore;
use crate::tile::{InputTile, OutputTile};
use crate::transport::{Metered, WordSink, WordSource};
use mmult_chip::{Dims, Geometry};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Engine stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Ready to run
    Init,
    /// Draining offsets and weights
    LoadParams,
    /// Filling tile `n`
    LoadTile(usize),
    /// Computing tile `n`
    ComputeTile(usize),
    /// Emitting tile `n`
    StoreTile(usize),
    /// Every output word emitted
    Done,
    /// A run stopped on an error
    Failed,
}

impl Stage {
    /// Whether the engine must be reset before the next run
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::LoadParams => write!(f, "LOAD_PARAMS"),
            Self::LoadTile(n) => write!(f, "LOAD_TILE[{n}]"),
            Self::ComputeTile(n) => write!(f, "COMPUTE_TILE[{n}]"),
            Self::StoreTile(n) => write!(f, "STORE_TILE[{n}]"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Streaming matrix-multiply engine for geometry `G`
///
/// Buffers are sized from `G` once, in [`Engine::new`], and never grow.
///
/// ```
/// use mmult_chip::presets::Unit;
/// use mmult_driver::transports::{MemorySink, MemorySource};
/// use mmult_driver::{host, Engine, EngineConfig};
///
/// # fn main() -> mmult_driver::Result<()> {
/// let stream = host::encode_stream::<Unit>(
///     &[1, 2],
///     &[1, 1, 1, 1, 2, 0, 0, 2],
///     &[1, 2, 3, 4, 0, 0, 0, 0],
/// )?;
///
/// let mut engine = Engine::<Unit>::new(EngineConfig::default())?;
/// let mut sink = MemorySink::new();
/// engine.run(MemorySource::new(stream), &mut sink)?;
///
/// let out = host::decode_outputs::<Unit>(sink.beats())?;
/// assert_eq!(out, vec![11, 12, 1, 2]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Engine<G: Geometry> {
    config: EngineConfig,
    dot: DotEngine,
    params: Parameters<G>,
    output: OutputTile<G>,
    spare: Vec<InputTile<G>>,
    stage: Stage,
    history: Vec<Stage>,
}

impl<G: Geometry> Engine<G> {
    /// Create an engine and allocate its buffers
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is rejected or the thread pool
    /// cannot be built.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let dims: Dims = G::DIMS;
        let dot = DotEngine::new(config.parallelism)?;

        info!("Engine: {dims}");
        debug!(
            "Buffers: {} bytes, parallelism {}",
            dims.buffer_bytes(),
            dot.parallelism()
        );

        Ok(Self {
            config,
            dot,
            params: Parameters::zeroed(),
            output: OutputTile::new(),
            spare: vec![InputTile::new()],
            stage: Stage::Init,
            history: vec![Stage::Init],
        })
    }

    /// Engine configuration
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current stage
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Stages entered since construction or the last reset, in order
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// Parameters loaded by the last run
    pub const fn parameters(&self) -> &Parameters<G> {
        &self.params
    }

    /// Return to `INIT` for another run
    pub fn reset(&mut self) {
        debug!("Reset from {}", self.stage);
        self.stage = Stage::Init;
        self.history.clear();
        self.history.push(Stage::Init);
    }

    /// Run one invocation: parameters, then every tile, in stream order
    ///
    /// # Errors
    ///
    /// Returns error if the engine is not in `INIT`, the input stream is
    /// short, a result overflows, or a transport fails. On error the engine
    /// is left in `FAILED`.
    pub fn run<S, K>(&mut self, source: S, sink: K) -> Result<RunReport>
    where
        S: WordSource<G::Word>,
        K: WordSink<G::Word>,
    {
        self.begin()?;
        info!(
            "Run {}: {} → {}",
            G::NAME,
            source.transport_type(),
            sink.transport_type()
        );
        let result = self.run_sequential(source, sink);
        self.conclude(result)
    }

    fn run_sequential<S, K>(&mut self, source: S, mut sink: K) -> Result<RunReport>
    where
        S: WordSource<G::Word>,
        K: WordSink<G::Word>,
    {
        let dims = G::DIMS;
        let started = Instant::now();
        let mut report = RunReport::new(&dims, false);
        let mut source = Metered::new(source, dims.input_words());

        self.load_parameters(&mut source, &mut report)?;

        let mut input = self.take_tile();
        let result = self.stream_tiles(&mut input, &mut source, &mut sink, &mut report);
        self.spare.push(input);
        result?;

        report.words_consumed = source.consumed();
        report.total = started.elapsed();
        Ok(report)
    }

    fn stream_tiles<S, K>(
        &mut self,
        input: &mut InputTile<G>,
        source: &mut Metered<S>,
        sink: &mut K,
        report: &mut RunReport,
    ) -> Result<()>
    where
        S: WordSource<G::Word>,
        K: WordSink<G::Word>,
    {
        let mut store = TileStore::new();
        for index in 0..G::DIMS.tiles() {
            self.enter(Stage::LoadTile(index));
            let started = Instant::now();
            input.fill(source, index)?;
            report.load_tiles += started.elapsed();

            self.compute_and_store(input, &mut store, sink, report)?;
        }
        store.finish()?;
        report.words_produced = store.emitted();
        Ok(())
    }

    fn load_parameters<S: WordSource<G::Word>>(
        &mut self,
        source: &mut Metered<S>,
        report: &mut RunReport,
    ) -> Result<()> {
        self.enter(Stage::LoadParams);
        let started = Instant::now();
        self.params.load(source)?;
        report.load_params = started.elapsed();
        info!(
            "Parameters loaded: {} words in {:?}",
            source.consumed(),
            report.load_params
        );
        Ok(())
    }

    /// `COMPUTE_TILE` then `STORE_TILE` for a filled tile
    fn compute_and_store<K: WordSink<G::Word>>(
        &mut self,
        input: &InputTile<G>,
        store: &mut TileStore<G>,
        sink: &mut K,
        report: &mut RunReport,
    ) -> Result<()> {
        let index = input.index();

        self.enter(Stage::ComputeTile(index));
        let started = Instant::now();
        self.dot.compute(&self.params, input, &mut self.output)?;
        report.compute += started.elapsed();

        self.enter(Stage::StoreTile(index));
        let started = Instant::now();
        let words = store.store(&self.output, sink)?;
        report.store += started.elapsed();
        report.tiles += 1;

        debug!(
            "Tile {}/{}: rows {}.., {} words out",
            index + 1,
            G::DIMS.tiles(),
            input.first_row(),
            words
        );
        Ok(())
    }

    fn take_tile(&mut self) -> InputTile<G> {
        self.spare.pop().unwrap_or_default()
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.history.push(stage);
    }

    fn begin(&mut self) -> Result<()> {
        if self.stage != Stage::Init {
            return Err(EngineError::invalid_state(format!(
                "run requested in {}, reset first",
                self.stage
            )));
        }
        Ok(())
    }

    fn conclude(&mut self, result: Result<RunReport>) -> Result<RunReport> {
        match result {
            Ok(report) => {
                self.enter(Stage::Done);
                info!(
                    "✅ {} rows in {:?} ({:.1} rows/s)",
                    report.rows,
                    report.total,
                    report.rows_per_sec()
                );
                Ok(report)
            }
            Err(e) => {
                warn!("Run failed in {}: {e}", self.stage);
                self.enter(Stage::Failed);
                Err(e)
            }
        }
    }
}

/// Counters and timings of one run
///
/// In a pipelined run tile loading overlaps compute and store, so the stage
/// durations may add up to more than `total`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Geometry name
    pub geometry: &'static str,

    /// Input words consumed
    pub words_consumed: usize,

    /// Output words produced
    pub words_produced: usize,

    /// Tiles processed
    pub tiles: usize,

    /// Input rows processed
    pub rows: usize,

    /// Multiply-accumulates per run
    pub macs: u64,

    /// Whether tile loading ran on a prefetch thread
    pub pipelined: bool,

    /// Time spent loading offsets and weights
    pub load_params: Duration,

    /// Time spent filling input tiles
    pub load_tiles: Duration,

    /// Time spent in the dot-product stage
    pub compute: Duration,

    /// Time spent packing and emitting outputs
    pub store: Duration,

    /// Wall-clock time of the run
    pub total: Duration,
}

impl RunReport {
    fn new(dims: &Dims, pipelined: bool) -> Self {
        Self {
            geometry: dims.name,
            rows: dims.batch,
            macs: (dims.batch * dims.classes * dims.feat) as u64,
            pipelined,
            ..Self::default()
        }
    }

    /// Input rows per second
    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.total.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.rows as f64 / secs
    }

    /// Multiply-accumulate throughput in GMAC/s
    pub fn gmacs_per_sec(&self) -> f64 {
        let secs = self.total.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.macs as f64 / secs / 1e9
    }

    /// Mean latency per tile in microseconds
    pub fn tile_latency_us(&self) -> f64 {
        if self.tiles == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() * 1_000_000.0 / self.tiles as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::host;
    use crate::transports::{MemorySink, MemorySource};
    use mmult_chip::presets::Unit;

    fn unit_stream() -> Vec<u32> {
        host::encode_stream::<Unit>(&[1, 2], &[1, 1, 1, 1, 2, 0, 0, 2], &[1, 2, 3, 4, 0, 0, 0, 0])
            .unwrap()
    }

    #[test]
    fn unit_scenario() {
        let mut engine = Engine::<Unit>::new(EngineConfig::default()).unwrap();
        let mut sink = MemorySink::new();
        let report = engine.run(MemorySource::new(unit_stream()), &mut sink).unwrap();

        assert_eq!(sink.words(), vec![11, 12, 1, 2]);
        assert_eq!(report.words_consumed, 6);
        assert_eq!(report.words_produced, 4);
        assert_eq!(report.tiles, 2);
        assert_eq!(engine.stage(), Stage::Done);
    }

    #[test]
    fn history_walks_every_stage() {
        let mut engine = Engine::<Unit>::new(EngineConfig::default()).unwrap();
        engine
            .run(MemorySource::new(unit_stream()), MemorySink::new())
            .unwrap();

        assert_eq!(
            engine.history(),
            &[
                Stage::Init,
                Stage::LoadParams,
                Stage::LoadTile(0),
                Stage::ComputeTile(0),
                Stage::StoreTile(0),
                Stage::LoadTile(1),
                Stage::ComputeTile(1),
                Stage::StoreTile(1),
                Stage::Done,
            ]
        );
    }

    #[test]
    fn done_is_terminal_until_reset() {
        let mut engine = Engine::<Unit>::new(EngineConfig::default()).unwrap();
        engine
            .run(MemorySource::new(unit_stream()), MemorySink::new())
            .unwrap();

        let err = engine
            .run(MemorySource::new(unit_stream()), MemorySink::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(engine.stage(), Stage::Done);

        engine.reset();
        assert_eq!(engine.history(), &[Stage::Init]);
        assert!(engine
            .run(MemorySource::new(unit_stream()), MemorySink::new())
            .is_ok());
    }

    #[test]
    fn short_stream_fails_in_tile_load() {
        let mut stream = unit_stream();
        stream.pop();
        let mut engine = Engine::<Unit>::new(EngineConfig::default()).unwrap();
        let mut sink = MemorySink::new();
        let err = engine.run(MemorySource::new(stream), &mut sink).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(engine.stage(), Stage::Failed);
        assert_eq!(engine.history()[engine.history().len() - 2], Stage::LoadTile(1));
        // first tile already emitted, no end marker anywhere
        assert_eq!(sink.beats().len(), 2);
        assert!(sink.beats().iter().all(|b| !b.last));
    }

    #[test]
    fn zero_prefetch_rejected_at_construction() {
        let err = Engine::<Unit>::new(EngineConfig::default().with_prefetch_depth(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::ComputeTile(3).to_string(), "COMPUTE_TILE[3]");
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::LoadParams.is_terminal());
    }
}
