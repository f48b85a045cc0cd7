//! Prefetching run
//!
//! A scoped loader thread owns the input stream once parameters are in and
//! fills tiles ahead of the compute stage:
//!
//! ```text
//! loader:  fill(0) fill(1) fill(2) ...            ──full──▶
//! caller:          compute(0) store(0) compute(1) ...   ──free──▶ loader
//! ```
//!
//! `full` is bounded at `prefetch_depth`, capped at the tile count; `free`
//! returns drained buffers, so at most `min(prefetch_depth, tiles) + 1` tiles
//! are ever allocated. Input words are
//! still read in stream order by a single thread, and tiles arrive at the
//! caller in index order, so the output stream is identical to
//! [`Engine::run`].

use super::{Engine, RunReport, Stage};
use crate::error::{EngineError, Result};
use crate::store::TileStore;
use crate::tile::InputTile;
use crate::transport::{Metered, WordSink, WordSource};
use mmult_chip::Geometry;
use std::sync::mpsc::{channel, sync_channel, Receiver, SendError, Sender, SyncSender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, trace};

/// What the loader hands back when it exits
struct Loaded<G: Geometry> {
    consumed: usize,
    elapsed: Duration,
    spare: Vec<InputTile<G>>,
}

impl<G: Geometry> Engine<G> {
    /// Like [`Engine::run`], with tile loading on a prefetch thread
    ///
    /// # Errors
    ///
    /// Same as [`Engine::run`]; additionally a transfer error if the loader
    /// thread panics.
    pub fn run_pipelined<S, K>(&mut self, source: S, sink: K) -> Result<RunReport>
    where
        S: WordSource<G::Word> + Send,
        K: WordSink<G::Word>,
    {
        self.begin()?;
        info!(
            "Run {} pipelined (prefetch {}): {} → {}",
            G::NAME,
            self.config.prefetch_depth.min(G::DIMS.tiles()),
            source.transport_type(),
            sink.transport_type()
        );
        let result = self.run_prefetching(source, sink);
        self.conclude(result)
    }

    fn run_prefetching<S, K>(&mut self, source: S, mut sink: K) -> Result<RunReport>
    where
        S: WordSource<G::Word> + Send,
        K: WordSink<G::Word>,
    {
        let dims = G::DIMS;
        let depth = self.config.prefetch_depth.min(dims.tiles());
        let started = Instant::now();
        let mut report = RunReport::new(&dims, true);
        let mut source = Metered::new(source, dims.input_words());

        self.load_parameters(&mut source, &mut report)?;

        let buffers: Vec<InputTile<G>> = (0..=depth).map(|_| self.take_tile()).collect();
        let (full_tx, full_rx) = sync_channel(depth);
        let (free_tx, free_rx) = channel();

        let (loaded, drained) = thread::scope(|scope| -> Result<(Loaded<G>, Result<()>)> {
            let loader = thread::Builder::new()
                .name("mmult-loader".into())
                .spawn_scoped(scope, move || load_ahead(source, buffers, &full_tx, &free_rx))
                .map_err(EngineError::from)?;

            // channels close when this returns, which releases a blocked loader
            let drained = self.drain_tiles(full_rx, free_tx, &mut sink, &mut report);

            loader
                .join()
                .map(|loaded| (loaded, drained))
                .map_err(|_| EngineError::transfer_failed("tile loader panicked"))
        })?;

        self.spare.extend(loaded.spare);
        drained?;

        report.words_consumed = loaded.consumed;
        report.load_tiles = loaded.elapsed;
        report.total = started.elapsed();
        Ok(report)
    }

    fn drain_tiles<K: WordSink<G::Word>>(
        &mut self,
        full: Receiver<Result<InputTile<G>>>,
        free: Sender<InputTile<G>>,
        sink: &mut K,
        report: &mut RunReport,
    ) -> Result<()> {
        let mut store = TileStore::new();
        for index in 0..G::DIMS.tiles() {
            self.enter(Stage::LoadTile(index));
            let tile = full
                .recv()
                .map_err(|_| EngineError::transfer_failed("tile loader stopped early"))??;

            self.compute_and_store(&tile, &mut store, sink, report)?;

            if let Err(SendError(tile)) = free.send(tile) {
                self.spare.push(tile);
            }
        }
        store.finish()?;
        report.words_produced = store.emitted();
        Ok(())
    }
}

/// Loader thread body: fill tiles in index order until done or cut off
fn load_ahead<G, S>(
    mut source: Metered<S>,
    mut spare: Vec<InputTile<G>>,
    full: &SyncSender<Result<InputTile<G>>>,
    free: &Receiver<InputTile<G>>,
) -> Loaded<G>
where
    G: Geometry,
    S: WordSource<G::Word>,
{
    let mut elapsed = Duration::ZERO;
    for index in 0..G::DIMS.tiles() {
        let Some(mut tile) = spare.pop().or_else(|| free.recv().ok()) else {
            break;
        };

        let started = Instant::now();
        let filled = tile.fill(&mut source, index).map(|()| tile);
        elapsed += started.elapsed();

        let failed = filled.is_err();
        if full.send(filled).is_err() || failed {
            break;
        }
        trace!("Prefetched tile {index}");
    }

    spare.extend(free.try_iter());
    Loaded {
        consumed: source.consumed(),
        elapsed,
        spare,
    }
}
