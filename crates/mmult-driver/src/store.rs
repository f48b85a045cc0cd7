//! Tile store
//!
//! Serializes output tiles into words, row-major and class-ascending, and
//! marks the final word of the invocation with the end-of-stream flag.
//!
//! Packing runs over the whole invocation's output sequence rather than
//! per tile: when `TILING · CLASSES` is not a multiple of `OUT_RATIO` the
//! unfinished word is carried into the next tile. `BATCH · CLASSES` is a
//! multiple of `OUT_RATIO`, so nothing is left over after the last tile.

use crate::error::{EngineError, Result};
use crate::tile::OutputTile;
use crate::transport::WordSink;
use mmult_chip::{Beat, Codec, Geometry};
use tracing::trace;

/// Packs output values into words and appends them to the sink
#[derive(Debug)]
pub struct TileStore<G: Geometry> {
    pending: Vec<G::Output>,
    emitted: usize,
    expected: usize,
}

impl<G: Geometry> TileStore<G> {
    /// Store for one invocation of `G`
    pub fn new() -> Self {
        let dims = G::DIMS;
        Self {
            pending: Vec::with_capacity(dims.out_ratio()),
            emitted: 0,
            expected: dims.output_words(),
        }
    }

    /// Append `tile` to the output stream
    ///
    /// Returns the number of words emitted for this tile.
    ///
    /// # Errors
    ///
    /// Returns error if the sink fails or the invocation's output is already
    /// complete.
    pub fn store<K: WordSink<G::Word> + ?Sized>(
        &mut self,
        tile: &OutputTile<G>,
        sink: &mut K,
    ) -> Result<usize> {
        let ratio = G::DIMS.out_ratio();
        let before = self.emitted;
        for &value in tile.values() {
            self.pending.push(value);
            if self.pending.len() == ratio {
                self.flush(sink)?;
            }
        }
        trace!(
            "Stored {} words, {} values carried",
            self.emitted - before,
            self.pending.len()
        );
        Ok(self.emitted - before)
    }

    fn flush<K: WordSink<G::Word> + ?Sized>(&mut self, sink: &mut K) -> Result<()> {
        if self.emitted == self.expected {
            return Err(EngineError::invalid_state(format!(
                "output already holds all {} words",
                self.expected
            )));
        }
        let word = Codec::<G::Word, G::Output>::pack(&self.pending);
        self.pending.clear();
        self.emitted += 1;
        sink.push(Beat::with_last(word, self.emitted == self.expected))
    }

    /// Words emitted so far
    pub const fn emitted(&self) -> usize {
        self.emitted
    }

    /// Confirm the output stream is complete and nothing is carried
    ///
    /// # Errors
    ///
    /// Returns error if words are missing or values are still pending.
    pub fn finish(&self) -> Result<()> {
        if self.emitted != self.expected || !self.pending.is_empty() {
            return Err(EngineError::invalid_state(format!(
                "output incomplete: {} of {} words, {} values pending",
                self.emitted,
                self.expected,
                self.pending.len()
            )));
        }
        Ok(())
    }
}

impl<G: Geometry> Default for TileStore<G> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transports::MemorySink;
    use mmult_chip::presets::Unit;
    use mmult_chip::{Dims, Lane, Word};

    /// Three classes, one row per tile, two outputs per word: words straddle tiles.
    #[derive(Debug)]
    struct Straddle;

    impl Geometry for Straddle {
        const NAME: &'static str = "straddle";
        const BATCH: usize = 2;
        const FEAT: usize = 8;
        const CLASSES: usize = 3;
        const TILING: usize = 1;

        type Word = u64;
        type Input = i8;
        type Weight = i8;
        type Output = i32;
    }

    fn tile<G: Geometry>(values: &[G::Output]) -> OutputTile<G> {
        let mut tile = OutputTile::new();
        tile.values_mut().copy_from_slice(values);
        tile
    }

    #[test]
    fn unit_store_marks_only_final_word() {
        let mut store = TileStore::<Unit>::new();
        let mut sink = MemorySink::new();
        assert_eq!(store.store(&tile::<Unit>(&[11, 12]), &mut sink).unwrap(), 2);
        assert_eq!(store.store(&tile::<Unit>(&[13, 14]), &mut sink).unwrap(), 2);
        store.finish().unwrap();

        let beats = sink.beats();
        assert_eq!(sink.words(), vec![11, 12, 13, 14]);
        assert_eq!(beats.iter().filter(|b| b.last).count(), 1);
        assert!(beats[3].last);
    }

    #[test]
    fn partial_word_carries_into_next_tile() {
        let dims: Dims = Straddle::DIMS;
        assert_eq!(dims.output_words(), 3);

        let mut store = TileStore::<Straddle>::new();
        let mut sink = MemorySink::new();
        assert_eq!(store.store(&tile::<Straddle>(&[1, 2, 3]), &mut sink).unwrap(), 1);
        assert!(store.finish().is_err());
        assert_eq!(store.store(&tile::<Straddle>(&[4, 5, 6]), &mut sink).unwrap(), 2);
        store.finish().unwrap();

        let values: Vec<i32> = sink
            .words()
            .into_iter()
            .flat_map(Codec::<u64, i32>::unpack)
            .collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5, 6]);
        assert!(sink.beats()[2].last);
        assert!(!sink.beats()[1].last);
        assert_eq!(<u64 as Word>::BITS / <i32 as Lane>::BITS, 2);
    }

    #[test]
    fn refuses_words_past_the_end() {
        let mut store = TileStore::<Unit>::new();
        let mut sink = MemorySink::new();
        store.store(&tile::<Unit>(&[1, 2]), &mut sink).unwrap();
        store.store(&tile::<Unit>(&[3, 4]), &mut sink).unwrap();
        assert!(store.store(&tile::<Unit>(&[5, 6]), &mut sink).is_err());
    }
}
