//! Tile buffers
//!
//! An input tile holds `TILING × FEAT` features, refilled from the stream
//! once per tile; an output tile holds the `TILING × CLASSES` results of one
//! compute pass. Both are flat, row-major and allocated once.

use crate::error::Result;
use crate::transport::{Metered, WordSource};
use mmult_chip::{Codec, Geometry};

/// `TILING × FEAT` input features, row-major
#[derive(Debug, Clone)]
pub struct InputTile<G: Geometry> {
    values: Box<[G::Input]>,
    index: usize,
}

impl<G: Geometry> InputTile<G> {
    /// Zero-filled tile
    pub fn new() -> Self {
        let dims = G::DIMS;
        Self {
            values: vec![G::Input::default(); dims.tiling * dims.feat].into_boxed_slice(),
            index: 0,
        }
    }

    /// Refill the whole tile from `source` as tile number `index`
    ///
    /// Consumes exactly `Dims::tile_words()` words. The tile is only valid
    /// for computation once this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns error if the stream ends early or the transport fails.
    pub fn fill<S: WordSource<G::Word>>(&mut self, source: &mut Metered<S>, index: usize) -> Result<()> {
        // FEAT % IN_RATIO == 0, so no word straddles two rows
        for chunk in self.values.chunks_exact_mut(G::DIMS.in_ratio()) {
            let word = source.pull("input tile")?;
            Codec::<G::Word, G::Input>::unpack_into(word, chunk);
        }
        self.index = index;
        Ok(())
    }

    /// Tile number within the invocation
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Global row number of the first row
    pub const fn first_row(&self) -> usize {
        self.index * G::DIMS.tiling
    }

    /// Features of `row` (tile-local)
    pub fn row(&self, row: usize) -> &[G::Input] {
        let feat = G::DIMS.feat;
        &self.values[row * feat..(row + 1) * feat]
    }

    /// All features, row-major
    pub fn values(&self) -> &[G::Input] {
        &self.values
    }
}

impl<G: Geometry> Default for InputTile<G> {
    fn default() -> Self {
        Self::new()
    }
}

/// `TILING × CLASSES` results, row-major, class-ascending
#[derive(Debug, Clone)]
pub struct OutputTile<G: Geometry> {
    values: Box<[G::Output]>,
}

impl<G: Geometry> OutputTile<G> {
    /// Zero-filled tile
    pub fn new() -> Self {
        Self {
            values: vec![G::Output::default(); G::DIMS.tile_outputs()].into_boxed_slice(),
        }
    }

    /// All results, row-major
    pub fn values(&self) -> &[G::Output] {
        &self.values
    }

    /// Mutable results, row-major
    pub fn values_mut(&mut self) -> &mut [G::Output] {
        &mut self.values
    }

    /// Results of `row` (tile-local)
    pub fn row(&self, row: usize) -> &[G::Output] {
        let classes = G::DIMS.classes;
        &self.values[row * classes..(row + 1) * classes]
    }
}

impl<G: Geometry> Default for OutputTile<G> {
    fn default() -> Self {
        Self::new()
    }
}
