//! Dot-product engine
//!
//! ```text
//! out[i][j] = offset[j] + Σ_k in[i][k] · weight[j][k]      k = 0..FEAT
//! ```
//!
//! ## Overflow policy
//!
//! Products and sums are formed in `i64`. `Geometry::DIMS` guarantees at
//! compile time that `FEAT · max|in·w|` fits the output lane, so the sum
//! alone never overflows `i64` either. The offset is added in `i64` and the
//! total narrowed with a range check: a value outside the output lane is
//! [`EngineError::Overflow`], never a wrapped result.
//!
//! ## Parallelism
//!
//! Every `(row, class)` cell is independent. With a pool, the flat output
//! tile is split across threads with `par_iter_mut`; each cell is written by
//! exactly one thread at its row-major index, so the result is bit-identical
//! to the sequential path.

use crate::config::Parallelism;
use crate::error::{EngineError, Result};
use crate::params::Parameters;
use crate::tile::{InputTile, OutputTile};
use mmult_chip::{Geometry, Lane};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Computes output tiles from an input tile and the loaded parameters
#[derive(Debug)]
pub struct DotEngine {
    pool: Option<ThreadPool>,
    parallelism: Parallelism,
}

impl DotEngine {
    /// Create an engine, building a thread pool if `parallelism` asks for one
    ///
    /// # Errors
    ///
    /// Returns error if the thread pool cannot be built.
    pub fn new(parallelism: Parallelism) -> Result<Self> {
        let pool = match parallelism {
            Parallelism::Sequential => None,
            Parallelism::Threads(n) => Some(build_pool(n.get())?),
            Parallelism::Auto => Some(build_pool(0)?),
        };
        if let Some(pool) = &pool {
            debug!("Dot-product pool: {} threads", pool.current_num_threads());
        }
        Ok(Self { pool, parallelism })
    }

    /// Configured parallelism
    pub const fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    /// Compute every `(row, class)` cell of `output` from `input`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Overflow`] if a result does not fit the output
    /// lane. With a pool, which of several overflowing cells is reported is
    /// unspecified.
    pub fn compute<G: Geometry>(
        &self,
        params: &Parameters<G>,
        input: &InputTile<G>,
        output: &mut OutputTile<G>,
    ) -> Result<()> {
        let classes = G::DIMS.classes;
        let cell = |index: usize, slot: &mut G::Output| -> Result<()> {
            let (row, class) = (index / classes, index % classes);
            *slot = dot_cell(params, input, row, class)?;
            Ok(())
        };

        match &self.pool {
            None => output
                .values_mut()
                .iter_mut()
                .enumerate()
                .try_for_each(|(index, slot)| cell(index, slot)),
            Some(pool) => pool.install(|| {
                output
                    .values_mut()
                    .par_iter_mut()
                    .with_min_len(classes)
                    .enumerate()
                    .try_for_each(|(index, slot)| cell(index, slot))
            }),
        }
    }
}

fn build_pool(threads: usize) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("mmult-dot-{i}"))
        .build()
        .map_err(|e| EngineError::invalid_config(format!("thread pool: {e}")))
}

/// Dot product of tile-local `row` against `class`, plus the class offset
///
/// # Errors
///
/// Returns [`EngineError::Overflow`] if the result does not fit the output lane.
pub fn dot_cell<G: Geometry>(
    params: &Parameters<G>,
    input: &InputTile<G>,
    row: usize,
    class: usize,
) -> Result<G::Output> {
    let sum: i64 = input
        .row(row)
        .iter()
        .zip(params.weight_row(class))
        .map(|(x, w)| x.widen() * w.widen())
        .sum();
    let value = params.offsets()[class].widen() + sum;

    G::Output::narrow(value).ok_or(EngineError::Overflow {
        row: input.first_row() + row,
        class,
        value,
        lane: G::Output::NAME,
    })
}
