//! Run-time engine configuration
//!
//! Geometry is fixed at compile time; this covers the knobs that are not:
//! how many threads the dot-product stage may use and how far the
//! pipelined loader may run ahead.

use crate::error::{EngineError, Result};
use mmult_chip::Dims;
use std::num::NonZeroUsize;
use tracing::debug;

/// Multiply-accumulates per tile below which threading costs more than it saves.
pub const PARALLEL_THRESHOLD_MACS: usize = 1 << 16;

/// Degree of parallelism for the dot-product stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    /// Single thread, `(row, class)` in order
    #[default]
    Sequential,

    /// Dedicated pool with exactly this many threads
    Threads(NonZeroUsize),

    /// Dedicated pool sized to the available cores
    Auto,
}

impl Parallelism {
    /// `n <= 1` is sequential, anything larger a pool of `n` threads.
    pub fn threads(n: usize) -> Self {
        match NonZeroUsize::new(n) {
            Some(n) if n.get() > 1 => Self::Threads(n),
            _ => Self::Sequential,
        }
    }

    /// Whether a thread pool is needed
    pub const fn is_parallel(&self) -> bool {
        !matches!(self, Self::Sequential)
    }
}

impl std::fmt::Display for Parallelism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Threads(n) => write!(f, "{n} threads"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Dot-product parallelism
    pub parallelism: Parallelism,

    /// Tiles the pipelined loader may hold ahead of the compute stage
    pub prefetch_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: Parallelism::Sequential,
            prefetch_depth: 2,
        }
    }
}

impl EngineConfig {
    /// Derive a configuration from the geometry's per-tile work.
    ///
    /// Small tiles stay sequential; large ones get a pool sized to the machine.
    pub fn for_dims(dims: &Dims) -> Self {
        let macs = dims.tiling * dims.classes * dims.feat;
        let parallelism = if macs < PARALLEL_THRESHOLD_MACS {
            Parallelism::Sequential
        } else {
            Parallelism::Auto
        };

        debug!("{} MACs per tile, parallelism {parallelism}", macs);

        Self {
            parallelism,
            ..Self::default()
        }
    }

    /// Set the parallelism degree
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Shorthand for [`Parallelism::threads`]
    #[must_use]
    pub fn with_threads(self, n: usize) -> Self {
        self.with_parallelism(Parallelism::threads(n))
    }

    /// Set the prefetch depth of the pipelined loader
    #[must_use]
    pub fn with_prefetch_depth(mut self, depth: usize) -> Self {
        self.prefetch_depth = depth;
        self
    }

    /// Check the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the prefetch depth is zero.
    pub fn validate(&self) -> Result<()> {
        if self.prefetch_depth == 0 {
            return Err(EngineError::invalid_config(
                "prefetch depth must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmult_chip::presets::{Mnist, Unit};
    use mmult_chip::Geometry;

    #[test]
    fn threads_shorthand() {
        assert_eq!(Parallelism::threads(0), Parallelism::Sequential);
        assert_eq!(Parallelism::threads(1), Parallelism::Sequential);
        assert!(matches!(Parallelism::threads(4), Parallelism::Threads(n) if n.get() == 4));
    }

    #[test]
    fn small_geometry_stays_sequential() {
        let config = EngineConfig::for_dims(&Unit::DIMS);
        assert_eq!(config.parallelism, Parallelism::Sequential);
        assert!(!config.parallelism.is_parallel());
    }

    #[test]
    fn large_geometry_goes_parallel() {
        // 128 × 10 × 256 = 327 680 MACs per tile
        let config = EngineConfig::for_dims(&Mnist::DIMS);
        assert_eq!(config.parallelism, Parallelism::Auto);
        assert!(config.parallelism.is_parallel());
    }

    #[test]
    fn zero_prefetch_rejected() {
        let config = EngineConfig::default().with_prefetch_depth(0);
        assert!(config.validate().is_err());
        assert!(EngineConfig::default().validate().is_ok());
    }
}
