//! Compile-time geometry of the kernel.
//!
//! A [`Geometry`] fixes every dimension and element type at compile time.
//! [`Dims`] is its value-level mirror: packing ratios, stream lengths, buffer
//! footprint and the accumulator bound are all `const fn` over it.
//!
//! ## Constraints
//!
//! ```text
//! BATCH % TILING            == 0
//! FEAT  % IN_RATIO          == 0
//! FEAT  % W_RATIO           == 0
//! (BATCH·CLASSES) % OUT_RATIO == 0
//! FEAT · max|in·w|          fits the output lane
//! ```
//!
//! [`Geometry::DIMS`] checks them during constant evaluation, so an engine
//! instantiated over a bad geometry does not build. [`Dims::validate`] runs
//! the same checks at run time for reporting.

use crate::word::{Lane, Word};
use std::fmt;

/// Compile-time dimensions and element types of one kernel instance.
pub trait Geometry: Sized + Send + Sync + 'static {
    /// Human-readable name.
    const NAME: &'static str;
    /// Input rows per invocation.
    const BATCH: usize;
    /// Feature-vector length.
    const FEAT: usize;
    /// Output classes.
    const CLASSES: usize;
    /// Input rows buffered per tile.
    const TILING: usize;

    /// Transfer word.
    type Word: Word;
    /// Input feature lane.
    type Input: Lane;
    /// Weight lane.
    type Weight: Lane;
    /// Output (and offset) lane.
    type Output: Lane;

    /// Validated dimensions. Evaluating this for an invalid geometry is a
    /// compile error.
    ///
    /// ```
    /// use mmult_chip::presets::Compact;
    /// use mmult_chip::{Dims, Geometry};
    ///
    /// const COMPACT: Dims = Compact::DIMS;
    /// assert_eq!(COMPACT.tiles(), 4);
    /// ```
    ///
    /// Three rows do not split into tiles of two:
    ///
    /// ```compile_fail,E0080
    /// use mmult_chip::{Dims, Geometry};
    ///
    /// struct Uneven;
    ///
    /// impl Geometry for Uneven {
    ///     const NAME: &'static str = "uneven";
    ///     const BATCH: usize = 3;
    ///     const FEAT: usize = 4;
    ///     const CLASSES: usize = 2;
    ///     const TILING: usize = 2;
    ///
    ///     type Word = u32;
    ///     type Input = i8;
    ///     type Weight = i8;
    ///     type Output = i32;
    /// }
    ///
    /// const UNEVEN: Dims = Uneven::DIMS;
    /// ```
    const DIMS: Dims = Dims::of::<Self>().assert_valid();
}

/// Width and range of one lane type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneSpec {
    /// Type name.
    pub name: &'static str,
    /// Width in bits.
    pub bits: u32,
    /// Smallest value.
    pub min: i64,
    /// Largest value.
    pub max: i64,
}

impl LaneSpec {
    /// Describe lane type `L`.
    #[must_use]
    pub const fn of<L: Lane>() -> Self {
        Self {
            name: L::NAME,
            bits: L::BITS,
            min: L::MIN,
            max: L::MAX,
        }
    }
}

/// Value-level dimensions of a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims {
    /// Geometry name.
    pub name: &'static str,
    /// Input rows per invocation.
    pub batch: usize,
    /// Feature-vector length.
    pub feat: usize,
    /// Output classes.
    pub classes: usize,
    /// Rows per tile.
    pub tiling: usize,
    /// Transfer word width in bits.
    pub word_bits: u32,
    /// Input lane.
    pub input: LaneSpec,
    /// Weight lane.
    pub weight: LaneSpec,
    /// Output lane.
    pub output: LaneSpec,
}

impl Dims {
    /// Dimensions of geometry `G` (unvalidated).
    #[must_use]
    pub const fn of<G: Geometry>() -> Self {
        Self {
            name: G::NAME,
            batch: G::BATCH,
            feat: G::FEAT,
            classes: G::CLASSES,
            tiling: G::TILING,
            word_bits: <G::Word as Word>::BITS,
            input: LaneSpec::of::<G::Input>(),
            weight: LaneSpec::of::<G::Weight>(),
            output: LaneSpec::of::<G::Output>(),
        }
    }

    const fn ratio_of(&self, lane: &LaneSpec) -> usize {
        if lane.bits == 0 {
            0
        } else {
            (self.word_bits / lane.bits) as usize
        }
    }

    /// Input features per word (`IN_RATIO`).
    #[must_use]
    pub const fn in_ratio(&self) -> usize {
        self.ratio_of(&self.input)
    }

    /// Weights per word (`W_RATIO`).
    #[must_use]
    pub const fn w_ratio(&self) -> usize {
        self.ratio_of(&self.weight)
    }

    /// Outputs (and offsets) per word (`OUT_RATIO`).
    #[must_use]
    pub const fn out_ratio(&self) -> usize {
        self.ratio_of(&self.output)
    }

    /// Number of tiles per invocation.
    #[must_use]
    pub const fn tiles(&self) -> usize {
        self.batch / self.tiling
    }

    /// Words holding the offset vector. The last word may carry unused lanes.
    #[must_use]
    pub const fn offset_words(&self) -> usize {
        self.classes.div_ceil(self.out_ratio())
    }

    /// Words holding the weight matrix.
    #[must_use]
    pub const fn weight_words(&self) -> usize {
        self.classes * self.feat / self.w_ratio()
    }

    /// Words drained by the parameter loader.
    #[must_use]
    pub const fn parameter_words(&self) -> usize {
        self.offset_words() + self.weight_words()
    }

    /// Words per input tile.
    #[must_use]
    pub const fn tile_words(&self) -> usize {
        self.tiling * self.feat / self.in_ratio()
    }

    /// Total input stream length (`IS_SIZE`).
    #[must_use]
    pub const fn input_words(&self) -> usize {
        self.parameter_words() + self.tiles() * self.tile_words()
    }

    /// Total output stream length (`OS_SIZE`).
    #[must_use]
    pub const fn output_words(&self) -> usize {
        self.batch * self.classes / self.out_ratio()
    }

    /// Output values produced per tile.
    #[must_use]
    pub const fn tile_outputs(&self) -> usize {
        self.tiling * self.classes
    }

    /// On-chip buffer footprint in bytes: offsets, weights, input tile, output tile.
    #[must_use]
    pub const fn buffer_bytes(&self) -> usize {
        let bits = self.classes * self.output.bits as usize
            + self.classes * self.feat * self.weight.bits as usize
            + self.tiling * self.feat * self.input.bits as usize
            + self.tiling * self.classes * self.output.bits as usize;
        bits.div_ceil(8)
    }

    /// Smallest and largest single `input × weight` product.
    #[must_use]
    pub const fn product_range(&self) -> (i64, i64) {
        let (a, b) = (self.input, self.weight);
        let corners = [a.min * b.min, a.min * b.max, a.max * b.min, a.max * b.max];
        let mut lo = corners[0];
        let mut hi = corners[0];
        let mut i = 1;
        while i < corners.len() {
            if corners[i] < lo {
                lo = corners[i];
            }
            if corners[i] > hi {
                hi = corners[i];
            }
            i += 1;
        }
        (lo, hi)
    }

    /// Largest `FEAT` whose dot product (offset excluded) always fits the
    /// output lane. `i8 × i8 → i32` gives 131 071; `u8 × i8 → i32` gives 65 793.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub const fn max_safe_feat(&self) -> usize {
        let (lo, hi) = self.product_range();
        let up = if hi > 0 { self.output.max / hi } else { i64::MAX };
        let down = if lo < 0 { self.output.min / lo } else { i64::MAX };
        let bound = if up < down { up } else { down };
        if bound < 0 {
            0
        } else {
            bound as usize
        }
    }

    /// Check every constraint.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub const fn validate(&self) -> Result<(), DimsError> {
        if self.batch == 0 || self.feat == 0 || self.classes == 0 || self.tiling == 0 {
            return Err(DimsError::ZeroDimension);
        }
        if let Err(e) = check_lane(self.word_bits, &self.input, "input") {
            return Err(e);
        }
        if let Err(e) = check_lane(self.word_bits, &self.weight, "weight") {
            return Err(e);
        }
        if let Err(e) = check_lane(self.word_bits, &self.output, "output") {
            return Err(e);
        }
        if self.batch % self.tiling != 0 {
            return Err(DimsError::BatchNotTiled {
                batch: self.batch,
                tiling: self.tiling,
            });
        }
        if self.feat % self.in_ratio() != 0 {
            return Err(DimsError::FeatNotPacked {
                role: "input",
                feat: self.feat,
                ratio: self.in_ratio(),
            });
        }
        if self.feat % self.w_ratio() != 0 {
            return Err(DimsError::FeatNotPacked {
                role: "weight",
                feat: self.feat,
                ratio: self.w_ratio(),
            });
        }
        if (self.batch * self.classes) % self.out_ratio() != 0 {
            return Err(DimsError::OutputNotPacked {
                values: self.batch * self.classes,
                ratio: self.out_ratio(),
            });
        }
        if self.feat > self.max_safe_feat() {
            return Err(DimsError::AccumulatorTooNarrow {
                feat: self.feat,
                max_safe_feat: self.max_safe_feat(),
            });
        }
        Ok(())
    }

    /// Return `self`, panicking during constant evaluation if invalid.
    ///
    /// # Panics
    ///
    /// Panics on any constraint violation.
    #[must_use]
    pub const fn assert_valid(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(DimsError::ZeroDimension) => panic!("geometry has a zero dimension"),
            Err(DimsError::LaneWidth { .. }) => {
                panic!("lane width must divide the transfer word width")
            }
            Err(DimsError::BatchNotTiled { .. }) => panic!("BATCH must be a multiple of TILING"),
            Err(DimsError::FeatNotPacked { .. }) => {
                panic!("FEAT must be a multiple of IN_RATIO and W_RATIO")
            }
            Err(DimsError::OutputNotPacked { .. }) => {
                panic!("BATCH * CLASSES must be a multiple of OUT_RATIO")
            }
            Err(DimsError::AccumulatorTooNarrow { .. }) => {
                panic!("FEAT * max|input * weight| overflows the output lane")
            }
        }
    }
}

const fn check_lane(word_bits: u32, lane: &LaneSpec, role: &'static str) -> Result<(), DimsError> {
    if lane.bits == 0 || lane.bits > word_bits || word_bits % lane.bits != 0 {
        return Err(DimsError::LaneWidth {
            role,
            lane_bits: lane.bits,
            word_bits,
        });
    }
    Ok(())
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: BATCH={} FEAT={} CLASSES={} TILING={} word={}b in={} w={} out={}",
            self.name,
            self.batch,
            self.feat,
            self.classes,
            self.tiling,
            self.word_bits,
            self.input.name,
            self.weight.name,
            self.output.name
        )
    }
}

/// A violated geometry constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimsError {
    /// One of `BATCH`, `FEAT`, `CLASSES`, `TILING` is zero.
    ZeroDimension,
    /// A lane does not tile the transfer word exactly.
    LaneWidth {
        /// Which stream the lane belongs to.
        role: &'static str,
        /// Lane width.
        lane_bits: u32,
        /// Word width.
        word_bits: u32,
    },
    /// `BATCH % TILING != 0`.
    BatchNotTiled {
        /// Rows per invocation.
        batch: usize,
        /// Rows per tile.
        tiling: usize,
    },
    /// `FEAT` is not a multiple of a packing ratio.
    FeatNotPacked {
        /// `"input"` or `"weight"`.
        role: &'static str,
        /// Feature length.
        feat: usize,
        /// Packing ratio.
        ratio: usize,
    },
    /// `BATCH × CLASSES % OUT_RATIO != 0`.
    OutputNotPacked {
        /// Output values per invocation.
        values: usize,
        /// Output packing ratio.
        ratio: usize,
    },
    /// The dot product can leave the output lane range.
    AccumulatorTooNarrow {
        /// Feature length.
        feat: usize,
        /// Largest safe feature length.
        max_safe_feat: usize,
    },
}

impl fmt::Display for DimsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDimension => write!(f, "geometry has a zero dimension"),
            Self::LaneWidth {
                role,
                lane_bits,
                word_bits,
            } => write!(
                f,
                "{role} lane of {lane_bits} bits does not divide the {word_bits}-bit word"
            ),
            Self::BatchNotTiled { batch, tiling } => {
                write!(f, "BATCH={batch} is not a multiple of TILING={tiling}")
            }
            Self::FeatNotPacked { role, feat, ratio } => {
                write!(f, "FEAT={feat} is not a multiple of the {role} ratio {ratio}")
            }
            Self::OutputNotPacked { values, ratio } => write!(
                f,
                "BATCH*CLASSES={values} is not a multiple of OUT_RATIO={ratio}"
            ),
            Self::AccumulatorTooNarrow {
                feat,
                max_safe_feat,
            } => write!(
                f,
                "FEAT={feat} can overflow the output lane (max safe FEAT is {max_safe_feat})"
            ),
        }
    }
}

impl std::error::Error for DimsError {}
