//! Lane codec: packs narrow scalars into transfer words and back.
//!
//! ## Layout
//!
//! ```text
//! word (W::BITS)   : | lane N-1 | ... | lane 1 | lane 0 |
//!                    MSB                               LSB
//! lane i occupies bits [i·L::BITS, (i+1)·L::BITS)
//! ```
//!
//! Lane 0 is the first scalar in stream order. Each lane is decoded from its
//! own bits only, so a negative `i8` in lane 2 never bleeds into lane 3.
//! The codec is total: every word decodes, and `pack(unpack(w)) == w`.

use crate::word::{Lane, Word};
use std::marker::PhantomData;

/// Number of `L` lanes carried by one `W` word.
#[must_use]
pub const fn ratio<W: Word, L: Lane>() -> usize {
    (W::BITS / L::BITS) as usize
}

/// Shift-and-mask codec for `L` lanes inside `W` words.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec<W, L>(PhantomData<(W, L)>);

impl<W: Word, L: Lane> Codec<W, L> {
    /// Lanes per word.
    pub const RATIO: usize = ratio::<W, L>();

    const LANE_BITS: usize = L::BITS as usize;

    /// Iterate the `RATIO` lanes of `word`, lane 0 first.
    pub fn lanes(word: W) -> impl Iterator<Item = L> + Clone {
        let bits = word.to_bits();
        (0..Self::RATIO).map(move |i| L::from_bits(bits >> (i * Self::LANE_BITS)))
    }

    /// Decode `word` into `out`, lane 0 into `out[0]`.
    ///
    /// Writes `min(out.len(), RATIO)` lanes; the rest of `out` is untouched.
    pub fn unpack_into(word: W, out: &mut [L]) {
        for (slot, lane) in out.iter_mut().zip(Self::lanes(word)) {
            *slot = lane;
        }
    }

    /// Decode `word` into a freshly allocated vector of `RATIO` lanes.
    #[must_use]
    pub fn unpack(word: W) -> Vec<L> {
        Self::lanes(word).collect()
    }

    /// Encode `lanes` into one word, `lanes[0]` in the low-order bits.
    ///
    /// A short slice leaves the remaining high lanes zero; lanes past
    /// `RATIO` are ignored.
    #[must_use]
    pub fn pack(lanes: &[L]) -> W {
        let bits = lanes
            .iter()
            .take(Self::RATIO)
            .enumerate()
            .fold(0u128, |acc, (i, lane)| {
                acc | (lane.to_bits() << (i * Self::LANE_BITS))
            });
        W::from_bits(bits)
    }
}
