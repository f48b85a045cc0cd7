//! Transfer words and lanes.
//!
//! A [`Word`] is the opaque bit container moved over the stream (the `TDATA`
//! payload of one stream beat on the reference kernel, 64 bits wide).
//! A [`Lane`] is one narrow scalar slot inside a word.
//!
//! Both expose their raw bits through `u128`, which is wide enough for every
//! supported word, so the codec is plain shifts and masks with no aliasing.

use std::fmt::Debug;

/// Fixed-width transfer word.
pub trait Word: Copy + Default + Eq + Debug + Send + Sync + 'static {
    /// Width of the word in bits.
    const BITS: u32;

    /// Width of the word in bytes (little-endian on the wire).
    const BYTES: usize = (Self::BITS / 8) as usize;

    /// Raw bits, zero-extended to `u128`.
    fn to_bits(self) -> u128;

    /// Build a word from the low `BITS` bits of `bits`.
    fn from_bits(bits: u128) -> Self;
}

macro_rules! impl_word {
    ($($t:ty),* $(,)?) => {$(
        impl Word for $t {
            const BITS: u32 = <$t>::BITS;

            #[inline]
            fn to_bits(self) -> u128 {
                u128::from(self)
            }

            #[inline]
            #[allow(clippy::cast_possible_truncation, clippy::unnecessary_cast)]
            fn from_bits(bits: u128) -> Self {
                bits as $t
            }
        }
    )*};
}

impl_word!(u32, u64, u128);

/// Narrow scalar carried in a word lane.
///
/// `MIN`/`MAX` are widened to `i64` so the geometry can reason about
/// accumulator ranges in `const` context.
pub trait Lane: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Width of one lane in bits.
    const BITS: u32;
    /// Smallest representable value.
    const MIN: i64;
    /// Largest representable value.
    const MAX: i64;
    /// Type name, for diagnostics.
    const NAME: &'static str;

    /// Decode from the low `BITS` bits (sign-extending for signed lanes).
    fn from_bits(bits: u128) -> Self;

    /// Encode into exactly `BITS` low bits; higher bits are zero.
    fn to_bits(self) -> u128;

    /// Lossless widening into the accumulator type.
    fn widen(self) -> i64;

    /// Checked narrowing from the accumulator type.
    fn narrow(value: i64) -> Option<Self>;
}

macro_rules! impl_lane {
    ($($t:ty => $u:ty),* $(,)?) => {$(
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_possible_wrap,
            clippy::cast_sign_loss,
            clippy::cast_lossless,
            clippy::unnecessary_cast
        )]
        impl Lane for $t {
            const BITS: u32 = <$t>::BITS;
            const MIN: i64 = <$t>::MIN as i64;
            const MAX: i64 = <$t>::MAX as i64;
            const NAME: &'static str = stringify!($t);

            #[inline]
            fn from_bits(bits: u128) -> Self {
                bits as $u as $t
            }

            #[inline]
            fn to_bits(self) -> u128 {
                u128::from(self as $u)
            }

            #[inline]
            fn widen(self) -> i64 {
                i64::from(self)
            }

            #[inline]
            fn narrow(value: i64) -> Option<Self> {
                <$t>::try_from(value).ok()
            }
        }
    )*};
}

impl_lane!(i8 => u8, u8 => u8, i16 => u16, u16 => u16, i32 => u32);
