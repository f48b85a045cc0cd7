//! Kernel model for the streaming tile matrix-multiply engine.
//!
//! This crate has **no dependencies** and **no I/O**: it is a pure model of
//! the accelerator kernel: the transfer-word format, how narrow scalars are
//! packed into words, the compile-time geometry and the stream framing.
//!
//! The kernel computes `out = X · Wᵗ + o` over an ordered word stream:
//!
//! ```text
//! input stream : [offsets][weights, row-major][tile 0 inputs][tile 1 inputs]...
//! output stream:                              [tile 0 out]  [tile 1 out] ... (last)
//! ```
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`word`] | `Word` / `Lane` traits and their integer impls |
//! | [`codec`] | Shift-and-mask packing of lanes into words |
//! | [`geometry`] | `Geometry` trait, `Dims`, packing ratios, stream lengths, accumulator bound |
//! | [`stream`] | `Beat`: one word plus its end-of-stream marker |
//! | [`presets`] | Ready-made geometries (`Mnist`, `Compact`, `Unit`) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod geometry;
pub mod presets;
pub mod stream;
pub mod word;

pub use codec::{ratio, Codec};
pub use geometry::{Dims, DimsError, Geometry, LaneSpec};
pub use stream::Beat;
pub use word::{Lane, Word};
