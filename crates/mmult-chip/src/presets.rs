//! Ready-made geometries.
//!
//! | Preset | BATCH | FEAT | CLASSES | TILING | Word | In | W | Out |
//! |--------|-------|------|---------|--------|------|----|---|-----|
//! | [`Mnist`] | 8192 | 256 | 10 | 128 | u64 | u8 | i8 | i32 |
//! | [`Compact`] | 64 | 32 | 4 | 16 | u64 | i8 | i8 | i32 |
//! | [`Unit`] | 2 | 4 | 2 | 1 | u32 | i8 | i8 | i32 |
//!
//! `Mnist` is the configuration the accelerator was synthesised with:
//! 16×16 downsampled digits, unsigned 8-bit pixels, ten classes.

use crate::geometry::Geometry;

/// Reference kernel configuration (MNIST linear classifier).
#[derive(Debug, Clone, Copy, Default)]
pub struct Mnist;

impl Geometry for Mnist {
    const NAME: &'static str = "mnist";
    const BATCH: usize = 8192;
    const FEAT: usize = 256;
    const CLASSES: usize = 10;
    const TILING: usize = 128;

    type Word = u64;
    type Input = u8;
    type Weight = i8;
    type Output = i32;
}

/// Small signed geometry, fast enough for tests and self-checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compact;

impl Geometry for Compact {
    const NAME: &'static str = "compact";
    const BATCH: usize = 64;
    const FEAT: usize = 32;
    const CLASSES: usize = 4;
    const TILING: usize = 16;

    type Word = u64;
    type Input = i8;
    type Weight = i8;
    type Output = i32;
}

/// Minimal geometry: two rows, two classes, four features, one row per tile.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unit;

impl Geometry for Unit {
    const NAME: &'static str = "unit";
    const BATCH: usize = 2;
    const FEAT: usize = 4;
    const CLASSES: usize = 2;
    const TILING: usize = 1;

    type Word = u32;
    type Input = i8;
    type Weight = i8;
    type Output = i32;
}
