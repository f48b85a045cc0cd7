//! Stream framing.
//!
//! A [`Beat`] is one transfer word plus the end-of-stream marker (`TLAST` on
//! the reference kernel). The marker travels alongside the payload and is
//! never encoded into it. Byte strobes, keep bits, IDs and destinations of the
//! AXI-Stream bus are constant and carry no information, so they are not
//! modelled.

/// One word of an ordered stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Beat<W> {
    /// Payload.
    pub data: W,
    /// Set on the final word of a logical sequence only.
    pub last: bool,
}

impl<W> Beat<W> {
    /// A beat in the middle of a sequence.
    #[must_use]
    pub const fn new(data: W) -> Self {
        Self { data, last: false }
    }

    /// The final beat of a sequence.
    #[must_use]
    pub const fn end(data: W) -> Self {
        Self { data, last: true }
    }

    /// Beat carrying `data`, marked final when `last` is set.
    #[must_use]
    pub const fn with_last(data: W, last: bool) -> Self {
        Self { data, last }
    }
}
