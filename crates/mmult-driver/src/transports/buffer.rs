//! Byte-buffer transport
//!
//! A stream image is the concatenation of its words, each `W::BYTES` long,
//! little-endian. The end marker is not stored: the end of the image is the
//! end of the stream. `Bytes` makes the input image cheap to slice and share.

use crate::error::{EngineError, Result};
use crate::transport::{TransportType, WordSink, WordSource};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use mmult_chip::{Beat, Word};
use std::marker::PhantomData;

/// Reads little-endian words from a byte image
#[derive(Debug, Clone)]
pub struct BytesSource<W> {
    buf: Bytes,
    _word: PhantomData<W>,
}

impl<W: Word> BytesSource<W> {
    /// Create a source over `image`
    pub fn new(image: impl Into<Bytes>) -> Self {
        Self {
            buf: image.into(),
            _word: PhantomData,
        }
    }

    /// Whole words left in the image
    pub fn remaining_words(&self) -> usize {
        self.buf.remaining() / W::BYTES
    }
}

impl<W: Word> WordSource<W> for BytesSource<W> {
    fn pop(&mut self) -> Result<Option<W>> {
        if !self.buf.has_remaining() {
            return Ok(None);
        }
        if self.buf.remaining() < W::BYTES {
            return Err(EngineError::transfer_failed(format!(
                "trailing partial word: {} of {} bytes",
                self.buf.remaining(),
                W::BYTES
            )));
        }
        let bits = self.buf[..W::BYTES]
            .iter()
            .rev()
            .fold(0u128, |acc, &b| (acc << 8) | u128::from(b));
        self.buf.advance(W::BYTES);
        Ok(Some(W::from_bits(bits)))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Bytes
    }
}

/// Writes little-endian words into a growing byte image
#[derive(Debug, Default)]
pub struct BytesSink<W> {
    buf: BytesMut,
    words: usize,
    end_marked: bool,
    _word: PhantomData<W>,
}

impl<W: Word> BytesSink<W> {
    /// Create an empty sink with room for `words` words
    pub fn with_capacity(words: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(words * W::BYTES),
            words: 0,
            end_marked: false,
            _word: PhantomData,
        }
    }

    /// Words written so far
    pub const fn words(&self) -> usize {
        self.words
    }

    /// Whether the final beat carried the end marker
    pub const fn end_marked(&self) -> bool {
        self.end_marked
    }

    /// Finish the image
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

impl<W: Word> WordSink<W> for BytesSink<W> {
    #[allow(clippy::cast_possible_truncation)]
    fn push(&mut self, beat: Beat<W>) -> Result<()> {
        if self.end_marked {
            return Err(EngineError::transfer_failed("word pushed after end marker"));
        }
        let bits = beat.data.to_bits();
        for i in 0..W::BYTES {
            self.buf.put_u8((bits >> (8 * i)) as u8);
        }
        self.words += 1;
        self.end_marked = beat.last;
        Ok(())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Bytes
    }
}
