//! Stream transport abstraction
//!
//! The engine sees its environment as two strictly ordered, single-producer
//! single-consumer word streams. Whatever moves the words (a bus, a file,
//! a socket, a channel between threads) implements [`WordSource`] and
//! [`WordSink`]. Transports never reorder or drop words; timeouts and
//! cancellation belong to them, not to the engine.

use crate::error::{EngineError, Result};
use mmult_chip::{Beat, Word};
use std::fmt::Debug;

/// Ordered source of input words
pub trait WordSource<W: Word> {
    /// Next word in stream order
    ///
    /// `Ok(None)` means the producer ended the stream.
    ///
    /// # Errors
    ///
    /// Returns error if the transport fails or times out.
    fn pop(&mut self) -> Result<Option<W>>;

    /// Transport type for logging
    fn transport_type(&self) -> TransportType;
}

/// Ordered sink for output beats
pub trait WordSink<W: Word> {
    /// Append one beat to the output stream
    ///
    /// # Errors
    ///
    /// Returns error if the transport fails.
    fn push(&mut self, beat: Beat<W>) -> Result<()>;

    /// Transport type for logging
    fn transport_type(&self) -> TransportType;
}

impl<W: Word, S: WordSource<W> + ?Sized> WordSource<W> for &mut S {
    fn pop(&mut self) -> Result<Option<W>> {
        (**self).pop()
    }

    fn transport_type(&self) -> TransportType {
        (**self).transport_type()
    }
}

impl<W: Word, S: WordSource<W> + ?Sized> WordSource<W> for Box<S> {
    fn pop(&mut self) -> Result<Option<W>> {
        (**self).pop()
    }

    fn transport_type(&self) -> TransportType {
        (**self).transport_type()
    }
}

impl<W: Word, K: WordSink<W> + ?Sized> WordSink<W> for &mut K {
    fn push(&mut self, beat: Beat<W>) -> Result<()> {
        (**self).push(beat)
    }

    fn transport_type(&self) -> TransportType {
        (**self).transport_type()
    }
}

impl<W: Word, K: WordSink<W> + ?Sized> WordSink<W> for Box<K> {
    fn push(&mut self, beat: Beat<W>) -> Result<()> {
        (**self).push(beat)
    }

    fn transport_type(&self) -> TransportType {
        (**self).transport_type()
    }
}

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// In-memory queue
    Memory,

    /// Bounded channel between threads
    Channel,

    /// Little-endian byte buffer (files)
    Bytes,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "Memory"),
            Self::Channel => write!(f, "Channel"),
            Self::Bytes => write!(f, "Bytes"),
        }
    }
}

/// Source wrapper that counts consumed words against the expected total.
///
/// A stream that ends early becomes [`EngineError::MalformedInput`] naming
/// the section being read. The engine never pulls past `expected`.
#[derive(Debug)]
pub struct Metered<S> {
    inner: S,
    consumed: usize,
    expected: usize,
}

impl<S> Metered<S> {
    /// Wrap `inner`, expecting exactly `expected` words.
    pub const fn new(inner: S, expected: usize) -> Self {
        Self {
            inner,
            consumed: 0,
            expected,
        }
    }

    /// Words consumed so far
    pub const fn consumed(&self) -> usize {
        self.consumed
    }

    /// Words the stream must deliver in total
    pub const fn expected(&self) -> usize {
        self.expected
    }

    /// Pull the next word for `section`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedInput`] if the stream ended, an
    /// invalid state error if the caller reads past the expected total, or
    /// the transport's own error.
    pub fn pull<W: Word>(&mut self, section: &'static str) -> Result<W>
    where
        S: WordSource<W>,
    {
        if self.consumed >= self.expected {
            return Err(EngineError::invalid_state(format!(
                "read past the {} expected input words in the {section}",
                self.expected
            )));
        }
        match self.inner.pop()? {
            Some(word) => {
                self.consumed += 1;
                Ok(word)
            }
            None => Err(EngineError::malformed_input(
                section,
                self.consumed,
                self.expected,
            )),
        }
    }
}
