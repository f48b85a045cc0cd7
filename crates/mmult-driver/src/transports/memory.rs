//! In-memory transport

use crate::error::Result;
use crate::transport::{TransportType, WordSink, WordSource};
use mmult_chip::{Beat, Word};
use std::collections::VecDeque;

/// Queue of words consumed front to back
#[derive(Debug, Clone, Default)]
pub struct MemorySource<W> {
    words: VecDeque<W>,
}

impl<W: Word> MemorySource<W> {
    /// Create a source delivering `words` in order
    pub fn new(words: impl IntoIterator<Item = W>) -> Self {
        Self {
            words: words.into_iter().collect(),
        }
    }

    /// Words not yet consumed
    pub fn remaining(&self) -> usize {
        self.words.len()
    }
}

impl<W: Word> From<Vec<W>> for MemorySource<W> {
    fn from(words: Vec<W>) -> Self {
        Self {
            words: words.into(),
        }
    }
}

impl<W: Word> WordSource<W> for MemorySource<W> {
    fn pop(&mut self) -> Result<Option<W>> {
        Ok(self.words.pop_front())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Memory
    }
}

/// Collects output beats in order
#[derive(Debug, Clone, Default)]
pub struct MemorySink<W> {
    beats: Vec<Beat<W>>,
}

impl<W: Word> MemorySink<W> {
    /// Create an empty sink
    pub fn new() -> Self {
        Self { beats: Vec::new() }
    }

    /// Create an empty sink with room for `capacity` beats
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            beats: Vec::with_capacity(capacity),
        }
    }

    /// Beats received so far
    pub fn beats(&self) -> &[Beat<W>] {
        &self.beats
    }

    /// Payloads received so far, markers dropped
    pub fn words(&self) -> Vec<W> {
        self.beats.iter().map(|b| b.data).collect()
    }

    /// Take the collected beats
    pub fn into_beats(self) -> Vec<Beat<W>> {
        self.beats
    }

    /// Forget everything received
    pub fn clear(&mut self) {
        self.beats.clear();
    }
}

impl<W: Word> WordSink<W> for MemorySink<W> {
    fn push(&mut self, beat: Beat<W>) -> Result<()> {
        self.beats.push(beat);
        Ok(())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Memory
    }
}
