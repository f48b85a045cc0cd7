//! Channel transport
//!
//! Connects the engine to producer and consumer threads through bounded
//! `std::sync::mpsc` channels. The bound gives natural back-pressure: a slow
//! consumer stalls the engine, a slow producer stalls it too. A receive
//! timeout turns an indefinite stall into [`EngineError::Timeout`].

use crate::error::{EngineError, Result};
use crate::transport::{TransportType, WordSink, WordSource};
use mmult_chip::{Beat, Word};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;
use tracing::warn;

/// Receiving end of an input word channel
#[derive(Debug)]
pub struct ChannelSource<W> {
    rx: Receiver<W>,
    timeout: Option<Duration>,
}

impl<W: Word> ChannelSource<W> {
    /// Wrap a receiver; blocks indefinitely by default
    pub fn new(rx: Receiver<W>) -> Self {
        Self { rx, timeout: None }
    }

    /// Fail with a timeout error if no word arrives within `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<W: Word> WordSource<W> for ChannelSource<W> {
    fn pop(&mut self) -> Result<Option<W>> {
        match self.timeout {
            None => Ok(self.rx.recv().ok()),
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(word) => Ok(Some(word)),
                Err(RecvTimeoutError::Disconnected) => Ok(None),
                Err(RecvTimeoutError::Timeout) => {
                    let duration_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                    warn!("Input stream stalled for {duration_ms}ms");
                    Err(EngineError::Timeout { duration_ms })
                }
            },
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Channel
    }
}

/// Sending end of an output beat channel
#[derive(Debug, Clone)]
pub struct ChannelSink<W> {
    tx: SyncSender<Beat<W>>,
}

impl<W: Word> ChannelSink<W> {
    /// Wrap a sender
    pub fn new(tx: SyncSender<Beat<W>>) -> Self {
        Self { tx }
    }
}

impl<W: Word> WordSink<W> for ChannelSink<W> {
    fn push(&mut self, beat: Beat<W>) -> Result<()> {
        self.tx
            .send(beat)
            .map_err(|_| EngineError::transfer_failed("output consumer hung up"))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Channel
    }
}

/// Bounded input channel: the producer sends words, the engine pops them.
///
/// Dropping the sender ends the stream.
pub fn channel_source<W: Word>(capacity: usize) -> (SyncSender<W>, ChannelSource<W>) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (tx, ChannelSource::new(rx))
}

/// Bounded output channel: the engine pushes beats, the consumer receives them.
pub fn channel_sink<W: Word>(capacity: usize) -> (ChannelSink<W>, Receiver<Beat<W>>) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (ChannelSink::new(tx), rx)
}
