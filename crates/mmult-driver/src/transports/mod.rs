//! Stream transport implementations
//!
//! Three transports available:
//! - **Memory**: `VecDeque`-backed queue (tests, host-side tooling)
//! - **Channel**: bounded `std::sync::mpsc` channel with optional receive timeout
//! - **Bytes**: little-endian word images backed by `bytes` buffers (files)

pub mod buffer;
pub mod channel;
pub mod memory;

pub use buffer::{BytesSink, BytesSource};
pub use channel::{channel_sink, channel_source, ChannelSink, ChannelSource};
pub use memory::{MemorySink, MemorySource};
