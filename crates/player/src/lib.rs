// Streaming playback engine: transport control over the byte ring, packet
// parser, buffer pool, and hardware sink.

mod config;
mod player;
mod progress;
mod sink;

pub use config::PlayerConfig;
pub use player::Player;
pub use progress::ProgressEstimator;
pub use sink::{AudioSink, SinkEvent, SinkEventHandler};

// Re-export the pieces callers wire a player together from.
pub use brook_bufpool::{PacketDesc, PoolConfig};
pub use brook_core::{Event, PlayerCallback, PlayerError, PlayerState, Result, StopReason};
pub use brook_demux::{AdtsParser, PacketParser, StreamFormat};
pub use brook_stream::{ByteStream, DataFilter, FileByteStream, HttpByteStream};

#[cfg(test)]
mod tests;
