// Error handling for the playback engine

use thiserror::Error;

/// Playback engine error types.
///
/// A session records at most one of these; once set, transport calls become
/// no-ops until a fresh session is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    /// The stream ended without producing any audio packets
    #[error("stream contained no audio data")]
    NoData,

    /// The hardware sink rejected a setup or buffer operation
    #[error("audio sink error: {0}")]
    Queue(String),

    /// The byte stream is structurally invalid
    #[error("bitstream parse error: {0}")]
    Parse(String),

    /// The source connection failed mid-stream
    #[error("network error: {0}")]
    Network(String),

    /// A local source could not be read
    #[error("file system error: {0}")]
    FileSystem(String),

    /// A single packet exceeds the capacity of an empty playback buffer
    #[error("packet of {packet} bytes exceeds buffer capacity of {capacity} bytes")]
    BufferTooSmall { packet: usize, capacity: usize },

    /// A transport call arrived in a state that cannot honor it
    #[error("invalid player state: {0}")]
    InvalidState(String),

    /// Generic error
    #[error("{0}")]
    Unknown(String),
}

/// Result type alias for playback operations
pub type Result<T> = std::result::Result<T, PlayerError>;
