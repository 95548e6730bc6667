// Byte-stream sources feeding the playback engine

mod file;
mod filter;
mod http;

pub use file::FileByteStream;
pub use filter::DataFilter;
pub use http::HttpByteStream;

use brook_core::Result;

/// A source of compressed audio bytes.
///
/// `read` blocks until bytes arrive and returns `Ok(0)` at end of stream.
/// `length` becomes `Some` once the source knows its total size (for HTTP
/// that is after the first successful read). `reconnect` restarts delivery
/// from an absolute byte offset (seek); the engine treats the resumed bytes
/// as discontinuous with whatever it read before.
pub trait ByteStream: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn length(&self) -> Option<u64>;

    fn reconnect(&mut self, offset: u64) -> Result<()>;
}
