// Hardware sink boundary

use brook_bufpool::PacketDesc;
use brook_core::Result;
use brook_demux::StreamFormat;
use std::sync::Arc;

/// Asynchronous notifications from the sink back to the engine. Handlers
/// are invoked from the sink's own context and must not block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// The sink confirmed it is producing audio
    Started,
    /// Buffer `index` finished playing and its pool slot can be reused.
    /// Also fired for discarded buffers on an immediate stop.
    BufferCompleted { index: usize },
    /// The sink stopped producing audio
    Stopped,
}

pub type SinkEventHandler = Arc<dyn Fn(SinkEvent) + Send + Sync>;

/// Abstraction over the platform audio output.
///
/// The engine enqueues filled buffers by pool index; the sink plays them in
/// submission order and reports each one back through the event handler as
/// it finishes. Implementations translate errors into
/// `PlayerError::Queue`.
pub trait AudioSink: Send {
    /// Apply the stream format before the first enqueue.
    fn configure(&mut self, format: &StreamFormat) -> Result<()>;

    fn set_event_handler(&mut self, handler: SinkEventHandler);

    /// Hand a filled buffer to the hardware queue. The buffer stays owned
    /// by the pool slot `index` until its completion event fires.
    fn enqueue(&mut self, index: usize, data: &[u8], descs: &[PacketDesc]) -> Result<()>;

    /// Begin producing audio. Fires [`SinkEvent::Started`] once running.
    fn start(&mut self) -> Result<()>;

    /// Halt output, keeping queued buffers for [`resume`](Self::resume).
    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Stop producing audio. With `immediate`, queued buffers are discarded
    /// but their completion events still fire; otherwise queued audio drains
    /// first.
    fn stop(&mut self, immediate: bool) -> Result<()>;

    /// Frames consumed since the sink last started from empty.
    fn consumed_frames(&self) -> Result<u64>;
}
