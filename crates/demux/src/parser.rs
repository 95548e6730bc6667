// Push-parser contract between the byte pipeline and the packetizer

use thiserror::Error;

/// Structural bitstream errors. The engine maps these to its Parse error
/// kind and stops the session; transient conditions (partial frames,
/// resyncable garbage) are absorbed by the parser instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("reserved sample-rate index {index} in frame header")]
    ReservedSampleRate { index: u8 },

    #[error("impossible frame length {length} in frame header")]
    BadFrameLength { length: usize },
}

/// Stream-format descriptor, reported once when it first becomes known.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: f64,
    pub channels: u16,
    /// Frames (samples per channel) in a packet when the format is
    /// constant-rate; per-packet overrides ride in the packet description.
    pub frames_per_packet: u32,
    /// Bit rate declared by the container, when it declares one
    pub declared_bit_rate: Option<u32>,
    /// Estimated upper bound on a single packet's size, used to validate
    /// playback-buffer capacity; `None` when the format has no bound.
    pub max_packet_size: Option<usize>,
}

impl StreamFormat {
    /// Seconds of audio per packet; 0.0 until the sample rate is known.
    pub fn packet_duration(&self) -> f64 {
        if self.sample_rate > 0.0 {
            f64::from(self.frames_per_packet) / self.sample_rate
        } else {
            0.0
        }
    }
}

/// One demuxed unit of compressed audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacket {
    pub payload: Vec<u8>,
    /// Variable frames in this packet (0 = use the format's constant rate)
    pub frames: u32,
}

/// Everything one `feed` call produced.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    /// Set on the call where the format first became known
    pub format: Option<StreamFormat>,
    pub packets: Vec<ParsedPacket>,
    /// Offset of the first audio byte in the stream (pre-roll metadata
    /// skipped), reported once
    pub data_offset: Option<u64>,
    /// Actual audio byte count when the container declares it (more
    /// accurate than assuming the whole file is audio)
    pub audio_data_byte_count: Option<u64>,
}

impl ParseOutput {
    pub fn is_empty(&self) -> bool {
        self.format.is_none() && self.packets.is_empty()
    }
}

/// Adapter over an external parsing capability.
///
/// Fed chunks of raw bytes in stream order; emits zero or more packets per
/// call. The caller sets `discontinuous` on the first feed after a
/// seek/reconnect gap so the parser does not treat the previous tail as
/// contiguous.
pub trait PacketParser: Send {
    fn feed(&mut self, data: &[u8], discontinuous: bool) -> Result<ParseOutput, ParseError>;
}
