// Bit-rate, duration, and playback-position estimation

use brook_demux::StreamFormat;

/// Packets sampled for the bit-rate estimate before it is frozen. Early
/// packets swing the average; past this many the estimate is stable and
/// further accounting is pointless.
const BIT_RATE_ESTIMATION_MAX_PACKETS: u64 = 5120;

/// Derives bit rate, total duration, and playback position from what the
/// parser has reported so far.
///
/// Bit rate is the mean over processed packets
/// (`size_total * 8 / (count * packet_duration)`), falling back to the
/// declared rate until packets exist. Duration divides the audio byte span
/// by that rate, so it refines as more packets arrive. Position is the
/// sink's consumed-frame count converted to seconds, offset by the time base
/// established at the last seek.
#[derive(Debug)]
pub struct ProgressEstimator {
    sample_rate: f64,
    packet_duration: f64,
    declared_bit_rate: Option<u32>,
    processed_packets_count: u64,
    processed_packets_size_total: u64,
    data_offset: u64,
    /// Total stream length in bytes; 0 while unknown
    file_length: u64,
    audio_data_byte_count: Option<u64>,
    /// Stream time at which the sink's frame counter last restarted
    seek_time: f64,
    /// Seek staged while paused, applied on the next play()
    pending_seek: Option<f64>,
    last_progress: f64,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self {
            sample_rate: 0.0,
            packet_duration: 0.0,
            declared_bit_rate: None,
            processed_packets_count: 0,
            processed_packets_size_total: 0,
            data_offset: 0,
            file_length: 0,
            audio_data_byte_count: None,
            seek_time: 0.0,
            pending_seek: None,
            last_progress: 0.0,
        }
    }

    pub fn on_format(&mut self, format: &StreamFormat) {
        self.sample_rate = format.sample_rate;
        self.packet_duration = format.packet_duration();
        self.declared_bit_rate = format.declared_bit_rate;
    }

    /// Account one parsed packet.
    pub fn on_packet(&mut self, byte_size: usize) {
        if self.processed_packets_count >= BIT_RATE_ESTIMATION_MAX_PACKETS {
            return;
        }
        self.processed_packets_count += 1;
        self.processed_packets_size_total += byte_size as u64;
    }

    pub fn processed_packets(&self) -> u64 {
        self.processed_packets_count
    }

    pub fn set_data_offset(&mut self, offset: u64) {
        self.data_offset = offset;
    }

    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    pub fn set_file_length(&mut self, length: u64) {
        self.file_length = length;
    }

    pub fn file_length(&self) -> u64 {
        self.file_length
    }

    pub fn set_audio_data_byte_count(&mut self, count: u64) {
        self.audio_data_byte_count = Some(count);
    }

    /// Mean bit rate over processed packets, in bits per second. Falls back
    /// to the container-declared rate, then 0.0 when nothing is known.
    pub fn calculated_bit_rate(&self) -> f64 {
        if self.packet_duration > 0.0 && self.processed_packets_count > 0 {
            return (self.processed_packets_size_total * 8) as f64
                / (self.processed_packets_count as f64 * self.packet_duration);
        }
        self.declared_bit_rate.map(f64::from).unwrap_or(0.0)
    }

    /// Estimated total duration in seconds; 0.0 while length or rate is
    /// unknown.
    pub fn duration(&self) -> f64 {
        let rate = self.calculated_bit_rate();
        if rate <= 0.0 || self.file_length <= self.data_offset {
            return 0.0;
        }
        let audio_bytes = self
            .audio_data_byte_count
            .unwrap_or(self.file_length - self.data_offset);
        audio_bytes as f64 * 8.0 / rate
    }

    /// Convert the sink's consumed-frame count into a stream position and
    /// remember it as the latest progress.
    pub fn note_progress(&mut self, consumed_frames: u64) -> f64 {
        if self.sample_rate > 0.0 {
            let t = self.seek_time + consumed_frames as f64 / self.sample_rate;
            self.last_progress = t.max(0.0);
        }
        self.last_progress
    }

    pub fn last_progress(&self) -> f64 {
        self.last_progress
    }

    /// Seconds of audio represented by `bytes` of undecoded data.
    pub fn buffered_seconds(&self, bytes: u64) -> f64 {
        let rate = self.calculated_bit_rate();
        if rate <= 0.0 {
            return 0.0;
        }
        bytes as f64 * 8.0 / rate
    }

    pub fn set_pending_seek(&mut self, target: f64) {
        self.pending_seek = Some(target);
        self.last_progress = target;
    }

    pub fn pending_seek(&self) -> Option<f64> {
        self.pending_seek
    }

    pub fn take_pending_seek(&mut self) -> Option<f64> {
        self.pending_seek.take()
    }

    /// Re-base the position clock at `time`; the sink's frame counter is
    /// about to restart from zero.
    pub fn begin_seek(&mut self, time: f64) {
        self.seek_time = time;
        self.last_progress = time;
        self.pending_seek = None;
    }

    /// Map a target time to the byte offset to reconnect at.
    ///
    /// The offset is proportional within the audio span, snapped down to a
    /// packet boundary, and clamped to leave two buffers of data before the
    /// tail. Returns the offset and the packet-aligned time, or `None` when
    /// duration is still unknown (seeking is not possible yet).
    pub fn seek_byte_offset(&self, target: f64, buffer_size: usize) -> Option<(u64, f64)> {
        let duration = self.duration();
        if duration <= 0.0 || self.file_length <= self.data_offset {
            return None;
        }
        let target = target.clamp(0.0, duration);

        let mut aligned = target;
        if self.packet_duration > 0.0 {
            // Land on a packet boundary so the parser resynchronizes cleanly
            // and the rebased position matches what actually plays.
            aligned = (target / self.packet_duration).floor() * self.packet_duration;
        }

        let span = (self.file_length - self.data_offset) as f64;
        let mut offset = self.data_offset + ((aligned / duration) * span) as u64;

        let margin = 2 * buffer_size as u64;
        if self.file_length > margin {
            offset = offset.min(self.file_length - margin);
        }
        Some((offset, aligned))
    }
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new()
    }
}
