// ADTS (AAC transport) frame splitter
//
// Header-level demuxing only: frames are located and described, never
// decoded. Tolerates partial feeds, garbage between frames (resync), and
// an ID3v2 tag ahead of the first frame.

use crate::parser::{PacketParser, ParseError, ParseOutput, ParsedPacket, StreamFormat};

/// Sample rates by ADTS sampling_frequency_index; indices 13+ are reserved.
const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Samples per channel in one raw AAC data block.
const FRAMES_PER_BLOCK: u32 = 1024;

/// Incremental ADTS frame parser.
pub struct AdtsParser {
    /// Carry-over bytes that did not yet form a complete frame
    pending: Vec<u8>,
    /// Bytes still to discard from an ID3v2 tag spanning feeds
    skip_remaining: usize,
    /// Bytes discarded ahead of the first frame (tag + garbage)
    preroll: u64,
    /// First frame seen; pre-roll accounting stops here
    started: bool,
    format_reported: bool,
}

impl AdtsParser {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            skip_remaining: 0,
            preroll: 0,
            started: false,
            format_reported: false,
        }
    }

    fn header_len(buf: &[u8]) -> usize {
        // protection_absent == 0 means a 2-byte CRC follows the header
        if buf[1] & 0x01 == 0 {
            9
        } else {
            7
        }
    }

    fn is_sync(buf: &[u8]) -> bool {
        // 12-bit syncword plus layer == 00
        buf[0] == 0xFF && (buf[1] & 0xF6) == 0xF0
    }

    fn frame_length(buf: &[u8]) -> usize {
        (usize::from(buf[3] & 0x03) << 11) | (usize::from(buf[4]) << 3) | (usize::from(buf[5]) >> 5)
    }

    /// Consume an ID3v2 tag header if the stream starts with one.
    fn begin_id3_skip(&mut self) -> bool {
        if self.started || self.pending.len() < 10 || &self.pending[..3] != b"ID3" {
            return false;
        }
        // Syncsafe 28-bit tag size, excluding the 10-byte header
        let size = (usize::from(self.pending[6] & 0x7F) << 21)
            | (usize::from(self.pending[7] & 0x7F) << 14)
            | (usize::from(self.pending[8] & 0x7F) << 7)
            | usize::from(self.pending[9] & 0x7F);
        self.skip_remaining = size + 10;
        log::debug!("skipping {} byte ID3v2 tag", self.skip_remaining);
        true
    }
}

impl Default for AdtsParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketParser for AdtsParser {
    fn feed(&mut self, data: &[u8], discontinuous: bool) -> Result<ParseOutput, ParseError> {
        if discontinuous {
            self.pending.clear();
            self.skip_remaining = 0;
        }
        self.pending.extend_from_slice(data);

        let mut out = ParseOutput::default();

        // Too short to tell whether an ID3v2 tag starts the stream; wait.
        if !self.started && self.skip_remaining == 0 && self.pending.len() < 10 {
            let n = self.pending.len().min(3);
            if self.pending[..n] == b"ID3"[..n] && !self.pending.is_empty() {
                return Ok(out);
            }
        }

        let mut pos = 0usize;

        loop {
            // Discard tag bytes, possibly across several feeds.
            if self.skip_remaining > 0 {
                let n = self.skip_remaining.min(self.pending.len() - pos);
                pos += n;
                self.skip_remaining -= n;
                if !self.started {
                    self.preroll += n as u64;
                }
                if self.skip_remaining > 0 {
                    break;
                }
            }

            if self.skip_remaining == 0 && pos == 0 && self.begin_id3_skip() {
                continue;
            }

            // Scan to the next syncword.
            let start = pos;
            while pos + 2 <= self.pending.len() && !Self::is_sync(&self.pending[pos..]) {
                pos += 1;
            }
            if pos > start {
                if self.started {
                    log::warn!("resync: discarded {} bytes between frames", pos - start);
                } else {
                    self.preroll += (pos - start) as u64;
                }
            }
            if pos + 2 > self.pending.len() {
                // A trailing 0xFF may be the start of the next sync.
                if pos < self.pending.len() && self.pending[pos] != 0xFF {
                    if !self.started {
                        self.preroll += 1;
                    }
                    pos += 1;
                }
                break;
            }

            let header = &self.pending[pos..];
            if header.len() < 7 {
                break;
            }

            let sfi = (header[2] >> 2) & 0x0F;
            if usize::from(sfi) >= SAMPLE_RATES.len() {
                return Err(ParseError::ReservedSampleRate { index: sfi });
            }

            let frame_len = Self::frame_length(header);
            let header_len = Self::header_len(header);
            if frame_len <= header_len {
                return Err(ParseError::BadFrameLength { length: frame_len });
            }
            if header.len() < frame_len {
                // Partial frame; wait for more bytes.
                break;
            }

            if !self.format_reported {
                let channels =
                    u16::from(((header[2] & 0x01) << 2) | (header[3] >> 6));
                out.format = Some(StreamFormat {
                    sample_rate: f64::from(SAMPLE_RATES[usize::from(sfi)]),
                    channels,
                    frames_per_packet: FRAMES_PER_BLOCK,
                    declared_bit_rate: None,
                    max_packet_size: None,
                });
                out.data_offset = Some(self.preroll);
                self.format_reported = true;
            }
            self.started = true;

            let raw_blocks = u32::from(header[6] & 0x03) + 1;
            out.packets.push(ParsedPacket {
                payload: self.pending[pos..pos + frame_len].to_vec(),
                frames: FRAMES_PER_BLOCK * raw_blocks,
            });
            pos += frame_len;
        }

        self.pending.drain(..pos);
        Ok(out)
    }
}
