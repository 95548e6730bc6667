// End-to-end engine tests over a scripted source, a fixed-size packet
// parser, and a mock sink driven by the test thread.

use crate::config::PlayerConfig;
use crate::player::Player;
use crate::sink::{AudioSink, SinkEvent, SinkEventHandler};
use brook_bufpool::{PacketDesc, PoolConfig};
use brook_core::{Event, PlayerCallback, PlayerError, PlayerState, Result, StopReason};
use brook_demux::{PacketParser, ParseError, ParseOutput, ParsedPacket, StreamFormat};
use brook_stream::ByteStream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------- source

struct StreamInner {
    data: Vec<u8>,
    pos: usize,
    /// When true the stream blocks at the tail instead of reporting EOF
    open: bool,
    length_known: bool,
    reconnects: Vec<u64>,
}

/// Scripted byte source shared between the test and the player.
#[derive(Clone)]
struct ScriptedStream {
    inner: Arc<Mutex<StreamInner>>,
}

impl ScriptedStream {
    /// A fully preloaded stream that reports EOF after `data`.
    fn preloaded(data: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StreamInner {
                data,
                pos: 0,
                open: false,
                length_known: true,
                reconnects: Vec::new(),
            })),
        }
    }

    /// A live stream of unknown length; bytes arrive via `push` and EOF
    /// via `close`.
    fn live(initial: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StreamInner {
                data: initial,
                pos: 0,
                open: true,
                length_known: false,
                reconnects: Vec::new(),
            })),
        }
    }

    fn push(&self, bytes: &[u8]) {
        self.inner.lock().data.extend_from_slice(bytes);
    }

    fn close(&self) {
        self.inner.lock().open = false;
    }

    fn reconnects(&self) -> Vec<u64> {
        self.inner.lock().reconnects.clone()
    }

    /// Bytes the player has pulled from the source so far.
    fn position(&self) -> usize {
        self.inner.lock().pos
    }
}

impl ByteStream for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.pos < inner.data.len() {
                    let n = buf.len().min(inner.data.len() - inner.pos);
                    let pos = inner.pos;
                    buf[..n].copy_from_slice(&inner.data[pos..pos + n]);
                    inner.pos += n;
                    return Ok(n);
                }
                if !inner.open {
                    return Ok(0);
                }
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn length(&self) -> Option<u64> {
        let inner = self.inner.lock();
        if inner.length_known {
            Some(inner.data.len() as u64)
        } else {
            None
        }
    }

    fn reconnect(&mut self, offset: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.reconnects.push(offset);
        inner.pos = offset as usize;
        Ok(())
    }
}

struct FailingStream;

impl ByteStream for FailingStream {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(PlayerError::Network("connection reset".to_string()))
    }

    fn length(&self) -> Option<u64> {
        None
    }

    fn reconnect(&mut self, _offset: u64) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------- parser

/// Chops the byte stream into fixed-size packets. 8192 Hz at 1024 frames
/// per packet gives an exact 0.125s packet duration, so 256-byte packets
/// make the stream exactly 2048 bytes per second.
struct FixedParser {
    packet_size: usize,
    pending: Vec<u8>,
    emitted: usize,
    fail_at: Option<usize>,
    max_packet_size: Option<usize>,
    format_sent: bool,
}

impl FixedParser {
    fn new(packet_size: usize) -> Self {
        Self {
            packet_size,
            pending: Vec::new(),
            emitted: 0,
            fail_at: None,
            max_packet_size: None,
            format_sent: false,
        }
    }

    fn format() -> StreamFormat {
        StreamFormat {
            sample_rate: 8192.0,
            channels: 2,
            frames_per_packet: 1024,
            declared_bit_rate: None,
            max_packet_size: None,
        }
    }
}

impl PacketParser for FixedParser {
    fn feed(&mut self, data: &[u8], discontinuous: bool) -> std::result::Result<ParseOutput, ParseError> {
        if discontinuous {
            self.pending.clear();
        }
        self.pending.extend_from_slice(data);

        let mut out = ParseOutput::default();
        if !self.format_sent {
            let mut format = Self::format();
            format.max_packet_size = self.max_packet_size;
            out.format = Some(format);
            out.data_offset = Some(0);
            self.format_sent = true;
        }
        while self.pending.len() >= self.packet_size {
            self.emitted += 1;
            if self.fail_at == Some(self.emitted) {
                return Err(ParseError::BadFrameLength { length: 0 });
            }
            let payload: Vec<u8> = self.pending.drain(..self.packet_size).collect();
            out.packets.push(ParsedPacket {
                payload,
                frames: 1024,
            });
        }
        Ok(out)
    }
}

// ------------------------------------------------------------------ sink

struct QueuedBuffer {
    index: usize,
    data: Vec<u8>,
    frames: u64,
}

struct MockSinkInner {
    handler: Option<SinkEventHandler>,
    queued: VecDeque<QueuedBuffer>,
    /// Bytes of every buffer that actually played out, in order
    played: Vec<u8>,
    consumed_frames: u64,
    started: usize,
    paused: bool,
    format: Option<StreamFormat>,
}

/// Hand-driven sink: the test thread plays the role of the hardware by
/// calling `complete_oldest`.
#[derive(Clone)]
struct MockSink {
    inner: Arc<Mutex<MockSinkInner>>,
}

impl MockSink {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockSinkInner {
                handler: None,
                queued: VecDeque::new(),
                played: Vec::new(),
                consumed_frames: 0,
                started: 0,
                paused: false,
                format: None,
            })),
        }
    }

    fn fire(&self, event: SinkEvent) {
        let handler = self.inner.lock().handler.clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    /// Play out the oldest queued buffer. Returns false when idle.
    fn complete_oldest(&self) -> bool {
        let index = {
            let mut inner = self.inner.lock();
            if inner.paused {
                return false;
            }
            match inner.queued.pop_front() {
                Some(buffer) => {
                    inner.played.extend_from_slice(&buffer.data);
                    inner.consumed_frames += buffer.frames;
                    buffer.index
                }
                None => return false,
            }
        };
        self.fire(SinkEvent::BufferCompleted { index });
        true
    }

    fn played(&self) -> Vec<u8> {
        self.inner.lock().played.clone()
    }

    fn started_count(&self) -> usize {
        self.inner.lock().started
    }

    fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    fn queued_count(&self) -> usize {
        self.inner.lock().queued.len()
    }
}

impl AudioSink for MockSink {
    fn configure(&mut self, format: &StreamFormat) -> Result<()> {
        self.inner.lock().format = Some(format.clone());
        Ok(())
    }

    fn set_event_handler(&mut self, handler: SinkEventHandler) {
        self.inner.lock().handler = Some(handler);
    }

    fn enqueue(&mut self, index: usize, data: &[u8], descs: &[PacketDesc]) -> Result<()> {
        let mut inner = self.inner.lock();
        let constant = inner
            .format
            .as_ref()
            .map(|f| u64::from(f.frames_per_packet))
            .unwrap_or(0);
        let frames = descs
            .iter()
            .map(|d| {
                if d.frames > 0 {
                    u64::from(d.frames)
                } else {
                    constant
                }
            })
            .sum();
        inner.queued.push_back(QueuedBuffer {
            index,
            data: data.to_vec(),
            frames,
        });
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            inner.started += 1;
            inner.paused = false;
        }
        self.fire(SinkEvent::Started);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.inner.lock().paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.inner.lock().paused = false;
        Ok(())
    }

    fn stop(&mut self, immediate: bool) -> Result<()> {
        let discarded: Vec<usize> = {
            let mut inner = self.inner.lock();
            inner.paused = false;
            inner.consumed_frames = 0;
            if immediate {
                inner.queued.drain(..).map(|b| b.index).collect()
            } else {
                Vec::new()
            }
        };
        for index in discarded {
            self.fire(SinkEvent::BufferCompleted { index });
        }
        self.fire(SinkEvent::Stopped);
        Ok(())
    }

    fn consumed_frames(&self) -> Result<u64> {
        Ok(self.inner.lock().consumed_frames)
    }
}

// -------------------------------------------------------------- observer

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn count(&self, matcher: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| matcher(e)).count()
    }
}

impl PlayerCallback for Recorder {
    fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

// --------------------------------------------------------------- harness

fn test_config(buffer_count: usize, buffer_size: usize) -> PlayerConfig {
    PlayerConfig {
        pool: PoolConfig {
            buffer_count,
            buffer_size,
            max_packet_descs: 64,
        },
        ..PlayerConfig::default()
    }
}

fn build_player(
    stream: &ScriptedStream,
    parser: FixedParser,
    sink: &MockSink,
    config: PlayerConfig,
) -> (Player, Arc<Recorder>) {
    let player = Player::new(
        Box::new(stream.clone()),
        Box::new(parser),
        Box::new(sink.clone()),
        config,
    );
    let recorder = Arc::new(Recorder::default());
    player.add_callback(recorder.clone());
    (player, recorder)
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("timed out waiting for {}", what);
}

/// Play the hardware role until the session ends.
fn drive_to_finish(player: &Player, sink: &MockSink) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        sink.complete_oldest();
        if player.did_finish() || player.did_fail() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("playback did not finish in time");
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ----------------------------------------------------------------- tests

#[test]
fn plays_preloaded_stream_to_the_end() {
    // 33 packets of 256 bytes: 8 full 1024-byte buffers plus one partial.
    let data = pattern(8448);
    let stream = ScriptedStream::preloaded(data.clone());
    let sink = MockSink::new();
    let (player, recorder) =
        build_player(&stream, FixedParser::new(256), &sink, test_config(4, 1024));

    player.start().unwrap();
    wait_until("sink start", || sink.started_count() > 0);
    drive_to_finish(&player, &sink);

    assert!(player.did_finish());
    assert_eq!(player.state(), PlayerState::Stopped);
    assert_eq!(player.stop_reason(), StopReason::EndOfStream);
    assert_eq!(player.error(), None);
    assert_eq!(sink.played(), data);
    assert_eq!(
        recorder.count(|e| matches!(e, Event::FinishedPlaying { reached_end: true })),
        1
    );
    assert_eq!(recorder.count(|e| matches!(e, Event::WillFinishPlaying)), 1);
    assert_eq!(recorder.count(|e| matches!(e, Event::PlaybackBegan)), 1);
}

#[test]
fn short_stream_starts_below_threshold() {
    // Two packets never reach the pipeline-depth threshold; EOF must start
    // the sink anyway.
    let data = pattern(512);
    let stream = ScriptedStream::preloaded(data.clone());
    let sink = MockSink::new();
    let (player, recorder) =
        build_player(&stream, FixedParser::new(256), &sink, test_config(4, 1024));

    player.start().unwrap();
    drive_to_finish(&player, &sink);

    assert!(player.did_finish());
    assert_eq!(sink.played(), data);
    assert_eq!(
        recorder.count(|e| matches!(e, Event::FinishedPlaying { reached_end: true })),
        1
    );
}

#[test]
fn user_stop_reports_not_reached_end() {
    let stream = ScriptedStream::live(pattern(4096));
    let sink = MockSink::new();
    let (player, recorder) =
        build_player(&stream, FixedParser::new(256), &sink, test_config(3, 1024));

    player.start().unwrap();
    wait_until("playback", || player.is_playing());
    player.stop();

    assert_eq!(player.state(), PlayerState::Stopped);
    assert_eq!(player.stop_reason(), StopReason::UserAction);
    assert_eq!(player.error(), None);
    assert!(!player.did_fail());
    assert_eq!(
        recorder.count(|e| matches!(e, Event::FinishedPlaying { reached_end: false })),
        1
    );
    stream.close();
}

#[test]
fn underrun_buffers_instead_of_stopping() {
    // 9 packets: two full buffers submitted, one packet left in the fill
    // target. Draining the sink before EOF must buffer, not stop.
    let stream = ScriptedStream::live(pattern(2304));
    let sink = MockSink::new();
    let (player, recorder) =
        build_player(&stream, FixedParser::new(256), &sink, test_config(3, 1024));

    player.start().unwrap();
    wait_until("playback", || player.is_playing());

    while sink.complete_oldest() {}
    wait_until("underrun", || player.is_buffering());
    assert_eq!(player.state(), PlayerState::Buffering);
    assert_eq!(recorder.count(|e| matches!(e, Event::BufferingStarted)), 1);

    // Refill past the threshold and run out the stream.
    stream.push(&pattern(2304)[..2048]);
    stream.close();
    wait_until("recovery", || player.is_playing());
    assert_eq!(recorder.count(|e| matches!(e, Event::BufferingFinished)), 1);

    drive_to_finish(&player, &sink);
    assert!(player.did_finish());
}

#[test]
fn pause_and_resume_are_byte_exact() {
    let first = pattern(4096);
    let second: Vec<u8> = pattern(8192)[4096..].to_vec();
    let stream = ScriptedStream::live(first.clone());
    let sink = MockSink::new();
    let (player, recorder) =
        build_player(&stream, FixedParser::new(256), &sink, test_config(3, 1024));

    player.start().unwrap();
    wait_until("playback", || player.is_playing());

    player.pause();
    assert!(player.is_paused());
    assert!(sink.is_paused());
    assert_eq!(
        recorder.count(|e| matches!(e, Event::PlayStatusChanged { paused: true })),
        1
    );

    stream.push(&second);
    stream.close();
    player.play();
    assert!(!player.is_paused());

    drive_to_finish(&player, &sink);
    assert!(player.did_finish());
    let mut expected = first;
    expected.extend_from_slice(&second);
    assert_eq!(sink.played(), expected);
}

#[test]
fn empty_stream_surfaces_no_data() {
    let stream = ScriptedStream::preloaded(Vec::new());
    let sink = MockSink::new();
    let (player, recorder) =
        build_player(&stream, FixedParser::new(256), &sink, test_config(3, 1024));

    player.start().unwrap();
    wait_until("failure", || player.did_fail());

    assert_eq!(player.state(), PlayerState::Stopped);
    assert_eq!(player.stop_reason(), StopReason::EndOfStream);
    assert_eq!(player.error(), Some(PlayerError::NoData));
    assert_eq!(sink.started_count(), 0);
    assert_eq!(
        recorder.count(|e| matches!(
            e,
            Event::Failed {
                error: PlayerError::NoData
            }
        )),
        1
    );
    assert_eq!(
        recorder.count(|e| matches!(e, Event::FinishedPlaying { reached_end: false })),
        1
    );
}

#[test]
fn parse_error_fails_exactly_once() {
    let stream = ScriptedStream::preloaded(pattern(8448));
    let sink = MockSink::new();
    let mut parser = FixedParser::new(256);
    parser.fail_at = Some(5);
    let (player, recorder) = build_player(&stream, parser, &sink, test_config(4, 1024));

    player.start().unwrap();
    wait_until("failure", || player.did_fail());

    assert_eq!(player.state(), PlayerState::Stopped);
    assert_eq!(player.stop_reason(), StopReason::Error);
    assert!(matches!(player.error(), Some(PlayerError::Parse(_))));
    assert_eq!(recorder.count(|e| matches!(e, Event::Failed { .. })), 1);
    assert_eq!(
        recorder.count(|e| matches!(e, Event::FinishedPlaying { .. })),
        1
    );

    // Transport calls are no-ops after a failure.
    player.play();
    player.pause();
    player.stop();
    assert_eq!(player.state(), PlayerState::Stopped);
    assert_eq!(player.stop_reason(), StopReason::Error);
    assert_eq!(recorder.count(|e| matches!(e, Event::Failed { .. })), 1);
}

#[test]
fn source_error_fails_the_session() {
    let player = Player::new(
        Box::new(FailingStream),
        Box::new(FixedParser::new(256)),
        Box::new(MockSink::new()),
        test_config(3, 1024),
    );
    player.start().unwrap();
    wait_until("failure", || player.did_fail());
    assert!(matches!(player.error(), Some(PlayerError::Network(_))));
}

#[test]
fn oversized_packet_bound_fails_fast() {
    let stream = ScriptedStream::preloaded(pattern(4096));
    let sink = MockSink::new();
    let mut parser = FixedParser::new(256);
    parser.max_packet_size = Some(4096);
    let (player, _) = build_player(&stream, parser, &sink, test_config(3, 1024));

    player.start().unwrap();
    wait_until("failure", || player.did_fail());
    assert_eq!(
        player.error(),
        Some(PlayerError::BufferTooSmall {
            packet: 4096,
            capacity: 1024
        })
    );
    assert_eq!(sink.started_count(), 0);
}

#[test]
fn bit_rate_duration_and_position_estimates() {
    // 256-byte packets every 0.125s: 16384 bits per second, so an
    // 8192-byte file is exactly 4 seconds long.
    let data = pattern(8192);
    let stream = ScriptedStream::preloaded(data);
    let sink = MockSink::new();
    let (player, _) = build_player(&stream, FixedParser::new(256), &sink, test_config(4, 1024));

    player.start().unwrap();
    wait_until("playback", || player.is_playing());

    assert!((player.calculated_bit_rate() - 16384.0).abs() < 1e-6);
    assert!((player.duration() - 4.0).abs() < 1e-6);
    assert!(player.buffered_seconds() > 0.0);

    // Play out one buffer (4 packets of 1024 frames at 8192 Hz): half a
    // second consumed.
    sink.complete_oldest();
    assert!((player.position() - 0.5).abs() < 1e-6);

    drive_to_finish(&player, &sink);
    assert!(player.did_finish());
}

#[test]
fn seek_while_playing_reconnects_at_mapped_offset() {
    // 16384 bytes at 2048 bytes/s: 8 seconds. Seeking to 4s lands on byte
    // 8192, and only the tail should reach the sink afterwards.
    let data = pattern(16384);
    let stream = ScriptedStream::preloaded(data.clone());
    let sink = MockSink::new();
    let (player, recorder) =
        build_player(&stream, FixedParser::new(256), &sink, test_config(3, 1024));

    player.start().unwrap();
    wait_until("playback", || player.is_playing());

    player.seek_to(4.0).unwrap();
    wait_until("reconnect", || stream.reconnects() == vec![8192]);
    assert_eq!(player.stop_reason(), StopReason::None);
    assert!((player.position() - 4.0).abs() < 1e-6);

    wait_until("restart", || sink.started_count() >= 2);
    drive_to_finish(&player, &sink);

    assert!(player.did_finish());
    assert_eq!(sink.played(), &data[8192..]);
    assert_eq!(
        recorder.count(|e| matches!(e, Event::FinishedPlaying { reached_end: true })),
        1
    );
}

#[test]
fn paused_seek_is_staged_until_play() {
    let data = pattern(16384);
    let stream = ScriptedStream::preloaded(data.clone());
    let sink = MockSink::new();
    let (player, _) = build_player(&stream, FixedParser::new(256), &sink, test_config(3, 1024));

    player.start().unwrap();
    wait_until("playback", || player.is_playing());
    player.pause();

    player.seek_to(4.0).unwrap();
    // Staged: nothing reconnects and the pipeline is untouched until play.
    assert!(stream.reconnects().is_empty());
    assert!((player.position() - 4.0).abs() < 1e-9);
    assert!(player.is_paused());

    player.play();
    wait_until("reconnect", || stream.reconnects() == vec![8192]);
    drive_to_finish(&player, &sink);

    assert!(player.did_finish());
    assert_eq!(sink.played(), &data[8192..]);
}

#[test]
fn seek_requires_known_duration() {
    let stream = ScriptedStream::live(Vec::new());
    let sink = MockSink::new();
    let (player, _) = build_player(&stream, FixedParser::new(256), &sink, test_config(3, 1024));

    player.start().unwrap();
    assert!(matches!(
        player.seek_to(1.0),
        Err(PlayerError::InvalidState(_))
    ));
    stream.close();
}

#[test]
fn interruption_pauses_and_resumes() {
    let stream = ScriptedStream::live(pattern(8192));
    let sink = MockSink::new();
    let (player, recorder) =
        build_player(&stream, FixedParser::new(256), &sink, test_config(3, 1024));

    player.start().unwrap();
    wait_until("playback", || player.is_playing());

    player.begin_interruption();
    assert!(player.is_paused());
    assert_eq!(
        recorder.count(|e| matches!(e, Event::InterruptionBegan { did_pause: true })),
        1
    );

    player.end_interruption();
    assert!(player.is_playing());
    assert_eq!(recorder.count(|e| matches!(e, Event::InterruptionEnded)), 1);

    // An interruption while already paused must not resume on its own.
    player.pause();
    player.begin_interruption();
    player.end_interruption();
    assert!(player.is_paused());
    assert_eq!(
        recorder.count(|e| matches!(e, Event::InterruptionBegan { did_pause: false })),
        1
    );
    stream.close();
}

#[test]
fn ingestion_is_bounded_while_the_sink_is_stalled() {
    // A fast preloaded source with a sink that never completes a buffer:
    // the high-water mark must stop the download instead of letting the
    // whole stream go resident.
    let data = pattern(32 * 1024);
    let stream = ScriptedStream::preloaded(data.clone());
    let sink = MockSink::new();
    let mut config = test_config(3, 1024);
    config.max_buffered_bytes = 8 * 1024;
    let (player, _) = build_player(&stream, FixedParser::new(256), &sink, config);

    player.start().unwrap();
    wait_until("sink start", || sink.started_count() > 0);
    thread::sleep(Duration::from_millis(100));

    // Ring high-water plus one read overshoot plus what the pipeline
    // itself can hold is well under half the stream.
    let ingested = stream.position();
    assert!(
        ingested <= 16 * 1024,
        "ingested {} bytes with a stalled sink",
        ingested
    );

    // Releasing the hardware drains the rest without loss or duplication.
    drive_to_finish(&player, &sink);
    assert!(player.did_finish());
    assert_eq!(sink.played(), data);
}

#[test]
fn eof_tail_plays_before_finish() {
    // Two full buffers plus a one-packet tail, with the hardware racing
    // EOF by completing buffers the moment they are queued. The session
    // must never finish with the tail unplayed.
    for _ in 0..20 {
        let data = pattern(2304);
        let stream = ScriptedStream::preloaded(data.clone());
        let sink = MockSink::new();
        let (player, recorder) =
            build_player(&stream, FixedParser::new(256), &sink, test_config(3, 1024));

        player.start().unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let done2 = Arc::clone(&done);
        let sink2 = sink.clone();
        let hardware = thread::spawn(move || {
            while !done2.load(Ordering::SeqCst) {
                if !sink2.complete_oldest() {
                    thread::yield_now();
                }
            }
        });

        wait_until("finish", || player.did_finish() || player.did_fail());
        done.store(true, Ordering::SeqCst);
        hardware.join().unwrap();

        assert!(player.did_finish());
        assert_eq!(sink.played(), data);
        assert_eq!(
            recorder.count(|e| matches!(e, Event::FinishedPlaying { reached_end: true })),
            1
        );
    }
}

#[test]
fn seek_with_full_pipeline_discards_stale_audio() {
    // Both buffers in flight and the filler blocked waiting for a free
    // slot; the seek must reclaim everything, and no pre-seek byte may
    // reach the speaker afterwards.
    let data = pattern(16384);
    let stream = ScriptedStream::preloaded(data.clone());
    let sink = MockSink::new();
    let (player, _) = build_player(&stream, FixedParser::new(256), &sink, test_config(2, 1024));

    player.start().unwrap();
    wait_until("full pipeline", || sink.queued_count() == 2);

    player.seek_to(4.0).unwrap();
    wait_until("reconnect", || stream.reconnects() == vec![8192]);

    wait_until("restart", || sink.started_count() >= 2);
    drive_to_finish(&player, &sink);

    assert!(player.did_finish());
    assert_eq!(sink.played(), &data[8192..]);
}

#[test]
fn pause_freezes_position_without_prior_polls() {
    let stream = ScriptedStream::live(pattern(8192));
    let sink = MockSink::new();
    let (player, _) = build_player(&stream, FixedParser::new(256), &sink, test_config(3, 1024));

    player.start().unwrap();
    wait_until("playback", || player.is_playing());

    // One buffer of 4 packets at 1024 frames each and 8192 Hz: half a
    // second consumed before anyone asked for the position.
    sink.complete_oldest();
    player.pause();
    assert!(player.is_paused());
    assert!((player.position() - 0.5).abs() < 1e-6);
    stream.close();
}

#[test]
fn stream_is_cached_to_the_configured_path() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("stream.bin");
    let data = pattern(8448);
    let stream = ScriptedStream::preloaded(data.clone());
    let sink = MockSink::new();

    let mut config = test_config(4, 1024);
    config.cache_path = Some(cache_path.clone());
    let (player, recorder) = build_player(&stream, FixedParser::new(256), &sink, config);

    player.start().unwrap();
    drive_to_finish(&player, &sink);

    assert!(player.did_finish());
    assert_eq!(std::fs::read(&cache_path).unwrap(), data);
    assert_eq!(
        recorder.count(|e| matches!(e, Event::CachedToPath { path } if *path == cache_path)),
        1
    );
}
