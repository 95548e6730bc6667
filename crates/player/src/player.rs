// Playback engine: worker threads, transport surface, session lifecycle.
//
// Two threads move data. The ingest thread pulls bytes from the source,
// runs them through the optional filter and cache tee, and appends them to
// the byte ring. The fill thread drains the ring through the parser and
// packs packets into pool buffers for the sink, blocking on the pool when
// the hardware is behind. Back-pressure therefore propagates sink -> pool
// -> fill thread, and onward to the source through the ring's high-water
// mark, which pauses ingestion until the parser catches up.
//
// Lock discipline: at most one internal lock is held at a time, the sink
// lock is taken last and alone, and observer events are dispatched with no
// locks held. Sink completion events re-enter the engine on the sink's
// thread; every path reachable from them avoids the sink lock unless the
// state machine has already ruled out re-entry.

use crate::config::PlayerConfig;
use crate::progress::ProgressEstimator;
use crate::sink::{AudioSink, SinkEvent, SinkEventHandler};
use brook_bufpool::{Append, BufferPool, FilledBuffer};
use brook_core::{
    CallbackManager, Event, PlayerCallback, PlayerError, PlayerState, Result, StateContainer,
    StopReason,
};
use brook_demux::{PacketParser, ParsedPacket, StreamFormat};
use brook_ringbuffer::SharedByteRing;
use brook_stream::{ByteStream, DataFilter};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long the fill thread waits for ring data before re-checking flags.
const FILL_WAIT: Duration = Duration::from_millis(50);

/// Poll interval for a worker parked on a control-flag change (EOF, seek
/// application).
const POLL_IDLE: Duration = Duration::from_millis(20);

struct SeekRequest {
    byte_offset: u64,
}

struct CacheWriter {
    file: BufWriter<File>,
    path: PathBuf,
}

struct Shared {
    cfg: PlayerConfig,
    state: StateContainer,
    ring: SharedByteRing,
    pool: BufferPool,
    stream: Mutex<Box<dyn ByteStream>>,
    filter: Mutex<Option<Box<dyn DataFilter>>>,
    parser: Mutex<Box<dyn PacketParser>>,
    sink: Mutex<Box<dyn AudioSink>>,
    progress: Mutex<ProgressEstimator>,
    callbacks: CallbackManager,
    shutdown: AtomicBool,
    /// The source returned EOF; cleared when a seek reopens it
    reached_eof: AtomicBool,
    /// `generation + 1` once every byte of that generation's stream has
    /// been handed to the sink; 0 otherwise. Stamped only after the final
    /// partial buffer is submitted, so a completion draining the queue
    /// cannot finish the session with tail audio still unsubmitted, and
    /// stamping with the generation keeps a completion racing a seek from
    /// finishing the session against stale EOF state.
    eof_flushed: AtomicU64,
    audio_started: AtomicBool,
    /// Next parser feed crosses a seek/reconnect gap
    discontinuous: AtomicBool,
    /// Bumped on every seek; in-flight packets from older generations are
    /// dropped instead of queued
    generation: AtomicU64,
    /// Last generation the ingest thread finished switching to. The fill
    /// thread idles while this trails `generation`, so stale ring bytes are
    /// never parsed as post-seek data.
    applied_generation: AtomicU64,
    seek_request: Mutex<Option<SeekRequest>>,
    /// Absolute stream offset ingestion has reached
    bytes_ingested: AtomicU64,
    finished_event: AtomicBool,
    interruption_paused: AtomicBool,
}

/// Streaming audio player.
///
/// Construction wires a [`ByteStream`] source, a [`PacketParser`], and an
/// [`AudioSink`] together; [`start`](Player::start) spawns the worker
/// threads and playback begins as soon as enough buffers are queued.
/// Transport calls (`play`, `pause`, `stop`, `seek_to`) are safe from any
/// thread, including observer callbacks.
///
/// One `Player` is one session: after it stops or fails, construct a new
/// one rather than restarting it.
pub struct Player {
    shared: Arc<Shared>,
    ingest: Mutex<Option<thread::JoinHandle<()>>>,
    filler: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Player {
    pub fn new(
        stream: Box<dyn ByteStream>,
        parser: Box<dyn PacketParser>,
        sink: Box<dyn AudioSink>,
        config: PlayerConfig,
    ) -> Self {
        let pool = BufferPool::new(config.pool);
        let shared = Arc::new(Shared {
            cfg: config,
            state: StateContainer::new(),
            ring: SharedByteRing::new(),
            pool,
            stream: Mutex::new(stream),
            filter: Mutex::new(None),
            parser: Mutex::new(parser),
            sink: Mutex::new(sink),
            progress: Mutex::new(ProgressEstimator::new()),
            callbacks: CallbackManager::new(),
            shutdown: AtomicBool::new(false),
            reached_eof: AtomicBool::new(false),
            eof_flushed: AtomicU64::new(0),
            audio_started: AtomicBool::new(false),
            discontinuous: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            applied_generation: AtomicU64::new(0),
            seek_request: Mutex::new(None),
            bytes_ingested: AtomicU64::new(0),
            finished_event: AtomicBool::new(false),
            interruption_paused: AtomicBool::new(false),
        });
        Self {
            shared,
            ingest: Mutex::new(None),
            filler: Mutex::new(None),
        }
    }

    /// Install a byte transform applied ahead of the parser. Set before
    /// [`start`](Player::start).
    pub fn set_filter(&self, filter: Box<dyn DataFilter>) {
        *self.shared.filter.lock() = Some(filter);
    }

    pub fn add_callback(&self, callback: Arc<dyn PlayerCallback>) {
        self.shared.callbacks.add_callback(callback);
    }

    /// Spawn the worker threads and begin ingesting. Fails if the session
    /// was already started.
    pub fn start(&self) -> Result<()> {
        if !self
            .shared
            .state
            .set_if(PlayerState::Initialized, PlayerState::Starting)
        {
            return Err(PlayerError::InvalidState(
                "player already started".to_string(),
            ));
        }

        let weak = Arc::downgrade(&self.shared);
        let handler: SinkEventHandler = Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_sink_event(event);
            }
        });
        self.shared.sink.lock().set_event_handler(handler);

        let shared = Arc::clone(&self.shared);
        let ingest = thread::Builder::new()
            .name("brook-ingest".to_string())
            .spawn(move || ingest_loop(shared))
            .map_err(|e| PlayerError::Unknown(format!("failed to spawn ingest thread: {}", e)))?;
        *self.ingest.lock() = Some(ingest);

        let shared = Arc::clone(&self.shared);
        let filler = thread::Builder::new()
            .name("brook-fill".to_string())
            .spawn(move || fill_loop(shared))
            .map_err(|e| PlayerError::Unknown(format!("failed to spawn fill thread: {}", e)))?;
        *self.filler.lock() = Some(filler);
        Ok(())
    }

    /// Resume from pause. Applies a staged seek if one was made while
    /// paused; otherwise resumes the sink (or arms the deferred sink start
    /// if playback had not become audible yet). No-op outside `Paused`.
    pub fn play(&self) {
        if self.shared.state.did_fail() {
            return;
        }
        if self.shared.state.state() != PlayerState::Paused {
            return;
        }

        // Drop the progress guard before perform_seek re-locks it; the
        // guard of an `if let` scrutinee would otherwise live for the
        // whole block.
        let staged = self.shared.progress.lock().take_pending_seek();
        if let Some(target) = staged {
            self.shared.state.set(PlayerState::WaitingForData);
            self.shared
                .callbacks
                .dispatch(Event::PlayStatusChanged { paused: false });
            if let Err(e) = self.shared.perform_seek(target) {
                log::warn!("staged seek failed: {}", e);
            }
            return;
        }

        if self.shared.audio_started.load(Ordering::SeqCst) {
            let resumed = { self.shared.sink.lock().resume() };
            if let Err(e) = resumed {
                self.shared.fail(e);
                return;
            }
            self.shared.state.set(PlayerState::Playing);
        } else {
            // The sink start was deferred while paused.
            let in_use = self.shared.pool.in_use_count();
            let gen = self.shared.generation.load(Ordering::SeqCst);
            let flushed = self.shared.eof_flushed.load(Ordering::SeqCst) == gen + 1;
            if flushed && in_use == 0 {
                // Nothing left to play out.
                self.shared.finish_session(StopReason::EndOfStream, true);
                return;
            }
            if in_use >= self.shared.cfg.effective_start_threshold()
                || self.shared.reached_eof.load(Ordering::SeqCst)
            {
                self.shared.state.set(PlayerState::WaitingForSinkStart);
                self.shared.start_sink();
            } else {
                self.shared.state.set(PlayerState::WaitingForData);
            }
        }
        self.shared
            .callbacks
            .dispatch(Event::PlayStatusChanged { paused: false });
    }

    /// Halt the sink, keeping every buffer and the ring intact for an
    /// instant resume. Ingestion and filling continue in the background.
    pub fn pause(&self) {
        if self.shared.state.did_fail() {
            return;
        }
        match self.shared.state.state() {
            PlayerState::Playing
            | PlayerState::Buffering
            | PlayerState::WaitingForData
            | PlayerState::WaitingForSinkStart => {
                if self.shared.audio_started.load(Ordering::SeqCst) {
                    // Freeze the position before the frame counter halts,
                    // so a paused query does not read a stale value.
                    let (frames, paused) = {
                        let mut sink = self.shared.sink.lock();
                        (sink.consumed_frames(), sink.pause())
                    };
                    match frames {
                        Ok(frames) => {
                            self.shared.progress.lock().note_progress(frames);
                        }
                        Err(e) => log::debug!("sink frame counter unavailable: {}", e),
                    }
                    if let Err(e) = paused {
                        self.shared.fail(e);
                        return;
                    }
                }
                self.shared.state.set(PlayerState::Paused);
                self.shared
                    .callbacks
                    .dispatch(Event::PlayStatusChanged { paused: true });
            }
            _ => {}
        }
    }

    pub fn toggle_playback(&self) {
        if self.shared.state.is_paused() {
            self.play();
        } else {
            self.pause();
        }
    }

    /// Stop the session for good. Safe to call from observer callbacks;
    /// worker threads are joined on drop, not here.
    pub fn stop(&self) {
        if !self.shared.state.is_started() {
            return;
        }
        if !self.shared.state.begin_stop(StopReason::UserAction) {
            return;
        }
        self.shared.teardown(true);
        self.shared.state.finish_stop();
        self.shared.dispatch_finished(false);
    }

    /// Seek to `target` seconds. While paused the seek is staged and
    /// applied on the next [`play`](Player::play); otherwise the stream
    /// reconnects at the mapped byte offset immediately. Requires the
    /// duration estimate to exist.
    pub fn seek_to(&self, target: f64) -> Result<()> {
        if self.shared.state.did_fail() {
            return Ok(());
        }
        if self.shared.progress.lock().duration() <= 0.0 {
            return Err(PlayerError::InvalidState(
                "cannot seek before duration is known".to_string(),
            ));
        }
        match self.shared.state.state() {
            PlayerState::Paused => {
                self.shared.progress.lock().set_pending_seek(target);
                Ok(())
            }
            PlayerState::Playing
            | PlayerState::Buffering
            | PlayerState::WaitingForData
            | PlayerState::WaitingForSinkStart => self.shared.perform_seek(target),
            _ => Err(PlayerError::InvalidState(
                "cannot seek in this state".to_string(),
            )),
        }
    }

    /// Note an external interruption (audio focus loss, phone call).
    /// Pauses if playback was live and remembers whether it did.
    pub fn begin_interruption(&self) {
        let did_pause = matches!(
            self.shared.state.state(),
            PlayerState::Playing
                | PlayerState::Buffering
                | PlayerState::WaitingForData
                | PlayerState::WaitingForSinkStart
        );
        if did_pause {
            self.pause();
        }
        self.shared
            .interruption_paused
            .store(did_pause, Ordering::SeqCst);
        self.shared
            .callbacks
            .dispatch(Event::InterruptionBegan { did_pause });
    }

    /// The interruption ended; resumes only if [`begin_interruption`]
    /// was the thing that paused us.
    ///
    /// [`begin_interruption`]: Player::begin_interruption
    pub fn end_interruption(&self) {
        self.shared.callbacks.dispatch(Event::InterruptionEnded);
        if self.shared.interruption_paused.swap(false, Ordering::SeqCst) {
            self.play();
        }
    }

    pub fn state(&self) -> PlayerState {
        self.shared.state.state()
    }

    pub fn stop_reason(&self) -> StopReason {
        self.shared.state.stop_reason()
    }

    pub fn error(&self) -> Option<PlayerError> {
        self.shared.state.error()
    }

    pub fn is_started(&self) -> bool {
        self.shared.state.is_started()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.is_paused()
    }

    pub fn is_buffering(&self) -> bool {
        self.shared.state.is_buffering()
    }

    pub fn did_fail(&self) -> bool {
        self.shared.state.did_fail()
    }

    pub fn is_finishing(&self) -> bool {
        self.shared.state.is_finishing()
    }

    pub fn did_finish(&self) -> bool {
        self.shared.state.did_finish()
    }

    /// Estimated total duration in seconds; 0.0 while unknown.
    pub fn duration(&self) -> f64 {
        self.shared.progress.lock().duration()
    }

    /// Current playback position in seconds. Reports the staged target
    /// while a paused seek is pending.
    pub fn position(&self) -> f64 {
        {
            let progress = self.shared.progress.lock();
            if let Some(target) = progress.pending_seek() {
                return target;
            }
        }
        if self.shared.audio_started.load(Ordering::SeqCst) && self.shared.state.is_playing() {
            let frames = { self.shared.sink.lock().consumed_frames() };
            match frames {
                Ok(frames) => return self.shared.progress.lock().note_progress(frames),
                Err(e) => log::debug!("sink frame counter unavailable: {}", e),
            }
        }
        self.shared.progress.lock().last_progress()
    }

    /// Seconds of audio sitting in the ring and the buffer pool.
    pub fn buffered_seconds(&self) -> f64 {
        let bytes = self.shared.ring.available() as u64 + self.shared.pool.queued_bytes() as u64;
        self.shared.progress.lock().buffered_seconds(bytes)
    }

    pub fn calculated_bit_rate(&self) -> f64 {
        self.shared.progress.lock().calculated_bit_rate()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if self.shared.state.is_started() && !self.shared.state.did_fail() {
            self.stop();
        }
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.ring.close();
        self.shared.pool.shutdown();
        if let Some(handle) = self.ingest.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.filler.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Shared {
    fn transition(&self, from: PlayerState, to: PlayerState) -> bool {
        if self.state.set_if(from, to) {
            self.callbacks.dispatch(Event::StateChanged {
                old_state: from,
                new_state: to,
            });
            true
        } else {
            false
        }
    }

    fn dispatch_finished(&self, reached_end: bool) {
        if !self.finished_event.swap(true, Ordering::SeqCst) {
            self.callbacks
                .dispatch(Event::FinishedPlaying { reached_end });
        }
    }

    /// Irreversibly release both worker threads and halt the sink.
    fn teardown(&self, immediate: bool) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.ring.close();
        self.pool.shutdown();
        let stopped = { self.sink.lock().stop(immediate) };
        if let Err(e) = stopped {
            log::warn!("sink stop failed: {}", e);
        }
    }

    fn finish_session(&self, reason: StopReason, reached_end: bool) {
        self.state.begin_stop(reason);
        self.teardown(!reached_end);
        self.state.finish_stop();
        self.dispatch_finished(reached_end);
    }

    /// Record the session's single failure and tear everything down.
    /// Callers must not hold the sink lock.
    fn fail(&self, error: PlayerError) {
        if !self.state.fail(error.clone()) {
            return;
        }
        self.teardown(true);
        self.state.finish_stop();
        self.callbacks.dispatch(Event::Failed { error });
        self.dispatch_finished(false);
    }

    fn start_sink(&self) {
        if self.audio_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let started = { self.sink.lock().start() };
        if let Err(e) = started {
            self.audio_started.store(false, Ordering::SeqCst);
            self.fail(e);
        }
    }

    fn apply_format(&self, format: &StreamFormat) -> bool {
        log::info!(
            "stream format: {} Hz, {} channel(s), {} frames/packet",
            format.sample_rate,
            format.channels,
            format.frames_per_packet
        );
        self.progress.lock().on_format(format);
        if let Some(max) = format.max_packet_size {
            if max > self.pool.buffer_size() {
                self.fail(PlayerError::BufferTooSmall {
                    packet: max,
                    capacity: self.pool.buffer_size(),
                });
                return false;
            }
        }
        let configured = { self.sink.lock().configure(format) };
        if let Err(e) = configured {
            self.fail(e);
            return false;
        }
        true
    }

    /// Hand a filled buffer to the sink and run the post-submit state
    /// checks (sink start threshold, underrun recovery).
    fn submit_filled(&self, filled: FilledBuffer) -> bool {
        log::trace!(
            "submitting buffer {} ({} bytes, {} packets)",
            filled.index,
            filled.data.len(),
            filled.descs.len()
        );
        let enqueued = {
            self.sink
                .lock()
                .enqueue(filled.index, &filled.data, &filled.descs)
        };
        if let Err(e) = enqueued {
            self.fail(e);
            return false;
        }
        self.after_submit();
        true
    }

    fn after_submit(&self) {
        let in_use = self.pool.in_use_count();
        let ready = in_use >= self.cfg.effective_start_threshold()
            || self.reached_eof.load(Ordering::SeqCst);
        if !ready {
            return;
        }
        if !self.audio_started.load(Ordering::SeqCst) {
            if self.state.state() == PlayerState::Paused {
                // Deferred; play() will start the sink.
                return;
            }
            if self.transition(PlayerState::WaitingForData, PlayerState::WaitingForSinkStart) {
                self.start_sink();
            }
        } else if self.transition(PlayerState::Buffering, PlayerState::Playing) {
            self.callbacks.dispatch(Event::BufferingFinished);
        }
    }

    /// Pack one parsed packet into the pool, submitting and blocking as
    /// needed. Returns false when the session is over.
    fn handle_packet(&self, packet: &ParsedPacket, gen: u64) -> bool {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return false;
            }
            if self.generation.load(Ordering::SeqCst) != gen {
                // A seek invalidated this packet; drop it.
                return true;
            }
            match self.pool.try_append(&packet.payload, packet.frames) {
                Ok(Append::Appended) => {
                    self.progress.lock().on_packet(packet.payload.len());
                    return true;
                }
                Ok(Append::Full) => {
                    if let Some(filled) = self.pool.submit_current() {
                        if self.generation.load(Ordering::SeqCst) != gen {
                            // A seek reset the pool between fill and
                            // submit; this buffer is pre-seek audio.
                            self.pool.complete(filled.index);
                            return true;
                        }
                        if !self.submit_filled(filled) {
                            return false;
                        }
                    }
                    if !self.pool.wait_fill_free() {
                        return false;
                    }
                }
                Err(e) => {
                    self.fail(e);
                    return false;
                }
            }
        }
    }

    /// The ring is drained and the source hit EOF: submit the final
    /// partial buffer and either finish now or let the last completions
    /// finish the session.
    fn flush_eof(&self, gen: u64) {
        if self.generation.load(Ordering::SeqCst) != gen {
            return;
        }
        if self.progress.lock().processed_packets() == 0 {
            // The stream ended without a single audio packet in it.
            if self.state.record_error(PlayerError::NoData) {
                self.callbacks.dispatch(Event::Failed {
                    error: PlayerError::NoData,
                });
            }
            self.finish_session(StopReason::EndOfStream, false);
            return;
        }

        if self.pool.fill_len() > 0 {
            if let Some(filled) = self.pool.submit_current() {
                if self.generation.load(Ordering::SeqCst) != gen {
                    self.pool.complete(filled.index);
                    return;
                }
                if !self.submit_filled(filled) {
                    return;
                }
            }
        }
        // Every byte is in the sink's hands now; from here a completion
        // that drains the queue may finish the session.
        self.eof_flushed.store(gen + 1, Ordering::SeqCst);
        self.callbacks.dispatch(Event::WillFinishPlaying);

        if !self.audio_started.load(Ordering::SeqCst)
            && self.state.state() != PlayerState::Paused
            && self.transition(PlayerState::WaitingForData, PlayerState::WaitingForSinkStart)
        {
            // Short stream that never reached the threshold.
            self.start_sink();
        }

        let state = self.state.state();
        if self.pool.in_use_count() == 0
            && !matches!(state, PlayerState::Stopping | PlayerState::Stopped)
        {
            self.finish_session(StopReason::EndOfStream, true);
        }
    }

    /// Completion/start/stop notifications from the sink. Runs on the
    /// sink's thread; must not take the sink lock unless the state machine
    /// has ruled out a caller already holding it.
    fn on_sink_event(&self, event: SinkEvent) {
        match event {
            SinkEvent::Started => {
                if self.transition(PlayerState::WaitingForSinkStart, PlayerState::Playing) {
                    self.callbacks.dispatch(Event::PlaybackBegan);
                }
            }
            SinkEvent::BufferCompleted { index } => {
                self.pool.complete(index);
                if self.pool.in_use_count() != 0 {
                    return;
                }
                let state = self.state.state();
                if matches!(state, PlayerState::Stopping | PlayerState::Stopped) {
                    // Teardown owns the sink; nothing more to drive here.
                    return;
                }
                let gen = self.generation.load(Ordering::SeqCst);
                if self.eof_flushed.load(Ordering::SeqCst) == gen + 1
                    && self.reached_eof.load(Ordering::SeqCst)
                {
                    self.finish_session(StopReason::EndOfStream, true);
                } else if self.transition(PlayerState::Playing, PlayerState::Buffering) {
                    self.callbacks.dispatch(Event::BufferingStarted);
                }
            }
            SinkEvent::Stopped => {
                self.audio_started.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Live seek: invalidate in-flight work, reclaim every buffer, and ask
    /// the ingest thread to reconnect at the mapped offset.
    fn perform_seek(&self, target: f64) -> Result<()> {
        let mapped = {
            let progress = self.progress.lock();
            progress.seek_byte_offset(target, self.pool.buffer_size())
        };
        let (offset, aligned) = mapped.ok_or_else(|| {
            PlayerError::InvalidState("cannot seek before duration is known".to_string())
        })?;

        log::info!("seeking to {:.3}s (byte offset {})", aligned, offset);
        if !self.state.begin_stop(StopReason::Temporary) {
            // A real stop won the race.
            return Ok(());
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.eof_flushed.store(0, Ordering::SeqCst);

        if self.audio_started.swap(false, Ordering::SeqCst) {
            let stopped = { self.sink.lock().stop(true) };
            if let Err(e) = stopped {
                log::warn!("sink stop for seek failed: {}", e);
            }
        }
        // The sink will not deliver further completions; reclaim directly.
        self.pool.reset();
        self.progress.lock().begin_seek(aligned);
        *self.seek_request.lock() = Some(SeekRequest {
            byte_offset: offset,
        });
        self.state.reenter(PlayerState::WaitingForData);
        self.ring.wake();
        Ok(())
    }

    fn finish_cache(&self, mut writer: CacheWriter) {
        match writer.file.flush() {
            Ok(()) => {
                log::info!("stream cached to {}", writer.path.display());
                self.callbacks.dispatch(Event::CachedToPath { path: writer.path });
            }
            Err(e) => log::warn!("cache flush failed: {}", e),
        }
    }
}

/// Source -> filter -> cache tee -> ring.
fn ingest_loop(shared: Arc<Shared>) {
    shared
        .state
        .set_if(PlayerState::Starting, PlayerState::WaitingForData);

    let mut chunk = vec![0u8; shared.cfg.read_chunk.max(1)];
    let high_water = shared.cfg.effective_max_buffered();
    let low_water = high_water / 2;
    let mut throttled = false;
    let mut cache = shared
        .cfg
        .cache_path
        .as_ref()
        .and_then(|path| match File::create(path) {
            Ok(file) => Some(CacheWriter {
                file: BufWriter::new(file),
                path: path.clone(),
            }),
            Err(e) => {
                log::warn!("cache file {} unavailable: {}", path.display(), e);
                None
            }
        });

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }

        let request = shared.seek_request.lock().take();
        if let Some(request) = request {
            // A partial download is useless once we jump.
            cache = None;
            let reconnected = {
                let mut stream = shared.stream.lock();
                stream.reconnect(request.byte_offset)
            };
            match reconnected {
                Ok(()) => {
                    shared.ring.reset();
                    if let Some(filter) = shared.filter.lock().as_mut() {
                        filter.reset();
                    }
                    shared.discontinuous.store(true, Ordering::SeqCst);
                    shared.reached_eof.store(false, Ordering::SeqCst);
                    shared.eof_flushed.store(0, Ordering::SeqCst);
                    shared
                        .bytes_ingested
                        .store(request.byte_offset, Ordering::SeqCst);
                    shared
                        .applied_generation
                        .store(shared.generation.load(Ordering::SeqCst), Ordering::SeqCst);
                    shared.ring.wake();
                    log::debug!("ingestion resumed at byte {}", request.byte_offset);
                }
                Err(e) => {
                    shared.fail(e);
                    return;
                }
            }
            continue;
        }

        if shared.reached_eof.load(Ordering::SeqCst) {
            thread::sleep(POLL_IDLE);
            continue;
        }

        // Window the download: hold off while the ring sits above the
        // high-water mark, resume once the parser drains it to half.
        let buffered = shared.ring.available();
        if throttled {
            throttled = buffered > low_water;
        } else if buffered >= high_water {
            throttled = true;
            log::debug!("ingestion paused at {} buffered bytes", buffered);
        }
        if throttled {
            thread::sleep(POLL_IDLE);
            continue;
        }

        let (read, length) = {
            let mut stream = shared.stream.lock();
            let read = stream.read(&mut chunk);
            (read, stream.length())
        };
        match read {
            Err(e) => {
                if !shared.shutdown.load(Ordering::SeqCst) {
                    shared.fail(e);
                }
                return;
            }
            Ok(0) => {
                let total = shared.bytes_ingested.load(Ordering::SeqCst);
                {
                    let mut progress = shared.progress.lock();
                    if progress.file_length() == 0 {
                        // Length was unknown until now; EOF fixes it.
                        progress.set_file_length(total);
                    }
                }
                shared.reached_eof.store(true, Ordering::SeqCst);
                if let Some(writer) = cache.take() {
                    shared.finish_cache(writer);
                }
                shared.ring.wake();
                log::debug!("end of stream after {} bytes", total);
            }
            Ok(n) => {
                if let Some(len) = length {
                    let mut progress = shared.progress.lock();
                    if progress.file_length() == 0 {
                        progress.set_file_length(len);
                    }
                }
                if let Some(filter) = shared.filter.lock().as_mut() {
                    filter.filter(&mut chunk[..n]);
                }
                if let Some(writer) = cache.as_mut() {
                    if let Err(e) = writer.file.write_all(&chunk[..n]) {
                        log::warn!("cache write failed, caching disabled: {}", e);
                        cache = None;
                    }
                }
                shared.ring.append(&chunk[..n]);
                shared.bytes_ingested.fetch_add(n as u64, Ordering::SeqCst);
            }
        }
    }
}

/// Ring -> parser -> pool -> sink.
fn fill_loop(shared: Arc<Shared>) {
    let mut chunk = vec![0u8; shared.cfg.read_chunk.max(1)];
    // Generation whose EOF flush already ran, so an idle ring does not
    // re-flush every wakeup.
    let mut flushed_gen: Option<u64> = None;
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let gen = shared.generation.load(Ordering::SeqCst);
        if shared.applied_generation.load(Ordering::SeqCst) != gen {
            // A seek is in flight; everything in the ring predates it.
            thread::sleep(POLL_IDLE);
            continue;
        }

        let n = shared.ring.read_into(&mut chunk);
        if n == 0 {
            if shared.reached_eof.load(Ordering::SeqCst)
                && shared.seek_request.lock().is_none()
                && flushed_gen != Some(gen)
            {
                flushed_gen = Some(gen);
                shared.flush_eof(gen);
            }
            shared.ring.wait_for_data(FILL_WAIT);
            continue;
        }

        let discontinuous = shared.discontinuous.swap(false, Ordering::SeqCst);
        let output = { shared.parser.lock().feed(&chunk[..n], discontinuous) };
        let output = match output {
            Ok(output) => output,
            Err(e) => {
                shared.fail(PlayerError::Parse(e.to_string()));
                return;
            }
        };

        if let Some(format) = &output.format {
            if !shared.apply_format(format) {
                return;
            }
        }
        if let Some(offset) = output.data_offset {
            shared.progress.lock().set_data_offset(offset);
        }
        if let Some(count) = output.audio_data_byte_count {
            shared.progress.lock().set_audio_data_byte_count(count);
        }

        for packet in &output.packets {
            if shared.shutdown.load(Ordering::SeqCst) {
                return;
            }
            if shared.generation.load(Ordering::SeqCst) != gen {
                break;
            }
            if !shared.handle_packet(packet, gen) {
                return;
            }
        }
    }
}
