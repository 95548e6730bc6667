use brook_core::PlayerError;
use parking_lot::{Condvar, Mutex};

/// Number of playback buffers. Needs to be big enough to keep the pipeline
/// busy but not so big that playback takes too long to begin. Min 3,
/// typical 8-24.
pub const DEFAULT_BUFFER_COUNT: usize = 16;

/// Bytes per buffer. Must exceed the largest single packet the parser can
/// emit; a `BufferTooSmall` error fires at runtime if it does not.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Packet-descriptor slots per buffer.
pub const DEFAULT_MAX_PACKET_DESCS: usize = 512;

/// Pool sizing, chosen to balance pipeline depth against playback-start
/// latency.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub buffer_count: usize,
    pub buffer_size: usize,
    pub max_packet_descs: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_packet_descs: DEFAULT_MAX_PACKET_DESCS,
        }
    }
}

/// Description of one packet inside a filled buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketDesc {
    /// Byte offset of the packet within the buffer
    pub start_offset: usize,
    /// Packet payload size in bytes
    pub byte_size: usize,
    /// Variable frames in this packet (0 when the format is constant-rate)
    pub frames: u32,
}

/// A buffer handed to the hardware sink. The pool slot it came from stays
/// marked in-use until [`BufferPool::complete`] is called with `index`.
#[derive(Debug, Clone)]
pub struct FilledBuffer {
    pub index: usize,
    pub data: Vec<u8>,
    pub descs: Vec<PacketDesc>,
}

/// Outcome of appending a packet to the current fill target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    Appended,
    /// The packet does not fit (bytes or descriptor slots); submit the
    /// buffer and retry on a fresh one.
    Full,
}

struct Slot {
    data: Vec<u8>,
    descs: Vec<PacketDesc>,
    in_use: bool,
    /// Bytes currently in flight to the sink from this slot
    in_flight_bytes: usize,
}

struct PoolState {
    slots: Vec<Slot>,
    /// Index of the buffer currently being filled (round-robin)
    fill_index: usize,
    in_use: usize,
    shutdown: bool,
}

/// Fixed-size set of playback buffers with in-use flags.
///
/// The parser/filler accumulates packets into the current fill target,
/// submits it to the sink, then blocks in [`wait_fill_free`] if the next
/// slot is still in flight. The sink's completion callback frees slots via
/// [`complete`], which is the only thing that wakes the blocked filler
/// besides [`shutdown`].
///
/// [`wait_fill_free`]: BufferPool::wait_fill_free
/// [`complete`]: BufferPool::complete
/// [`shutdown`]: BufferPool::shutdown
pub struct BufferPool {
    cfg: PoolConfig,
    state: Mutex<PoolState>,
    buffer_free: Condvar,
}

impl BufferPool {
    pub fn new(cfg: PoolConfig) -> Self {
        assert!(cfg.buffer_count >= 1, "pool needs at least one buffer");
        assert!(cfg.buffer_size >= 1, "buffers need nonzero capacity");
        let slots = (0..cfg.buffer_count)
            .map(|_| Slot {
                data: Vec::with_capacity(cfg.buffer_size),
                descs: Vec::with_capacity(cfg.max_packet_descs),
                in_use: false,
                in_flight_bytes: 0,
            })
            .collect();
        Self {
            cfg,
            state: Mutex::new(PoolState {
                slots,
                fill_index: 0,
                in_use: 0,
                shutdown: false,
            }),
            buffer_free: Condvar::new(),
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.cfg
    }

    pub fn buffer_count(&self) -> usize {
        self.cfg.buffer_count
    }

    pub fn buffer_size(&self) -> usize {
        self.cfg.buffer_size
    }

    /// Append a packet to the current fill target.
    ///
    /// Returns [`Append::Full`] when the packet does not fit right now, and
    /// `PlayerError::BufferTooSmall` when the packet could never fit even in
    /// an empty buffer.
    pub fn try_append(
        &self,
        payload: &[u8],
        frames: u32,
    ) -> Result<Append, PlayerError> {
        if payload.len() > self.cfg.buffer_size {
            return Err(PlayerError::BufferTooSmall {
                packet: payload.len(),
                capacity: self.cfg.buffer_size,
            });
        }

        let mut state = self.state.lock();
        let fill_index = state.fill_index;
        let max_descs = self.cfg.max_packet_descs;
        let buffer_size = self.cfg.buffer_size;
        let slot = &mut state.slots[fill_index];
        debug_assert!(!slot.in_use, "fill target must be free");

        if slot.data.len() + payload.len() > buffer_size || slot.descs.len() >= max_descs {
            return Ok(Append::Full);
        }

        slot.descs.push(PacketDesc {
            start_offset: slot.data.len(),
            byte_size: payload.len(),
            frames,
        });
        slot.data.extend_from_slice(payload);
        Ok(Append::Appended)
    }

    /// Bytes accumulated in the current fill target.
    pub fn fill_len(&self) -> usize {
        let state = self.state.lock();
        state.slots[state.fill_index].data.len()
    }

    /// Packets accumulated in the current fill target.
    pub fn fill_packets(&self) -> usize {
        let state = self.state.lock();
        state.slots[state.fill_index].descs.len()
    }

    /// Mark the current fill target in-use, hand its contents out for the
    /// sink, and advance to the next slot. Returns `None` when nothing has
    /// been accumulated. Does not block; call [`wait_fill_free`] afterwards
    /// before filling again.
    ///
    /// [`wait_fill_free`]: BufferPool::wait_fill_free
    pub fn submit_current(&self) -> Option<FilledBuffer> {
        let mut state = self.state.lock();
        let index = state.fill_index;
        let count = self.cfg.buffer_count;
        let slot = &mut state.slots[index];
        if slot.data.is_empty() {
            return None;
        }
        debug_assert!(!slot.in_use);

        let filled = FilledBuffer {
            index,
            data: slot.data.clone(),
            descs: slot.descs.clone(),
        };
        slot.in_use = true;
        slot.in_flight_bytes = slot.data.len();
        slot.data.clear();
        slot.descs.clear();

        state.in_use += 1;
        state.fill_index = (index + 1) % count;
        Some(filled)
    }

    /// Block the calling (filler) thread until the fill target is free.
    /// Returns false if the pool was shut down while waiting.
    pub fn wait_fill_free(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return false;
            }
            let fill_index = state.fill_index;
            if !state.slots[fill_index].in_use {
                return true;
            }
            self.buffer_free.wait(&mut state);
        }
    }

    /// Hardware completion callback: mark `index` free and wake the filler.
    ///
    /// Completing a buffer that is not in flight is tolerated (a sink may
    /// return everything on teardown after the pool was already reset).
    pub fn complete(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        if index >= state.slots.len() {
            log::warn!("completion for out-of-range buffer {}", index);
            return false;
        }
        let slot = &mut state.slots[index];
        if !slot.in_use {
            log::warn!("completion for buffer {} that is not in use", index);
            return false;
        }
        slot.in_use = false;
        slot.in_flight_bytes = 0;
        state.in_use -= 1;
        drop(state);
        self.buffer_free.notify_all();
        true
    }

    /// Number of buffers currently in flight to the sink.
    pub fn in_use_count(&self) -> usize {
        self.state.lock().in_use
    }

    /// Bytes held in flight plus the partial fill target, for
    /// buffered-seconds estimates.
    pub fn queued_bytes(&self) -> usize {
        let state = self.state.lock();
        let in_flight: usize = state.slots.iter().map(|s| s.in_flight_bytes).sum();
        in_flight + state.slots[state.fill_index].data.len()
    }

    /// Discard the partial fill target (seek).
    pub fn reset_fill(&self) {
        let mut state = self.state.lock();
        let fill_index = state.fill_index;
        let slot = &mut state.slots[fill_index];
        slot.data.clear();
        slot.descs.clear();
    }

    /// Free every slot and restart filling from slot 0 (seek/teardown after
    /// the sink has been stopped and will not deliver completions).
    pub fn reset(&self) {
        let mut state = self.state.lock();
        for slot in &mut state.slots {
            slot.data.clear();
            slot.descs.clear();
            slot.in_use = false;
            slot.in_flight_bytes = 0;
        }
        state.fill_index = 0;
        state.in_use = 0;
        drop(state);
        self.buffer_free.notify_all();
    }

    /// Wake any blocked filler permanently; used by `stop()` so shutdown is
    /// never stuck waiting for a completion that will not arrive.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.buffer_free.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }
}
