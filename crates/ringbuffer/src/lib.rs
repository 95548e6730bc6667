// Growable byte ring between the ingestion path and the parser

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

/// Default backing capacity; the ring grows on demand and never shrinks.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Single-producer/single-consumer byte ring.
///
/// `append` extends the backing storage when free space runs out, so it
/// never blocks and never drops data. `read_into` is non-blocking and
/// returns however many bytes are currently available. Consumed and
/// appended totals are monotonic across growth and wrap-around.
pub struct ByteRing {
    buf: Vec<u8>,
    /// Read index into `buf`
    head: usize,
    /// Unread byte count
    len: usize,
    total_appended: u64,
    total_consumed: u64,
}

impl ByteRing {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: vec![0; capacity],
            head: 0,
            len: 0,
            total_appended: 0,
            total_consumed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Unread bytes currently held.
    pub fn available(&self) -> usize {
        self.len
    }

    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    pub fn total_consumed(&self) -> u64 {
        self.total_consumed
    }

    /// Append bytes, growing the backing storage if free space is
    /// insufficient. Producer side only.
    pub fn append(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let needed = self.len + data.len();
        if needed > self.buf.len() {
            self.grow(needed);
        }

        let cap = self.buf.len();
        let tail = (self.head + self.len) % cap;
        let first = data.len().min(cap - tail);
        self.buf[tail..tail + first].copy_from_slice(&data[..first]);
        if first < data.len() {
            let second = data.len() - first;
            self.buf[..second].copy_from_slice(&data[first..]);
        }

        self.len += data.len();
        self.total_appended += data.len() as u64;
    }

    /// Copy up to `out.len()` unread bytes into `out`. Returns the byte
    /// count copied; 0 simply means no new data exists. Consumer side only.
    pub fn read_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        if n == 0 {
            return 0;
        }

        let cap = self.buf.len();
        let first = n.min(cap - self.head);
        out[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        if first < n {
            out[first..n].copy_from_slice(&self.buf[..n - first]);
        }

        self.head = (self.head + n) % cap;
        self.len -= n;
        self.total_consumed += n as u64;
        n
    }

    /// Discard all unread content (seek/reconnect). The discarded bytes
    /// count as consumed so the totals stay monotonic.
    pub fn reset(&mut self) {
        self.total_consumed += self.len as u64;
        self.head = 0;
        self.len = 0;
    }

    /// Copy-on-grow: re-linearize the unread region into a larger backing
    /// buffer. Never shrinks.
    fn grow(&mut self, needed: usize) {
        let new_cap = needed.next_power_of_two().max(self.buf.len() * 2);
        let mut new_buf = vec![0; new_cap];

        let cap = self.buf.len();
        let first = self.len.min(cap - self.head);
        new_buf[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        if first < self.len {
            new_buf[first..self.len].copy_from_slice(&self.buf[..self.len - first]);
        }

        self.buf = new_buf;
        self.head = 0;
    }
}

impl Default for ByteRing {
    fn default() -> Self {
        Self::new()
    }
}

struct SharedState {
    ring: ByteRing,
    closed: bool,
}

struct SharedInner {
    state: Mutex<SharedState>,
    data_available: Condvar,
}

/// Thread-safe wrapper for [`ByteRing`] with a data-available condition.
///
/// The producer appends and notifies; the consumer can block (with a
/// timeout) until bytes arrive. `close()` wakes any waiter so shutdown is
/// never stuck behind an empty ring.
#[derive(Clone)]
pub struct SharedByteRing {
    inner: Arc<SharedInner>,
}

impl SharedByteRing {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                state: Mutex::new(SharedState {
                    ring: ByteRing::with_capacity(capacity),
                    closed: false,
                }),
                data_available: Condvar::new(),
            }),
        }
    }

    pub fn append(&self, data: &[u8]) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.ring.append(data);
        drop(state);
        self.inner.data_available.notify_all();
    }

    pub fn read_into(&self, out: &mut [u8]) -> usize {
        self.inner.state.lock().ring.read_into(out)
    }

    pub fn available(&self) -> usize {
        self.inner.state.lock().ring.available()
    }

    pub fn total_appended(&self) -> u64 {
        self.inner.state.lock().ring.total_appended()
    }

    pub fn total_consumed(&self) -> u64 {
        self.inner.state.lock().ring.total_consumed()
    }

    pub fn reset(&self) {
        self.inner.state.lock().ring.reset();
        self.inner.data_available.notify_all();
    }

    /// Block until unread bytes exist, the ring is closed, or `timeout`
    /// elapses. Returns the bytes available on wake.
    pub fn wait_for_data(&self, timeout: Duration) -> usize {
        let mut state = self.inner.state.lock();
        if state.ring.available() > 0 || state.closed {
            return state.ring.available();
        }
        self.inner.data_available.wait_for(&mut state, timeout);
        state.ring.available()
    }

    /// Wake the consumer without appending (EOF and control-flag changes).
    pub fn wake(&self) {
        self.inner.data_available.notify_all();
    }

    /// Mark the ring closed and wake any waiter. Appends become no-ops.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.data_available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

impl Default for SharedByteRing {
    fn default() -> Self {
        Self::new()
    }
}
