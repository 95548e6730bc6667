// Observer callbacks for player events
// Delivery is best-effort and never part of engine correctness.

use crate::error::PlayerError;
use crate::state::PlayerState;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Player event types.
///
/// Observers receive the whole vocabulary and ignore what they do not care
/// about (matching on the enum takes the place of optional methods).
#[derive(Debug, Clone)]
pub enum Event {
    /// Player state changed
    StateChanged {
        old_state: PlayerState,
        new_state: PlayerState,
    },

    /// The sink confirmed it is producing audio for the first time
    PlaybackBegan,

    /// Underrun: playback stalled waiting for data
    BufferingStarted,

    /// The pipeline refilled after an underrun
    BufferingFinished,

    /// Pause/resume toggled
    PlayStatusChanged { paused: bool },

    /// The last bytes of the stream have been parsed; playback will end soon
    WillFinishPlaying,

    /// Playback ended; `reached_end` is false for user stops and failures
    FinishedPlaying { reached_end: bool },

    /// The full stream was tee'd to a durable path during playback
    CachedToPath { path: PathBuf },

    /// The session failed; fired at most once
    Failed { error: PlayerError },

    /// An external interruption began; `did_pause` is true if it paused us
    InterruptionBegan { did_pause: bool },

    /// The interruption ended
    InterruptionEnded,
}

/// Player callback trait.
/// Implementations should be lightweight and non-blocking; they are invoked
/// from engine worker threads.
pub trait PlayerCallback: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Fan-out to any number of registered observers.
pub struct CallbackManager {
    callbacks: Mutex<Vec<Arc<dyn PlayerCallback>>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn add_callback(&self, callback: Arc<dyn PlayerCallback>) {
        self.callbacks.lock().push(callback);
    }

    pub fn clear_callbacks(&self) {
        self.callbacks.lock().clear();
    }

    pub fn dispatch(&self, event: Event) {
        log::debug!("dispatching event: {:?}", event);
        // Snapshot under the lock, invoke outside it: an observer may call
        // back into the player.
        let callbacks = self.callbacks.lock().clone();
        for callback in callbacks.iter() {
            callback.on_event(&event);
        }
    }
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new()
    }
}
