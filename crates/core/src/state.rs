// Playback state machine: states, stop reasons, and the state lock

use crate::error::PlayerError;
use parking_lot::Mutex;
use std::sync::Arc;

/// Lifecycle states of a play session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Constructed, `start()` not yet called
    Initialized,
    /// `start()` called, worker threads being spun up
    Starting,
    /// Waiting for enough bytes/buffers to reach the pipeline-depth threshold
    WaitingForData,
    /// Buffers queued, waiting for the sink to confirm it is producing audio
    WaitingForSinkStart,
    /// Audible playback
    Playing,
    /// Underrun: the in-flight buffer count dropped to zero before EOF
    Buffering,
    /// Tearing down (see the accompanying [`StopReason`])
    Stopping,
    /// Terminal
    Stopped,
    /// Sink halted, buffers and ring retained for instant resume
    Paused,
}

/// Why a session is stopping or stopped.
///
/// Anything other than `None` is only ever paired with
/// [`PlayerState::Stopping`] or [`PlayerState::Stopped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    None,
    EndOfStream,
    UserAction,
    Error,
    /// Transient sink stop (seek); the session re-enters a live state after
    Temporary,
}

struct StateInner {
    state: PlayerState,
    stop_reason: StopReason,
    error: Option<PlayerError>,
}

/// Thread-safe container for state, stop reason, and the session error.
///
/// This is the "state lock" of the engine: every transition and every read
/// used by a public query goes through it, and it is never held across a
/// blocking call.
#[derive(Clone)]
pub struct StateContainer {
    inner: Arc<Mutex<StateInner>>,
}

impl StateContainer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StateInner {
                state: PlayerState::Initialized,
                stop_reason: StopReason::None,
                error: None,
            })),
        }
    }

    pub fn state(&self) -> PlayerState {
        self.inner.lock().state
    }

    pub fn stop_reason(&self) -> StopReason {
        self.inner.lock().stop_reason
    }

    pub fn error(&self) -> Option<PlayerError> {
        self.inner.lock().error.clone()
    }

    /// Move to a non-terminal state. Must not be used for `Stopping`/`Stopped`
    /// (those go through [`begin_stop`](Self::begin_stop) so a reason is
    /// always attached).
    pub fn set(&self, new_state: PlayerState) {
        debug_assert!(!matches!(
            new_state,
            PlayerState::Stopping | PlayerState::Stopped
        ));
        let mut inner = self.inner.lock();
        inner.state = new_state;
        inner.stop_reason = StopReason::None;
        log::debug!("player state -> {:?}", new_state);
    }

    /// Move to `new_state` only if currently in `expected`. Returns whether
    /// the transition happened.
    pub fn set_if(&self, expected: PlayerState, new_state: PlayerState) -> bool {
        debug_assert!(!matches!(
            new_state,
            PlayerState::Stopping | PlayerState::Stopped
        ));
        let mut inner = self.inner.lock();
        if inner.state != expected {
            return false;
        }
        inner.state = new_state;
        inner.stop_reason = StopReason::None;
        log::debug!("player state {:?} -> {:?}", expected, new_state);
        true
    }

    /// Enter `Stopping` with the given reason. Returns false if the session
    /// is already stopping or stopped (the first reason wins).
    pub fn begin_stop(&self, reason: StopReason) -> bool {
        debug_assert!(reason != StopReason::None);
        let mut inner = self.inner.lock();
        if matches!(inner.state, PlayerState::Stopping | PlayerState::Stopped) {
            return false;
        }
        inner.state = PlayerState::Stopping;
        inner.stop_reason = reason;
        log::debug!("player stopping ({:?})", reason);
        true
    }

    /// Complete a stop: `Stopping` -> `Stopped`, preserving the reason.
    pub fn finish_stop(&self) {
        let mut inner = self.inner.lock();
        if inner.state == PlayerState::Stopping {
            inner.state = PlayerState::Stopped;
            log::debug!("player stopped ({:?})", inner.stop_reason);
        }
    }

    /// Leave a `Temporary` stop (seek) and re-enter a live state, clearing
    /// the stop reason.
    pub fn reenter(&self, new_state: PlayerState) {
        debug_assert!(!matches!(
            new_state,
            PlayerState::Stopping | PlayerState::Stopped
        ));
        let mut inner = self.inner.lock();
        inner.state = new_state;
        inner.stop_reason = StopReason::None;
        log::debug!("player state -> {:?} (after temporary stop)", new_state);
    }

    /// Record the session error and enter `Stopping` with reason `Error`.
    ///
    /// Only the first failure takes effect; later calls return false and
    /// leave the stored error untouched.
    pub fn fail(&self, error: PlayerError) -> bool {
        let mut inner = self.inner.lock();
        if inner.error.is_some() {
            return false;
        }
        log::error!("player failed: {}", error);
        inner.error = Some(error);
        if inner.state != PlayerState::Stopped {
            inner.state = PlayerState::Stopping;
        }
        inner.stop_reason = StopReason::Error;
        true
    }

    /// Record the session error without forcing the stop reason. Used when a
    /// stream ends with no audio in it: the stop reason stays `EndOfStream`
    /// while `NoData` is surfaced as the error. First error wins.
    pub fn record_error(&self, error: PlayerError) -> bool {
        let mut inner = self.inner.lock();
        if inner.error.is_some() {
            return false;
        }
        log::error!("player error: {}", error);
        inner.error = Some(error);
        true
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().state != PlayerState::Initialized
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().state == PlayerState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().state == PlayerState::Paused
    }

    pub fn is_buffering(&self) -> bool {
        self.inner.lock().state == PlayerState::Buffering
    }

    pub fn did_fail(&self) -> bool {
        self.inner.lock().error.is_some()
    }

    pub fn is_finishing(&self) -> bool {
        self.inner.lock().state == PlayerState::Stopping
    }

    pub fn did_finish(&self) -> bool {
        let inner = self.inner.lock();
        inner.state == PlayerState::Stopped && inner.error.is_none()
    }
}

impl Default for StateContainer {
    fn default() -> Self {
        Self::new()
    }
}
