// Core types for the Brook streaming playback engine

pub mod callback;
pub mod error;
pub mod state;

// Re-export commonly used types
pub use callback::{CallbackManager, Event, PlayerCallback};
pub use error::{PlayerError, Result};
pub use state::{PlayerState, StateContainer, StopReason};
