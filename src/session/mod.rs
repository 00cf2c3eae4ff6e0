//! Voice call session state machine.

pub mod controller;
pub mod error;
pub mod state;
pub mod timer;

pub use controller::{CallController, CallControllerHandle, ControllerOptions, StartRequest};
pub use error::SessionError;
pub use state::{CallSession, CallStatus, Talking};
