//! Output dispatcher
//!
//! Shared control state lives in a single actor task:
//!
//! - [`state`]: pure toggle/encoder logic returning ordered side effects
//! - [`commands`]: messages accepted by the actor
//! - [`actor`]: the task applying effects to LEDs and output sinks
//! - [`handle`]: cloneable, thread-safe front end

pub mod actor;
pub mod commands;
pub mod handle;
pub mod state;

pub use actor::{DispatcherActor, Indicators, PendingDispatcher};
pub use handle::DispatcherHandle;
pub use state::{ControlSnapshot, ControlState, DispatchSettings, EncoderSlot};
