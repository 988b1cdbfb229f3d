//! Command enum for the dispatcher actor
//!
//! Hot path commands come from poller threads and the MIDI input callback
//! and never wait for an answer. Queries and shutdown carry a oneshot
//! sender for the reply.

use tokio::sync::oneshot;

use super::state::ControlSnapshot;
use crate::input::Rotation;
use crate::midi::MidiMessage;
use crate::output::PointerButton;

/// Commands processed by the dispatcher actor, in arrival order
pub enum DispatchCommand {
    // -------------------------------------------------------------------------
    // Hot path (fire and forget)
    // -------------------------------------------------------------------------
    /// A toggle button was pressed
    ToggleEffect { index: usize },

    /// An encoder produced one tick
    EncoderTick { encoder: usize, rotation: Rotation },

    /// Bank key on the keypad
    SelectBank { bank: u8 },

    /// Preset committed by the digit accumulator
    SelectPreset { preset: u16 },

    /// Relative pointer movement
    PointerMotion { dx: i32, dy: i32 },

    /// Pointer button edge
    PointerButton { button: PointerButton, pressed: bool },

    /// Message received from the effect engine
    Inbound(MidiMessage),

    /// Send the current encoder values
    Announce,

    // -------------------------------------------------------------------------
    // Request-response
    // -------------------------------------------------------------------------
    /// Copy of the control state
    Snapshot {
        response: oneshot::Sender<ControlSnapshot>,
    },

    /// Force every output off and stop; replies once outputs are safe
    Shutdown { done: oneshot::Sender<()> },
}

// Manual Debug implementation because oneshot senders carry no useful detail
impl std::fmt::Debug for DispatchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchCommand::ToggleEffect { index } => {
                f.debug_struct("ToggleEffect").field("index", index).finish()
            }
            DispatchCommand::EncoderTick { encoder, rotation } => f
                .debug_struct("EncoderTick")
                .field("encoder", encoder)
                .field("rotation", rotation)
                .finish(),
            DispatchCommand::SelectBank { bank } => {
                f.debug_struct("SelectBank").field("bank", bank).finish()
            }
            DispatchCommand::SelectPreset { preset } => {
                f.debug_struct("SelectPreset").field("preset", preset).finish()
            }
            DispatchCommand::PointerMotion { dx, dy } => f
                .debug_struct("PointerMotion")
                .field("dx", dx)
                .field("dy", dy)
                .finish(),
            DispatchCommand::PointerButton { button, pressed } => f
                .debug_struct("PointerButton")
                .field("button", button)
                .field("pressed", pressed)
                .finish(),
            DispatchCommand::Inbound(msg) => f.debug_tuple("Inbound").field(msg).finish(),
            DispatchCommand::Announce => write!(f, "Announce"),
            DispatchCommand::Snapshot { .. } => f.debug_struct("Snapshot").finish_non_exhaustive(),
            DispatchCommand::Shutdown { .. } => f.debug_struct("Shutdown").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_debug() {
        let cmd = DispatchCommand::EncoderTick {
            encoder: 2,
            rotation: Rotation::Clockwise,
        };
        let debug_str = format!("{:?}", cmd);
        assert!(debug_str.contains("EncoderTick"));
        assert!(debug_str.contains("Clockwise"));

        let (tx, _rx) = oneshot::channel();
        let cmd = DispatchCommand::Snapshot { response: tx };
        assert!(format!("{:?}", cmd).contains("Snapshot"));

        assert_eq!(format!("{:?}", DispatchCommand::Announce), "Announce");
    }
}
