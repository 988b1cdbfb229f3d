//! Outbound message sinks
//!
//! The dispatcher never talks to a transport directly: it pushes MIDI
//! messages and pointer events into these channels, and the transport
//! adapters in [`crate::ports`] drain them in order.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::midi::MidiMessage;

/// Pointer button roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    Left,
    Middle,
    Right,
}

/// Event for the virtual pointer device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Motion { dx: i32, dy: i32 },
    Button { button: PointerButton, pressed: bool },
}

/// Sending half of both output channels
#[derive(Debug, Clone)]
pub struct OutputSinks {
    midi: mpsc::UnboundedSender<MidiMessage>,
    pointer: mpsc::UnboundedSender<PointerEvent>,
}

/// Receiving half, handed to the transport adapters
#[derive(Debug)]
pub struct OutputReceivers {
    pub midi: mpsc::UnboundedReceiver<MidiMessage>,
    pub pointer: mpsc::UnboundedReceiver<PointerEvent>,
}

impl OutputSinks {
    /// Create both channels
    pub fn channel() -> (Self, OutputReceivers) {
        let (midi_tx, midi_rx) = mpsc::unbounded_channel();
        let (pointer_tx, pointer_rx) = mpsc::unbounded_channel();
        (
            Self {
                midi: midi_tx,
                pointer: pointer_tx,
            },
            OutputReceivers {
                midi: midi_rx,
                pointer: pointer_rx,
            },
        )
    }

    /// Queue a MIDI message; a closed channel is logged and ignored
    pub fn send_midi(&self, msg: MidiMessage) {
        if self.midi.send(msg).is_err() {
            warn!(%msg, "MIDI output closed, message dropped");
        }
    }

    /// Queue a pointer event; a closed channel is logged and ignored
    pub fn send_pointer(&self, event: PointerEvent) {
        if self.pointer.send(event).is_err() {
            warn!(?event, "Pointer output closed, event dropped");
        }
    }
}
