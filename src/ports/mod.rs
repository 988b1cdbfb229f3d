//! Transport adapters
//!
//! Thin bridges from the output sinks to OS facilities: the ALSA sequencer
//! for MIDI and `/dev/uinput` for the pointer.

pub mod midi;
pub mod pointer;

pub use midi::MidiLink;
pub use pointer::{PointerDevice, UinputPointer};
