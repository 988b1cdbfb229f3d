//! MIDI message types
//!
//! Provides parsing of inbound channel messages and encoding of the
//! control-change / program-change messages the controller emits.

use std::fmt;

/// Highest value a MIDI data byte can carry
pub const DATA_MAX: u8 = 0x7F;

/// Bank select MSB controller number
pub const CC_BANK_MSB: u8 = 0;

/// Bank select LSB controller number
pub const CC_BANK_LSB: u8 = 32;

/// MIDI channel messages understood by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    ///
    /// Returns `None` for system messages, running status, truncated messages
    /// and data bytes with the high bit set. Inbound traffic that does not
    /// parse is dropped by the caller.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;

        // Running status or system messages are not used by the effect engine
        if status < 0x80 || status >= 0xF0 {
            return None;
        }

        let channel = status & 0x0F;
        let data_byte = |idx: usize| rest.get(idx).copied().filter(|b| *b <= DATA_MAX);

        match status & 0xF0 {
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: data_byte(0)?,
                value: data_byte(1)?,
            }),
            0xC0 => Some(MidiMessage::ProgramChange {
                channel,
                program: data_byte(0)?,
            }),
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & DATA_MAX, value & DATA_MAX]
            }
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & DATA_MAX]
            }
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
