//! Control state owned by the dispatcher
//!
//! Pure logic: every operation mutates the state and returns the side
//! effects (indicator writes, outbound MIDI) in the order they must be
//! applied. The actor applies them; tests inspect them directly.

use tracing::{debug, info, warn};

use crate::input::Rotation;
use crate::midi::{MidiMessage, CC_BANK_LSB, CC_BANK_MSB, DATA_MAX};

/// Start value of every encoder cache entry
pub const ENCODER_INITIAL: u8 = 64;

/// Fixed parameters of the MIDI mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Outbound MIDI channel (0-15)
    pub channel: u8,
    /// CC number of toggle 0; toggle i uses `toggle_base_cc + i`
    pub toggle_base_cc: u8,
    /// Value sent on CC#0 before a bank change
    pub bank_msb: u8,
    /// Encoder value change per tick
    pub encoder_step: u8,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            channel: 0,
            toggle_base_cc: 64,
            bank_msb: 2,
            encoder_step: 5,
        }
    }
}

/// Side effect produced by a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Indicator { index: usize, on: bool },
    Midi(MidiMessage),
}

/// Cached MIDI value of one encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSlot {
    pub cc: u8,
    pub value: u8,
}

/// Point-in-time copy of the control state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSnapshot {
    pub toggles: Vec<bool>,
    pub encoders: Vec<EncoderSlot>,
}

/// Toggle array and encoder cache
#[derive(Debug)]
pub struct ControlState {
    settings: DispatchSettings,
    toggles: Vec<bool>,
    encoders: Vec<EncoderSlot>,
}

impl ControlState {
    /// `toggle_count` toggles all off, one cache entry per encoder CC
    pub fn new(settings: DispatchSettings, toggle_count: usize, encoder_ccs: &[u8]) -> Self {
        Self {
            settings,
            toggles: vec![false; toggle_count],
            encoders: encoder_ccs
                .iter()
                .map(|&cc| EncoderSlot {
                    cc,
                    value: ENCODER_INITIAL,
                })
                .collect(),
        }
    }

    pub fn toggle_count(&self) -> usize {
        self.toggles.len()
    }

    fn cc(&self, cc: u8, value: u8) -> Effect {
        Effect::Midi(MidiMessage::ControlChange {
            channel: self.settings.channel,
            cc,
            value,
        })
    }

    fn program(&self, program: u8) -> Effect {
        Effect::Midi(MidiMessage::ProgramChange {
            channel: self.settings.channel,
            program,
        })
    }

    /// Flip toggle `index`, light its indicator and report the new state
    pub fn toggle_effect(&mut self, index: usize) -> Vec<Effect> {
        let Some(state) = self.toggles.get_mut(index) else {
            debug!(index, "Toggle index out of range, ignored");
            return Vec::new();
        };

        *state = !*state;
        let on = *state;
        info!(index, on, "Effect toggled");

        let cc = self.settings.toggle_base_cc.saturating_add(index as u8);
        vec![Effect::Indicator { index, on }, self.cc(cc, if on { DATA_MAX } else { 0 })]
    }

    /// Step encoder `encoder` one tick; emits only when the value moved
    pub fn encoder_tick(&mut self, encoder: usize, rotation: Rotation) -> Vec<Effect> {
        let step = i16::from(self.settings.encoder_step);
        let Some(slot) = self.encoders.get_mut(encoder) else {
            debug!(encoder, "Encoder index out of range, ignored");
            return Vec::new();
        };

        let next = (i16::from(slot.value) + i16::from(rotation.delta()) * step).clamp(0, i16::from(DATA_MAX)) as u8;
        if next == slot.value {
            return Vec::new();
        }

        slot.value = next;
        let cc = slot.cc;
        debug!(encoder, cc, value = next, "Encoder adjusted");
        vec![self.cc(cc, next)]
    }

    /// Turn every toggle and indicator off
    fn reset_toggles(&mut self) -> Vec<Effect> {
        self.toggles.iter_mut().for_each(|t| *t = false);
        (0..self.toggles.len())
            .map(|index| Effect::Indicator { index, on: false })
            .collect()
    }

    /// Reset toggles, then bank select (CC#0, CC#32) and program 0
    pub fn select_bank(&mut self, bank: u8) -> Vec<Effect> {
        if bank > DATA_MAX {
            warn!(bank, "Bank out of MIDI range, ignored");
            return Vec::new();
        }

        info!(bank, "Selecting bank");
        let mut effects = self.reset_toggles();
        effects.push(self.cc(CC_BANK_MSB, self.settings.bank_msb));
        effects.push(self.cc(CC_BANK_LSB, bank));
        effects.push(self.program(0));
        effects
    }

    /// Reset toggles, then program change `preset`
    pub fn select_preset(&mut self, preset: u16) -> Vec<Effect> {
        let Some(program) = u8::try_from(preset).ok().filter(|p| *p <= DATA_MAX) else {
            warn!(preset, "Preset out of MIDI range, ignored");
            return Vec::new();
        };

        info!(preset, "Selecting preset");
        let mut effects = self.reset_toggles();
        effects.push(self.program(program));
        effects
    }

    /// Mirror inbound CC into local state without re-emitting anything
    pub fn apply_inbound(&mut self, msg: &MidiMessage) -> Vec<Effect> {
        let MidiMessage::ControlChange { cc, value, .. } = *msg else {
            debug!(%msg, "Inbound message ignored");
            return Vec::new();
        };

        let mut effects = Vec::new();

        let base = self.settings.toggle_base_cc;
        if let Some(index) = cc.checked_sub(base).map(usize::from) {
            if let Some(state) = self.toggles.get_mut(index) {
                *state = value > 0;
                debug!(index, on = *state, "Toggle synced from inbound CC");
                effects.push(Effect::Indicator { index, on: *state });
            }
        }

        for (encoder, slot) in self.encoders.iter_mut().enumerate() {
            if slot.cc == cc {
                slot.value = value;
                debug!(encoder, cc, value, "Encoder synced from inbound CC");
            }
        }

        effects
    }

    /// Current value of every encoder, as CC messages
    pub fn announce(&self) -> Vec<Effect> {
        self.encoders.iter().map(|slot| self.cc(slot.cc, slot.value)).collect()
    }

    /// Every indicator off, used on shutdown
    pub fn indicators_off(&self) -> Vec<Effect> {
        (0..self.toggles.len())
            .map(|index| Effect::Indicator { index, on: false })
            .collect()
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            toggles: self.toggles.clone(),
            encoders: self.encoders.clone(),
        }
    }
}
