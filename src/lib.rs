//! KleagMFX controller input engine
//!
//! Reads the physical controls of the multi-effect pedal (footswitches,
//! rotary encoders, a 4x4 keypad and an analog joystick, all behind
//! MCP23017 expanders and an ADS1115 ADC) and turns them into MIDI
//! messages for the effect engine and events for a virtual pointer.

pub mod board;
pub mod config;
pub mod dispatcher;
pub mod hal;
pub mod input;
pub mod midi;
pub mod output;
pub mod ports;
pub mod scheduler;
