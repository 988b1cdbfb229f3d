//! Quadrature rotary encoder decoding
//!
//! The two-bit Gray code `(clk << 1) | dt` is sampled every poll. Each change
//! is combined with the previous sample into a four-bit transition code; the
//! eight codes of a valid quarter step decide the direction, anything else
//! (a skipped state, a bounce) yields nothing. The previous sample is always
//! advanced to the current one so the decoder re-synchronises after noise.

use tracing::trace;

use super::switch::Switch;
use crate::hal::{InputPair, Result};

/// Transition codes `(last << 2) | current` of one clockwise quarter step
const CW_CODES: [u8; 4] = [0b0010, 0b1011, 0b1101, 0b0100];
/// Transition codes of one counter-clockwise quarter step
const CCW_CODES: [u8; 4] = [0b0001, 0b0111, 0b1110, 0b1000];

/// Direction of one detected tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

impl Rotation {
    /// +1 for clockwise, -1 for counter-clockwise
    pub fn delta(self) -> i8 {
        match self {
            Rotation::Clockwise => 1,
            Rotation::CounterClockwise => -1,
        }
    }
}

/// Classify a transition code
pub fn classify(code: u8) -> Option<Rotation> {
    if CW_CODES.contains(&code) {
        Some(Rotation::Clockwise)
    } else if CCW_CODES.contains(&code) {
        Some(Rotation::CounterClockwise)
    } else {
        None
    }
}

/// Pure quadrature state machine
#[derive(Debug, Clone, Copy)]
pub struct QuadratureState {
    last: u8,
}

impl QuadratureState {
    pub fn new(clk: bool, dt: bool) -> Self {
        Self {
            last: gray(clk, dt),
        }
    }

    /// Last accepted two-bit state
    pub fn last(&self) -> u8 {
        self.last
    }

    /// Feed one sample
    pub fn step(&mut self, clk: bool, dt: bool) -> Option<Rotation> {
        let current = gray(clk, dt);
        if current == self.last {
            return None;
        }

        let code = (self.last << 2) | current;
        self.last = current;

        let rotation = classify(code);
        if rotation.is_none() {
            trace!(code = %format_args!("{:04b}", code), "Ignored quadrature transition");
        }
        rotation
    }
}

fn gray(clk: bool, dt: bool) -> u8 {
    (u8::from(clk) << 1) | u8::from(dt)
}

/// Decoder reading CLK/DT as one `(clk, dt)` pair
///
/// Both levels must come from the same snapshot: reading them apart lets
/// the shaft move between the reads, which decodes as the wrong direction.
pub struct QuadratureDecoder<Q> {
    pins: Q,
    state: QuadratureState,
}

impl<Q: InputPair> QuadratureDecoder<Q> {
    pub fn new(mut pins: Q) -> Result<Self> {
        let (clk, dt) = pins.read_pair()?;
        Ok(Self {
            pins,
            state: QuadratureState::new(clk, dt),
        })
    }

    /// Read both pins and decode
    pub fn sample(&mut self) -> Result<Option<Rotation>> {
        let (clk, dt) = self.pins.read_pair()?;
        Ok(self.state.step(clk, dt))
    }
}

/// One physical encoder: decoder, push switch and its controller number
pub struct Encoder<Q, P> {
    /// Position in the configured encoder list
    pub index: usize,
    pub cc: u8,
    pub decoder: QuadratureDecoder<Q>,
    pub switch: Switch<P>,
}
