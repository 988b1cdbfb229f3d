//! Analog stick processing (calibration, dead zone, power curve)
//!
//! Voltages from the ADC are centred and normalised to [-1, 1], then mapped
//! to a pointer velocity. Two curve strategies are supported:
//!
//! - [`StickCurve::Radial`]: dead zone and curve applied to the vector
//!   magnitude, direction preserved. Diagonals feel the same as straight
//!   pushes.
//! - [`StickCurve::PerAxis`]: each axis processed on its own (square dead
//!   zone). Easier to hold a perfectly horizontal or vertical motion.

use serde::{Deserialize, Serialize};

use crate::hal::{AnalogInput, Result};

/// Deflection at which the derived power curve yields one unit per tick
const UNIT_DEFLECTION: f32 = 0.02;

/// Curve strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickCurve {
    #[default]
    Radial,
    PerAxis,
}

/// Centre and normalise a voltage reading
///
/// `(voltage - center) / center`, clamped to [-1, 1].
pub fn normalize(voltage: f32, center: f32) -> f32 {
    if center <= 0.0 {
        return 0.0;
    }
    ((voltage - center) / center).clamp(-1.0, 1.0)
}

/// Exponent for which `sensitivity * 0.02^power == 1`
///
/// Gives a one-pixel step at 2 % deflection whatever the sensitivity.
pub fn derive_power(sensitivity: f32) -> f32 {
    (1.0 / sensitivity).ln() / UNIT_DEFLECTION.ln()
}

/// Maps normalised stick deflection to velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickMapper {
    pub dead_zone: f32,
    pub power: f32,
    pub sensitivity: f32,
    pub curve: StickCurve,
}

impl StickMapper {
    /// Rescale `[dead_zone, 1]` to `[0, 1]` then apply the power curve
    fn shape(&self, magnitude: f32) -> f32 {
        let scaled = (magnitude - self.dead_zone) / (1.0 - self.dead_zone);
        scaled.powf(self.power) * self.sensitivity
    }

    fn axis(&self, value: f32) -> f32 {
        if value.abs() < self.dead_zone {
            return 0.0;
        }
        self.shape(value.abs()).copysign(value)
    }

    /// Velocity for a normalised position; exactly zero inside the dead zone
    pub fn velocity(&self, x: f32, y: f32) -> (f32, f32) {
        match self.curve {
            StickCurve::Radial => {
                let magnitude = (x * x + y * y).sqrt();
                if magnitude < self.dead_zone || magnitude == 0.0 {
                    return (0.0, 0.0);
                }
                let speed = self.shape(magnitude);
                (x / magnitude * speed, y / magnitude * speed)
            }
            StickCurve::PerAxis => (self.axis(x), self.axis(y)),
        }
    }
}

/// Truncate a velocity to relative pointer motion
///
/// Returns `None` when both components truncate to zero.
pub fn to_motion((vx, vy): (f32, f32)) -> Option<(i32, i32)> {
    let (dx, dy) = (vx as i32, vy as i32);
    if dx == 0 && dy == 0 {
        None
    } else {
        Some((dx, dy))
    }
}

/// Per-axis calibration and orientation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisCalibration {
    pub center: f32,
    pub invert: bool,
}

/// A two-axis analog stick on a pair of ADC channels
pub struct AnalogStick<A> {
    x: A,
    y: A,
    x_cal: AxisCalibration,
    y_cal: AxisCalibration,
    mapper: StickMapper,
}

impl<A: AnalogInput> AnalogStick<A> {
    pub fn new(x: A, y: A, x_cal: AxisCalibration, y_cal: AxisCalibration, mapper: StickMapper) -> Self {
        Self {
            x,
            y,
            x_cal,
            y_cal,
            mapper,
        }
    }

    /// Normalised position, inversion applied
    pub fn position(&mut self) -> Result<(f32, f32)> {
        let x = normalize(self.x.read()?, self.x_cal.center);
        let y = normalize(self.y.read()?, self.y_cal.center);
        Ok((
            if self.x_cal.invert { -x } else { x },
            if self.y_cal.invert { -y } else { y },
        ))
    }

    /// Current velocity
    pub fn read(&mut self) -> Result<(f32, f32)> {
        let (x, y) = self.position()?;
        Ok(self.mapper.velocity(x, y))
    }
}
