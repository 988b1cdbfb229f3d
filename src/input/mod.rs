//! Input decoding
//!
//! Turns raw pin levels and voltages into semantic events. Every decoder
//! owns its pins and keeps its own state; none of them talk to the outputs.

pub mod encoder;
pub mod joystick;
pub mod keypad;
pub mod sequence;
pub mod switch;

pub use encoder::{Encoder, QuadratureDecoder, Rotation};
pub use joystick::{AnalogStick, AxisCalibration, StickCurve, StickMapper};
pub use keypad::{Key, Keypad, ReleaseTiming, ScanMode};
pub use sequence::{DigitAccumulator, SequenceCommand};
pub use switch::{Edge, Switch};
