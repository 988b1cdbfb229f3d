//! Hardware capability interfaces
//!
//! Decoders only ever see these traits. The concrete chips
//! ([`mcp23017`], [`ads1115`]) implement them on top of the shared I2C
//! [`bus`], and tests implement them with [`mock`] pins.

pub mod ads1115;
pub mod bus;
pub mod mcp23017;

#[cfg(test)]
pub(crate) mod mock;

pub use ads1115::{AdcChannel, Ads1115};
pub use bus::I2cBus;
pub use mcp23017::{ExpanderPair, ExpanderPin, Mcp23017};

/// Errors raised by pin and channel access
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    /// The underlying I2C transfer failed
    #[error("I2C bus error: {0}")]
    Bus(#[from] rppal::i2c::Error),

    /// Pin number outside the chip's range
    #[error("Invalid pin {pin} (chip has {max} pins)")]
    InvalidPin { pin: u8, max: u8 },

    /// ADC channel outside the chip's range
    #[error("Invalid ADC channel {0}")]
    InvalidChannel(u8),

    /// The ADC never reported a finished conversion
    #[error("ADC at 0x{address:02X} did not finish conversion")]
    ConversionTimeout { address: u8 },

    /// The bus accepted fewer bytes than were sent
    #[error("Short I2C write to 0x{address:02X}: {written} of {expected} bytes")]
    ShortWrite { address: u8, written: usize, expected: usize },

    /// Source temporarily unavailable
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for hardware access
pub type Result<T> = std::result::Result<T, HalError>;

/// A digital input level (true = HIGH)
///
/// Only one owner per pin: pollers own their inputs exclusively.
pub trait DigitalInput: Send {
    /// Read the current logic level
    fn read(&mut self) -> Result<bool>;
}

/// A digital output driver
pub trait DigitalOutput: Send {
    /// Drive the output HIGH (`true`) or LOW (`false`)
    fn write(&mut self, high: bool) -> Result<()>;
}

/// Two digital inputs sampled together
///
/// Chips that can latch both levels in one transfer return a consistent
/// snapshot; the tuple impl reads the inputs one after the other.
pub trait InputPair: Send {
    /// Read both levels (true = HIGH)
    fn read_pair(&mut self) -> Result<(bool, bool)>;
}

/// An analog input channel reporting volts
pub trait AnalogInput: Send {
    /// Read the current voltage
    fn read(&mut self) -> Result<f32>;
}

impl<T: DigitalInput + ?Sized> DigitalInput for Box<T> {
    fn read(&mut self) -> Result<bool> {
        (**self).read()
    }
}

impl<T: DigitalOutput + ?Sized> DigitalOutput for Box<T> {
    fn write(&mut self, high: bool) -> Result<()> {
        (**self).write(high)
    }
}

impl<T: InputPair + ?Sized> InputPair for Box<T> {
    fn read_pair(&mut self) -> Result<(bool, bool)> {
        (**self).read_pair()
    }
}

impl<A: DigitalInput, B: DigitalInput> InputPair for (A, B) {
    fn read_pair(&mut self) -> Result<(bool, bool)> {
        Ok((self.0.read()?, self.1.read()?))
    }
}

impl<T: AnalogInput + ?Sized> AnalogInput for Box<T> {
    fn read(&mut self) -> Result<f32> {
        (**self).read()
    }
}
