//! Shared I2C bus
//!
//! Both expanders and the ADC hang off the same bus. Every transfer locks
//! the handle and selects the slave address first, so chips driven from
//! different poller threads never interleave on the wire.

use std::sync::Arc;

use parking_lot::Mutex;
use rppal::i2c::I2c;
use tracing::info;

use super::{HalError, Result};

struct BusInner {
    i2c: I2c,
    // Address currently selected, avoids an ioctl per transfer
    selected: Option<u16>,
}

impl BusInner {
    fn select(&mut self, address: u8) -> Result<()> {
        let address = u16::from(address);
        if self.selected != Some(address) {
            self.i2c.set_slave_address(address)?;
            self.selected = Some(address);
        }
        Ok(())
    }
}

/// Cloneable handle to one I2C bus
#[derive(Clone)]
pub struct I2cBus {
    inner: Arc<Mutex<BusInner>>,
}

impl I2cBus {
    /// Open `/dev/i2c-<bus>`
    pub fn open(bus: u8) -> Result<Self> {
        let i2c = I2c::with_bus(bus)?;
        info!(bus, clock_hz = ?i2c.clock_speed().ok(), "Opened I2C bus");

        Ok(Self {
            inner: Arc::new(Mutex::new(BusInner { i2c, selected: None })),
        })
    }

    /// Write a single 8-bit register
    pub fn write_register(&self, address: u8, register: u8, value: u8) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.select(address)?;
        inner.i2c.smbus_write_byte(register, value)?;
        Ok(())
    }

    /// Read a single 8-bit register
    pub fn read_register(&self, address: u8, register: u8) -> Result<u8> {
        let mut inner = self.inner.lock();
        inner.select(address)?;
        Ok(inner.i2c.smbus_read_byte(register)?)
    }

    /// Write raw bytes (register pointer followed by payload)
    pub fn write(&self, address: u8, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.select(address)?;
        let written = inner.i2c.write(bytes)?;
        check_written(address, written, bytes.len())
    }

    /// Write a register pointer then read back `buffer.len()` bytes
    pub fn write_read(&self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.select(address)?;
        inner.i2c.write_read(bytes, buffer)?;
        Ok(())
    }
}

/// A partial write leaves the chip with a truncated command
fn check_written(address: u8, written: usize, expected: usize) -> Result<()> {
    if written != expected {
        return Err(HalError::ShortWrite {
            address,
            written,
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_write_is_an_error() {
        assert!(check_written(0x48, 3, 3).is_ok());

        let err = check_written(0x48, 1, 3).unwrap_err();
        assert!(matches!(
            err,
            HalError::ShortWrite {
                address: 0x48,
                written: 1,
                expected: 3
            }
        ));
        assert!(err.to_string().contains("1 of 3"));
    }
}
