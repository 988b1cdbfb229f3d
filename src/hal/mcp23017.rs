//! MCP23017 16-bit I/O expander
//!
//! Pins 0-7 live on port A, 8-15 on port B. Direction, pull-up and output
//! latch registers are shadowed so that configuring or writing one pin never
//! clobbers its neighbours, even when several threads own pins on the same
//! chip.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::bus::I2cBus;
use super::{DigitalInput, DigitalOutput, HalError, InputPair, Result};

/// Number of pins on the chip
pub const PIN_COUNT: u8 = 16;

// Register map with IOCON.BANK = 0 (power-on default): port B = port A + 1
const IODIRA: u8 = 0x00;
const GPPUA: u8 = 0x0C;
const GPIOA: u8 = 0x12;
const OLATA: u8 = 0x14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Port {
    A,
    B,
}

impl Port {
    fn of(pin: u8) -> Port {
        if pin < 8 {
            Port::A
        } else {
            Port::B
        }
    }

    /// Register address for this port given the port A address
    fn register(self, base: u8) -> u8 {
        match self {
            Port::A => base,
            Port::B => base + 1,
        }
    }

    /// Byte of a 16-bit shadow that belongs to this port
    fn byte(self, shadow: u16) -> u8 {
        match self {
            Port::A => (shadow & 0xFF) as u8,
            Port::B => (shadow >> 8) as u8,
        }
    }
}

fn with_bit(reg: u16, pin: u8, set: bool) -> u16 {
    if set {
        reg | (1 << pin)
    } else {
        reg & !(1 << pin)
    }
}

#[derive(Debug)]
struct Shadow {
    iodir: u16,
    gppu: u16,
    olat: u16,
}

/// Handle to one MCP23017 chip; clones share the same shadow registers
#[derive(Clone)]
pub struct Mcp23017 {
    bus: I2cBus,
    address: u8,
    shadow: Arc<Mutex<Shadow>>,
}

impl Mcp23017 {
    /// Initialise the chip at `address`: every pin an input, no pull-ups,
    /// output latches LOW.
    pub fn new(bus: I2cBus, address: u8) -> Result<Self> {
        let chip = Self {
            bus,
            address,
            shadow: Arc::new(Mutex::new(Shadow {
                iodir: 0xFFFF,
                gppu: 0x0000,
                olat: 0x0000,
            })),
        };

        {
            let shadow = chip.shadow.lock();
            for port in [Port::A, Port::B] {
                chip.bus.write_register(address, port.register(OLATA), port.byte(shadow.olat))?;
                chip.bus.write_register(address, port.register(IODIRA), port.byte(shadow.iodir))?;
                chip.bus.write_register(address, port.register(GPPUA), port.byte(shadow.gppu))?;
            }
        }

        debug!(address = %format_args!("0x{:02X}", address), "MCP23017 initialised");
        Ok(chip)
    }

    fn check_pin(pin: u8) -> Result<()> {
        if pin >= PIN_COUNT {
            return Err(HalError::InvalidPin { pin, max: PIN_COUNT });
        }
        Ok(())
    }

    /// Configure `pin` as an input with the internal pull-up enabled
    pub fn input_pullup(&self, pin: u8) -> Result<ExpanderPin> {
        Self::check_pin(pin)?;
        let port = Port::of(pin);

        let mut shadow = self.shadow.lock();
        shadow.iodir = with_bit(shadow.iodir, pin, true);
        shadow.gppu = with_bit(shadow.gppu, pin, true);
        self.bus.write_register(self.address, port.register(IODIRA), port.byte(shadow.iodir))?;
        self.bus.write_register(self.address, port.register(GPPUA), port.byte(shadow.gppu))?;

        trace!(address = self.address, pin, "Pin configured as input with pull-up");
        Ok(ExpanderPin { chip: self.clone(), pin })
    }

    /// Configure `pin` as an output driven to `initial`
    ///
    /// The latch is written before the direction flips so the pin never
    /// glitches to the previous latch value.
    pub fn output(&self, pin: u8, initial: bool) -> Result<ExpanderPin> {
        Self::check_pin(pin)?;
        let port = Port::of(pin);

        let mut shadow = self.shadow.lock();
        shadow.olat = with_bit(shadow.olat, pin, initial);
        shadow.iodir = with_bit(shadow.iodir, pin, false);
        self.bus.write_register(self.address, port.register(OLATA), port.byte(shadow.olat))?;
        self.bus.write_register(self.address, port.register(IODIRA), port.byte(shadow.iodir))?;

        trace!(address = self.address, pin, initial, "Pin configured as output");
        Ok(ExpanderPin { chip: self.clone(), pin })
    }

    /// Configure `a` and `b` as pulled-up inputs sampled in one transfer
    pub fn input_pair(&self, a: u8, b: u8) -> Result<ExpanderPair> {
        self.input_pullup(a)?;
        self.input_pullup(b)?;
        Ok(ExpanderPair { chip: self.clone(), a, b })
    }

    /// Read the level of one pin
    pub fn read_pin(&self, pin: u8) -> Result<bool> {
        Self::check_pin(pin)?;
        let port = Port::of(pin);
        let value = self.bus.read_register(self.address, port.register(GPIOA))?;
        Ok(value & (1 << (pin % 8)) != 0)
    }

    /// Read both ports at once (bit n = pin n)
    pub fn read_all(&self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.bus.write_read(self.address, &[GPIOA], &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Drive one output pin
    pub fn write_pin(&self, pin: u8, high: bool) -> Result<()> {
        Self::check_pin(pin)?;
        let port = Port::of(pin);

        // Held across the bus write so concurrent writers apply in order
        let mut shadow = self.shadow.lock();
        shadow.olat = with_bit(shadow.olat, pin, high);
        self.bus.write_register(self.address, port.register(OLATA), port.byte(shadow.olat))
    }
}

/// A single configured pin on an expander
#[derive(Clone)]
pub struct ExpanderPin {
    chip: Mcp23017,
    pin: u8,
}

impl std::fmt::Debug for ExpanderPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpanderPin")
            .field("address", &format_args!("0x{:02X}", self.chip.address))
            .field("pin", &self.pin)
            .finish()
    }
}

impl DigitalInput for ExpanderPin {
    fn read(&mut self) -> Result<bool> {
        self.chip.read_pin(self.pin)
    }
}

impl DigitalOutput for ExpanderPin {
    fn write(&mut self, high: bool) -> Result<()> {
        self.chip.write_pin(self.pin, high)
    }
}

/// Levels of pins `a` and `b` in a port snapshot
fn pair_levels(port: u16, a: u8, b: u8) -> (bool, bool) {
    (port & (1 << a) != 0, port & (1 << b) != 0)
}

/// Two input pins of one expander read from a single GPIO snapshot
#[derive(Clone)]
pub struct ExpanderPair {
    chip: Mcp23017,
    a: u8,
    b: u8,
}

impl std::fmt::Debug for ExpanderPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpanderPair")
            .field("address", &format_args!("0x{:02X}", self.chip.address))
            .field("pins", &(self.a, self.b))
            .finish()
    }
}

impl InputPair for ExpanderPair {
    fn read_pair(&mut self) -> Result<(bool, bool)> {
        let port = self.chip.read_all()?;
        Ok(pair_levels(port, self.a, self.b))
    }
}
