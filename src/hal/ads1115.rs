//! ADS1115 16-bit ADC, single-shot single-ended conversions

use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use super::bus::I2cBus;
use super::{AnalogInput, HalError, Result};

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

const OS_START: u16 = 0x8000;
const PGA_4_096V: u16 = 0x0200;
const MODE_SINGLE_SHOT: u16 = 0x0100;
const DR_128SPS: u16 = 0x0080;
const COMP_DISABLE: u16 = 0x0003;

/// Full-scale range for the ±4.096 V gain setting
pub const FULL_SCALE_VOLTS: f32 = 4.096;

/// A conversion at 128 SPS takes ~8 ms; give up well after that
const CONVERSION_TIMEOUT: Duration = Duration::from_millis(50);

/// Config word starting a single-shot conversion on `channel` against GND
fn config_word(channel: u8) -> u16 {
    let mux = u16::from(4 + channel) << 12;
    OS_START | mux | PGA_4_096V | MODE_SINGLE_SHOT | DR_128SPS | COMP_DISABLE
}

/// Convert a raw conversion result to volts
pub fn raw_to_volts(raw: i16) -> f32 {
    f32::from(raw) * FULL_SCALE_VOLTS / 32768.0
}

/// Handle to one ADS1115 chip
#[derive(Clone)]
pub struct Ads1115 {
    bus: I2cBus,
    address: u8,
}

impl Ads1115 {
    pub fn new(bus: I2cBus, address: u8) -> Self {
        Self { bus, address }
    }

    /// Single-ended channel `channel` (0-3)
    pub fn channel(&self, channel: u8) -> Result<AdcChannel> {
        if channel > 3 {
            return Err(HalError::InvalidChannel(channel));
        }
        Ok(AdcChannel {
            adc: self.clone(),
            channel,
        })
    }

    /// Run one conversion and return the raw signed result
    pub fn read_raw(&self, channel: u8) -> Result<i16> {
        if channel > 3 {
            return Err(HalError::InvalidChannel(channel));
        }

        let config = config_word(channel).to_be_bytes();
        self.bus.write(self.address, &[REG_CONFIG, config[0], config[1]])?;

        // OS bit reads back 1 once the conversion is done
        let started = Instant::now();
        loop {
            let mut buf = [0u8; 2];
            self.bus.write_read(self.address, &[REG_CONFIG], &mut buf)?;
            if u16::from_be_bytes(buf) & OS_START != 0 {
                break;
            }
            if started.elapsed() > CONVERSION_TIMEOUT {
                return Err(HalError::ConversionTimeout { address: self.address });
            }
            thread::sleep(Duration::from_millis(1));
        }

        let mut buf = [0u8; 2];
        self.bus.write_read(self.address, &[REG_CONVERSION], &mut buf)?;
        let raw = i16::from_be_bytes(buf);
        trace!(address = self.address, channel, raw, "ADC conversion");
        Ok(raw)
    }
}

/// One single-ended input of an [`Ads1115`]
#[derive(Clone)]
pub struct AdcChannel {
    adc: Ads1115,
    channel: u8,
}

impl AnalogInput for AdcChannel {
    fn read(&mut self) -> Result<f32> {
        self.adc.read_raw(self.channel).map(raw_to_volts)
    }
}
