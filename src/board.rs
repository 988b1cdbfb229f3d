//! Board assembly
//!
//! Turns an [`AppConfig`] into owned devices: switches, decoders, the
//! keypad scanner, the analog stick and the indicator outputs. Pins come
//! from a [`PinSource`], which is the I2C chips on the real board.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::{AppConfig, PinRef};
use crate::dispatcher::{DispatcherHandle, Indicators};
use crate::hal::{self, Ads1115, DigitalOutput, HalError, I2cBus, Mcp23017};
use crate::input::{
    AnalogStick, AxisCalibration, DigitAccumulator, Encoder, Keypad, QuadratureDecoder, ReleaseTiming, StickMapper,
    Switch,
};
use crate::scheduler::pollers::{AnalogPin, AuxButton, InputPin, QuadPins};
use crate::scheduler::{EncoderPoller, JoystickPoller, KeypadPoller, PollScheduler};

/// Hands out configured pins and ADC channels
pub trait PinSource {
    fn input_pullup(&mut self, pin: &PinRef) -> hal::Result<InputPin>;
    /// Two pulled-up inputs on the same expander, sampled together
    fn input_pair(&mut self, expander: &str, a: u8, b: u8) -> hal::Result<QuadPins>;
    fn output(&mut self, pin: &PinRef, initial: bool) -> hal::Result<Box<dyn DigitalOutput>>;
    fn analog(&mut self, channel: u8) -> hal::Result<AnalogPin>;
}

/// Expanders and ADC on the shared I2C bus
pub struct I2cPins {
    expanders: HashMap<String, Mcp23017>,
    adc: Ads1115,
}

impl I2cPins {
    /// Open the bus and initialise every configured expander
    pub fn open(config: &AppConfig) -> Result<Self> {
        let bus = I2cBus::open(config.i2c_bus).with_context(|| format!("Failed to open I2C bus {}", config.i2c_bus))?;

        let mut expanders = HashMap::new();
        for expander in &config.expanders {
            let chip = Mcp23017::new(bus.clone(), expander.address).with_context(|| {
                format!(
                    "Failed to initialise expander '{}' at 0x{:02X}",
                    expander.name, expander.address
                )
            })?;
            info!(name = %expander.name, address = %format_args!("0x{:02X}", expander.address), "Expander ready");
            expanders.insert(expander.name.clone(), chip);
        }

        Ok(Self {
            expanders,
            adc: Ads1115::new(bus, config.adc_address),
        })
    }

    fn chip(&self, name: &str) -> hal::Result<&Mcp23017> {
        self.expanders
            .get(name)
            .ok_or_else(|| HalError::Unavailable(format!("unknown expander '{}'", name)))
    }
}

impl PinSource for I2cPins {
    fn input_pullup(&mut self, pin: &PinRef) -> hal::Result<InputPin> {
        Ok(Box::new(self.chip(&pin.expander)?.input_pullup(pin.pin)?))
    }

    fn input_pair(&mut self, expander: &str, a: u8, b: u8) -> hal::Result<QuadPins> {
        Ok(Box::new(self.chip(expander)?.input_pair(a, b)?))
    }

    fn output(&mut self, pin: &PinRef, initial: bool) -> hal::Result<Box<dyn DigitalOutput>> {
        Ok(Box::new(self.chip(&pin.expander)?.output(pin.pin, initial)?))
    }

    fn analog(&mut self, channel: u8) -> hal::Result<AnalogPin> {
        Ok(Box::new(self.adc.channel(channel)?))
    }
}

/// Polled inputs, not yet handed to the scheduler
pub struct BoardInputs {
    pub toggles: Vec<Switch<InputPin>>,
    /// Encoders tagged with the expander they sit on
    pub encoders: Vec<(String, Encoder<QuadPins, InputPin>)>,
    pub keypad: Option<Keypad>,
    pub joystick: Option<(AnalogStick<AnalogPin>, Option<Switch<InputPin>>)>,
}

/// Everything built from the configuration
pub struct Board {
    pub indicators: Indicators,
    pub encoder_ccs: Vec<u8>,
    pub inputs: BoardInputs,
}

impl Board {
    /// Claim and initialise every configured pin
    pub fn build(config: &AppConfig, pins: &mut dyn PinSource) -> Result<Self> {
        let mut toggles = Vec::with_capacity(config.toggles.len());
        let mut leds = Vec::with_capacity(config.toggles.len());
        for (idx, toggle) in config.toggles.iter().enumerate() {
            let button = pins
                .input_pullup(&toggle.button)
                .with_context(|| format!("Toggle {} button on {}", idx, toggle.button))?;
            toggles.push(Switch::new(button)?);
            leds.push(
                pins.output(&toggle.led, false)
                    .with_context(|| format!("Toggle {} LED on {}", idx, toggle.led))?,
            );
        }

        let power = match &config.power_led {
            Some(pin) => Some(pins.output(pin, false).with_context(|| format!("Power LED on {}", pin))?),
            None => None,
        };

        let mut encoders = Vec::with_capacity(config.encoders.units.len());
        for (index, unit) in config.encoders.units.iter().enumerate() {
            let (clk, dt) = if unit.reverse { (unit.dt, unit.clk) } else { (unit.clk, unit.dt) };
            let quad = pins.input_pair(&unit.expander, clk, dt)?;
            let sw = pins.input_pullup(&PinRef::new(&unit.expander, unit.sw))?;

            let encoder = Encoder {
                index,
                cc: unit.cc,
                decoder: QuadratureDecoder::new(quad).with_context(|| format!("Encoder {}", index))?,
                switch: Switch::new(sw)?,
            };
            debug!(index, cc = unit.cc, expander = %unit.expander, reverse = unit.reverse, "Encoder configured");
            encoders.push((unit.expander.clone(), encoder));
        }

        let keypad = match &config.keypad {
            Some(kp) => {
                let mut rows = Vec::with_capacity(kp.rows.len());
                for pin in &kp.rows {
                    rows.push(pins.output(&PinRef::new(&kp.expander, *pin), true)?);
                }
                let mut cols = Vec::with_capacity(kp.cols.len());
                for pin in &kp.cols {
                    cols.push(pins.input_pullup(&PinRef::new(&kp.expander, *pin))?);
                }
                let release = ReleaseTiming {
                    poll: Duration::from_millis(kp.release_poll_ms),
                    timeout: Duration::from_millis(kp.release_timeout_ms),
                };
                Some(Keypad::new(rows, cols, kp.layout()?, release).context("Failed to initialise keypad")?)
            }
            None => None,
        };

        let joystick = match &config.joystick {
            Some(js) => {
                let mapper = StickMapper {
                    dead_zone: js.dead_zone,
                    power: js.power(),
                    sensitivity: js.sensitivity,
                    curve: js.curve,
                };
                let stick = AnalogStick::new(
                    pins.analog(js.x_channel)?,
                    pins.analog(js.y_channel)?,
                    AxisCalibration {
                        center: js.x_center,
                        invert: js.invert_x,
                    },
                    AxisCalibration {
                        center: js.y_center,
                        invert: js.invert_y,
                    },
                    mapper,
                );
                let switch = match &js.switch {
                    Some(pin) => Some(Switch::new(pins.input_pullup(pin)?)?),
                    None => None,
                };
                info!(power = mapper.power, sensitivity = mapper.sensitivity, curve = ?mapper.curve, "Joystick configured");
                Some((stick, switch))
            }
            None => None,
        };

        Ok(Self {
            indicators: Indicators { toggles: leds, power },
            encoder_ccs: config.encoders.units.iter().map(|u| u.cc).collect(),
            inputs: BoardInputs {
                toggles,
                encoders,
                keypad,
                joystick,
            },
        })
    }
}

impl BoardInputs {
    /// Start one poll thread per encoder expander, one for keypad and
    /// toggles, and one for the joystick
    pub fn spawn(self, config: &AppConfig, scheduler: &mut PollScheduler, handle: &DispatcherHandle) -> Result<()> {
        for (expander, encoders) in group_by_expander(self.encoders) {
            let poller = EncoderPoller::new(format!("encoders-{}", expander), encoders, handle.clone());
            scheduler.spawn(poller, config.encoder_interval())?;
        }

        let keypad_cfg = config.keypad.clone().unwrap_or_default();
        if self.keypad.is_some() || !self.toggles.is_empty() {
            let digits = DigitAccumulator::new(
                Duration::from_millis(keypad_cfg.digit_timeout_ms),
                keypad_cfg.max_digits,
            );
            let aux = keypad_cfg
                .aux_buttons
                .iter()
                .map(|a| AuxButton {
                    symbol: a.symbol,
                    button: a.button,
                })
                .collect();
            let poller = KeypadPoller::new(self.keypad, keypad_cfg.mode, digits, aux, self.toggles, handle.clone());
            scheduler.spawn(poller, Duration::from_millis(keypad_cfg.poll_interval_ms))?;
        }

        if let (Some((stick, switch)), Some(js)) = (self.joystick, &config.joystick) {
            let poller = JoystickPoller::new(stick, switch, js.button, js.max_read_failures, handle.clone());
            scheduler.spawn(poller, Duration::from_millis(js.poll_interval_ms))?;
        }

        Ok(())
    }
}

/// Group encoders by expander, keeping first-seen expander order
fn group_by_expander<T>(items: Vec<(String, T)>) -> Vec<(String, Vec<T>)> {
    let mut groups: Vec<(String, Vec<T>)> = Vec::new();
    for (key, item) in items {
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(item),
            None => groups.push((key, vec![item])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::{MockAnalog, MockPin};
    use crate::input::Rotation;
    use tokio::sync::mpsc;

    /// Pins created on demand and kept for inspection
    #[derive(Default)]
    struct MockPins {
        pins: HashMap<PinRef, MockPin>,
        analog: HashMap<u8, MockAnalog>,
    }

    impl MockPins {
        fn pin(&mut self, pin: &PinRef, level: bool) -> MockPin {
            self.pins.entry(pin.clone()).or_insert_with(|| MockPin::new(level)).clone()
        }
    }

    impl PinSource for MockPins {
        fn input_pullup(&mut self, pin: &PinRef) -> hal::Result<InputPin> {
            Ok(Box::new(self.pin(pin, true)))
        }

        fn input_pair(&mut self, expander: &str, a: u8, b: u8) -> hal::Result<QuadPins> {
            let a = self.pin(&PinRef::new(expander, a), true);
            let b = self.pin(&PinRef::new(expander, b), true);
            Ok(Box::new((a, b)))
        }

        fn output(&mut self, pin: &PinRef, initial: bool) -> hal::Result<Box<dyn DigitalOutput>> {
            Ok(Box::new(self.pin(pin, initial)))
        }

        fn analog(&mut self, channel: u8) -> hal::Result<AnalogPin> {
            let adc = self.analog.entry(channel).or_insert_with(|| MockAnalog::new(1.65)).clone();
            Ok(Box::new(adc))
        }
    }

    #[test]
    fn test_build_reference_board() {
        let config = AppConfig::default();
        let mut pins = MockPins::default();
        let board = Board::build(&config, &mut pins).unwrap();

        assert_eq!(board.indicators.toggles.len(), 4);
        assert!(board.indicators.power.is_some());
        assert_eq!(board.encoder_ccs, vec![20, 21, 22, 23]);
        assert_eq!(board.inputs.toggles.len(), 4);
        assert!(board.inputs.keypad.is_some());
        assert!(board.inputs.joystick.is_some());

        // Keypad rows idle HIGH
        assert!(pins.pins[&PinRef::new("mcp2", 0)].level());
        // Every digital pin of the reference wiring is claimed
        assert_eq!(pins.pins.len(), 4 * 2 + 1 + 4 * 3 + 1 + 8);
    }

    #[test]
    fn test_optional_devices() {
        let mut config = AppConfig::default();
        config.keypad = None;
        config.joystick = None;
        config.power_led = None;

        let board = Board::build(&config, &mut MockPins::default()).unwrap();
        assert!(board.indicators.power.is_none());
        assert!(board.inputs.keypad.is_none());
        assert!(board.inputs.joystick.is_none());
    }

    #[test]
    fn test_reverse_swaps_direction() {
        let mut config = AppConfig::default();
        config.encoders.units.truncate(1);
        config.encoders.units[0].reverse = true;

        let mut pins = MockPins::default();
        let mut board = Board::build(&config, &mut pins).unwrap();
        let (_, encoder) = &mut board.inputs.encoders[0];

        // Pull-ups idle at 11; CLK falling first is clockwise when wired straight
        pins.pins[&PinRef::new("mcp1", 0)].set(false);
        assert_eq!(encoder.decoder.sample().unwrap(), Some(Rotation::CounterClockwise));
    }

    #[test]
    fn test_group_by_expander_keeps_order() {
        let groups = group_by_expander(vec![
            ("mcp2".to_string(), 1),
            ("mcp1".to_string(), 2),
            ("mcp2".to_string(), 3),
        ]);
        assert_eq!(groups, vec![("mcp2".to_string(), vec![1, 3]), ("mcp1".to_string(), vec![2])]);
    }

    #[tokio::test]
    async fn test_spawn_pollers_per_group() {
        let config = AppConfig::default();
        let board = Board::build(&config, &mut MockPins::default()).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = DispatcherHandle::new(tx);

        let mut scheduler = PollScheduler::new();
        board.inputs.spawn(&config, &mut scheduler, &handle).unwrap();

        // Two encoder expanders, keypad with toggles, joystick
        assert_eq!(scheduler.len(), 4);
        scheduler.shutdown().await;
    }
}
