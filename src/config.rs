//! Configuration for the controller
//!
//! One YAML file describes the whole wiring: which expander pin every
//! button, LED, encoder and keypad line is on, the ADC channels of the
//! joystick, the MIDI mapping and the poll intervals. Every field has a
//! default matching the reference board, so an empty file is a valid
//! configuration. The file is read once at start-up.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::dispatcher::DispatchSettings;
use crate::input::joystick::{derive_power, StickCurve};
use crate::input::keypad::{self, Layout, ScanMode};
use crate::output::PointerButton;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,
    #[serde(default = "default_expanders")]
    pub expanders: Vec<ExpanderConfig>,
    #[serde(default = "default_adc_address")]
    pub adc_address: u8,
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default = "default_toggles")]
    pub toggles: Vec<ToggleConfig>,
    #[serde(default = "default_power_led", skip_serializing_if = "Option::is_none")]
    pub power_led: Option<PinRef>,
    #[serde(default)]
    pub encoders: EncodersConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joystick: Option<JoystickConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypad: Option<KeypadConfig>,
}

/// An MCP23017 on the bus
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExpanderConfig {
    pub name: String,
    pub address: u8,
}

/// A pin on a named expander
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct PinRef {
    pub expander: String,
    pub pin: u8,
}

impl PinRef {
    pub fn new(expander: &str, pin: u8) -> Self {
        Self {
            expander: expander.to_string(),
            pin,
        }
    }
}

impl std::fmt::Display for PinRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.expander, self.pin)
    }
}

/// MIDI port and message mapping
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Create a virtual port instead of attaching to existing ones
    #[serde(rename = "virtual", default = "default_true")]
    pub virtual_port: bool,
    /// Virtual port name, also the default search pattern
    #[serde(default = "default_port_name")]
    pub port_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    /// Resync toggles and encoders from inbound CC
    #[serde(default = "default_true")]
    pub listen: bool,
    /// Outbound channel, 0-15
    #[serde(default)]
    pub channel: u8,
    #[serde(default = "default_toggle_base_cc")]
    pub toggle_base_cc: u8,
    #[serde(default = "default_bank_msb")]
    pub bank_msb: u8,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            virtual_port: true,
            port_name: default_port_name(),
            input_port: None,
            output_port: None,
            listen: true,
            channel: 0,
            toggle_base_cc: default_toggle_base_cc(),
            bank_msb: default_bank_msb(),
        }
    }
}

/// Footswitch with its indicator LED
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToggleConfig {
    pub button: PinRef,
    pub led: PinRef,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncodersConfig {
    /// Value change per detent
    #[serde(default = "default_encoder_step")]
    pub step: u8,
    #[serde(default = "default_encoder_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_encoder_units")]
    pub units: Vec<EncoderConfig>,
}

impl Default for EncodersConfig {
    fn default() -> Self {
        Self {
            step: default_encoder_step(),
            poll_interval_ms: default_encoder_interval(),
            units: default_encoder_units(),
        }
    }
}

/// One rotary encoder; all three pins sit on the same expander
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncoderConfig {
    pub expander: String,
    pub clk: u8,
    pub dt: u8,
    pub sw: u8,
    pub cc: u8,
    /// Swap CLK and DT for encoders that count the wrong way
    #[serde(default)]
    pub reverse: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JoystickConfig {
    #[serde(default)]
    pub x_channel: u8,
    #[serde(default = "default_y_channel")]
    pub y_channel: u8,
    #[serde(default = "default_center")]
    pub x_center: f32,
    #[serde(default = "default_center")]
    pub y_center: f32,
    #[serde(default)]
    pub invert_x: bool,
    #[serde(default)]
    pub invert_y: bool,
    #[serde(default = "default_dead_zone")]
    pub dead_zone: f32,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    /// Derived from the sensitivity when set to null
    #[serde(default = "default_power_curve")]
    pub power_curve: Option<f32>,
    #[serde(default)]
    pub curve: StickCurve,
    #[serde(default = "default_stick_switch")]
    pub switch: Option<PinRef>,
    #[serde(default = "default_stick_button")]
    pub button: PointerButton,
    /// Consecutive ADC failures before analog input is disabled (0 = never)
    #[serde(default = "default_max_read_failures")]
    pub max_read_failures: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

impl JoystickConfig {
    /// Configured exponent, or the one derived from the sensitivity
    pub fn power(&self) -> f32 {
        self.power_curve.unwrap_or_else(|| derive_power(self.sensitivity))
    }
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            x_channel: 0,
            y_channel: default_y_channel(),
            x_center: default_center(),
            y_center: default_center(),
            invert_x: false,
            invert_y: false,
            dead_zone: default_dead_zone(),
            sensitivity: default_sensitivity(),
            power_curve: default_power_curve(),
            curve: StickCurve::Radial,
            switch: default_stick_switch(),
            button: default_stick_button(),
            max_read_failures: default_max_read_failures(),
            poll_interval_ms: default_poll_interval(),
            device_name: default_device_name(),
        }
    }
}

/// Keypad symbol mapped to a pointer button
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuxButtonConfig {
    pub symbol: char,
    pub button: PointerButton,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeypadConfig {
    pub expander: String,
    #[serde(default = "default_keypad_rows")]
    pub rows: Vec<u8>,
    #[serde(default = "default_keypad_cols")]
    pub cols: Vec<u8>,
    /// One string of four symbols per row
    #[serde(default = "default_layout")]
    pub layout: Vec<String>,
    #[serde(default)]
    pub mode: ScanMode,
    #[serde(default = "default_digit_timeout")]
    pub digit_timeout_ms: u64,
    #[serde(default = "default_max_digits")]
    pub max_digits: usize,
    #[serde(default = "default_poll_interval")]
    pub release_poll_ms: u64,
    #[serde(default = "default_release_timeout")]
    pub release_timeout_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_aux_buttons")]
    pub aux_buttons: Vec<AuxButtonConfig>,
}

impl KeypadConfig {
    /// Symbol grid as a fixed-size layout
    pub fn layout(&self) -> Result<Layout> {
        if self.layout.len() != keypad::SIZE {
            bail!("Keypad layout must have {} rows, got {}", keypad::SIZE, self.layout.len());
        }

        let mut layout = [[' '; keypad::SIZE]; keypad::SIZE];
        for (r, row) in self.layout.iter().enumerate() {
            let symbols: Vec<char> = row.chars().collect();
            if symbols.len() != keypad::SIZE {
                bail!("Keypad layout row {} must have {} symbols, got '{}'", r, keypad::SIZE, row);
            }
            layout[r].copy_from_slice(&symbols);
        }
        Ok(layout)
    }
}

impl Default for KeypadConfig {
    fn default() -> Self {
        Self {
            expander: "mcp2".to_string(),
            rows: default_keypad_rows(),
            cols: default_keypad_cols(),
            layout: default_layout(),
            mode: ScanMode::NonBlocking,
            digit_timeout_ms: default_digit_timeout(),
            max_digits: default_max_digits(),
            release_poll_ms: default_poll_interval(),
            release_timeout_ms: default_release_timeout(),
            poll_interval_ms: default_poll_interval(),
            aux_buttons: default_aux_buttons(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            i2c_bus: default_i2c_bus(),
            expanders: default_expanders(),
            adc_address: default_adc_address(),
            midi: MidiConfig::default(),
            toggles: default_toggles(),
            power_led: default_power_led(),
            encoders: EncodersConfig::default(),
            joystick: Some(JoystickConfig::default()),
            keypad: Some(KeypadConfig::default()),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))?;
        Ok(config)
    }

    /// Parse and validate YAML text
    ///
    /// Absent `joystick` / `keypad` sections fall back to the reference
    /// wiring; set them to `null` to run without the device.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(contents).context("Failed to parse YAML")?;
        let mapping = raw.as_mapping();
        let has = |key: &str| mapping.map_or(false, |m| m.contains_key(key));

        let mut config: AppConfig = if raw.is_null() {
            AppConfig::default()
        } else {
            serde_yaml::from_value(raw.clone()).context("Failed to parse YAML config")?
        };

        if !raw.is_null() {
            if !has("joystick") {
                config.joystick = Some(JoystickConfig::default());
            }
            if !has("keypad") {
                config.keypad = Some(KeypadConfig::default());
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parameters of the MIDI mapping used by the dispatcher
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            channel: self.midi.channel,
            toggle_base_cc: self.midi.toggle_base_cc,
            bank_msb: self.midi.bank_msb,
            encoder_step: self.encoders.step,
        }
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        // Expanders
        let mut names = HashSet::new();
        let mut addresses = HashSet::new();
        for expander in &self.expanders {
            if expander.name.is_empty() {
                bail!("Expander name cannot be empty");
            }
            if !names.insert(expander.name.as_str()) {
                bail!("Duplicate expander name '{}'", expander.name);
            }
            if !(0x20..=0x27).contains(&expander.address) {
                bail!(
                    "Expander '{}' has invalid address 0x{:02X} (must be 0x20-0x27)",
                    expander.name,
                    expander.address
                );
            }
            if !addresses.insert(expander.address) {
                bail!("Duplicate expander address 0x{:02X}", expander.address);
            }
        }
        if !(0x48..=0x4B).contains(&self.adc_address) {
            bail!("Invalid ADC address 0x{:02X} (must be 0x48-0x4B)", self.adc_address);
        }

        // MIDI
        if self.midi.port_name.is_empty() {
            bail!("MIDI port_name cannot be empty");
        }
        if self.midi.channel > 15 {
            bail!("MIDI channel {} is invalid (must be 0-15)", self.midi.channel);
        }
        if self.midi.bank_msb > 127 {
            bail!("MIDI bank_msb {} is invalid (must be 0-127)", self.midi.bank_msb);
        }
        let toggle_ccs = self.toggle_cc_range()?;

        // Encoders
        if self.encoders.step == 0 || self.encoders.step > 127 {
            bail!("Encoder step {} is invalid (must be 1-127)", self.encoders.step);
        }
        let mut encoder_ccs = HashSet::new();
        for (idx, encoder) in self.encoders.units.iter().enumerate() {
            if encoder.cc > 127 {
                bail!("Encoder {} has invalid CC number {} (must be 0-127)", idx, encoder.cc);
            }
            if !encoder_ccs.insert(encoder.cc) {
                bail!("Encoder {} reuses CC {}", idx, encoder.cc);
            }
            if toggle_ccs.contains(&encoder.cc) {
                bail!("Encoder {} CC {} overlaps the toggle CC range", idx, encoder.cc);
            }
        }

        // Joystick
        if let Some(joystick) = &self.joystick {
            Self::validate_joystick(joystick).context("Invalid joystick section")?;
        }

        // Keypad
        if let Some(keypad) = &self.keypad {
            Self::validate_keypad(keypad).context("Invalid keypad section")?;
        }

        // Intervals
        let intervals = [
            ("encoders", Some(self.encoders.poll_interval_ms)),
            ("joystick", self.joystick.as_ref().map(|j| j.poll_interval_ms)),
            ("keypad", self.keypad.as_ref().map(|k| k.poll_interval_ms)),
        ];
        for (name, interval) in intervals {
            if interval == Some(0) {
                bail!("{} poll_interval_ms must be greater than 0", name);
            }
        }

        self.validate_pins()
    }

    fn toggle_cc_range(&self) -> Result<std::ops::Range<u8>> {
        let base = usize::from(self.midi.toggle_base_cc);
        let end = base + self.toggles.len();
        if end > 128 {
            bail!(
                "{} toggles starting at CC {} exceed CC 127",
                self.toggles.len(),
                self.midi.toggle_base_cc
            );
        }
        Ok(self.midi.toggle_base_cc..end as u8)
    }

    fn validate_joystick(joystick: &JoystickConfig) -> Result<()> {
        if joystick.x_channel > 3 || joystick.y_channel > 3 {
            bail!("ADC channels must be 0-3");
        }
        if joystick.x_channel == joystick.y_channel {
            bail!("X and Y must use different ADC channels");
        }
        if joystick.x_center <= 0.0 || joystick.y_center <= 0.0 {
            bail!("Axis centres must be positive voltages");
        }
        if !(0.0..1.0).contains(&joystick.dead_zone) {
            bail!("dead_zone {} is invalid (must be in [0, 1))", joystick.dead_zone);
        }
        if joystick.sensitivity <= 0.0 {
            bail!("sensitivity must be positive");
        }
        if joystick.power() <= 0.0 {
            bail!("power_curve must be positive (sensitivity 1.0 needs an explicit power_curve)");
        }
        Ok(())
    }

    fn validate_keypad(keypad: &KeypadConfig) -> Result<()> {
        if keypad.rows.len() != keypad::SIZE || keypad.cols.len() != keypad::SIZE {
            bail!(
                "Keypad needs {} rows and {} columns, got {} and {}",
                keypad::SIZE,
                keypad::SIZE,
                keypad.rows.len(),
                keypad.cols.len()
            );
        }
        let layout = keypad.layout()?;
        if keypad.max_digits == 0 || keypad.max_digits > 4 {
            bail!("max_digits {} is invalid (must be 1-4)", keypad.max_digits);
        }
        if keypad.digit_timeout_ms == 0 || keypad.release_poll_ms == 0 {
            bail!("Keypad timings must be greater than 0");
        }

        let mut symbols = HashSet::new();
        for aux in &keypad.aux_buttons {
            if !layout.iter().flatten().any(|s| *s == aux.symbol) {
                bail!("Aux button symbol '{}' is not on the keypad", aux.symbol);
            }
            if aux.symbol.is_ascii_digit() || ('A'..='D').contains(&aux.symbol) {
                bail!("Aux button symbol '{}' is already used for presets or banks", aux.symbol);
            }
            if !symbols.insert(aux.symbol) {
                bail!("Aux button symbol '{}' mapped twice", aux.symbol);
            }
        }
        Ok(())
    }

    /// Every pin exists and is claimed exactly once
    fn validate_pins(&self) -> Result<()> {
        let known: HashSet<&str> = self.expanders.iter().map(|e| e.name.as_str()).collect();
        let mut used: HashMap<PinRef, String> = HashMap::new();

        let mut claim = |pin: PinRef, role: String| -> Result<()> {
            if !known.contains(pin.expander.as_str()) {
                bail!("{} refers to unknown expander '{}'", role, pin.expander);
            }
            if pin.pin > 15 {
                bail!("{} uses invalid pin {} (must be 0-15)", role, pin.pin);
            }
            if let Some(previous) = used.get(&pin) {
                bail!("Pin {} is used by both {} and {}", pin, previous, role);
            }
            used.insert(pin, role);
            Ok(())
        };

        for (idx, toggle) in self.toggles.iter().enumerate() {
            claim(toggle.button.clone(), format!("toggle {} button", idx))?;
            claim(toggle.led.clone(), format!("toggle {} LED", idx))?;
        }
        if let Some(led) = &self.power_led {
            claim(led.clone(), "power LED".to_string())?;
        }
        for (idx, encoder) in self.encoders.units.iter().enumerate() {
            claim(PinRef::new(&encoder.expander, encoder.clk), format!("encoder {} CLK", idx))?;
            claim(PinRef::new(&encoder.expander, encoder.dt), format!("encoder {} DT", idx))?;
            claim(PinRef::new(&encoder.expander, encoder.sw), format!("encoder {} switch", idx))?;
        }
        if let Some(switch) = self.joystick.as_ref().and_then(|j| j.switch.as_ref()) {
            claim(switch.clone(), "joystick switch".to_string())?;
        }
        if let Some(keypad) = &self.keypad {
            for (idx, pin) in keypad.rows.iter().enumerate() {
                claim(PinRef::new(&keypad.expander, *pin), format!("keypad row {}", idx))?;
            }
            for (idx, pin) in keypad.cols.iter().enumerate() {
                claim(PinRef::new(&keypad.expander, *pin), format!("keypad column {}", idx))?;
            }
        }
        Ok(())
    }

    /// Poll interval helpers
    pub fn encoder_interval(&self) -> Duration {
        Duration::from_millis(self.encoders.poll_interval_ms)
    }
}

// Default value functions (reference board wiring)
fn default_true() -> bool { true }
fn default_i2c_bus() -> u8 { 1 }
fn default_adc_address() -> u8 { 0x48 }
fn default_port_name() -> String { "KleagMFX".to_string() }
fn default_toggle_base_cc() -> u8 { 64 }
fn default_bank_msb() -> u8 { 2 }
fn default_encoder_step() -> u8 { 5 }
fn default_encoder_interval() -> u64 { 1 }
fn default_poll_interval() -> u64 { 10 }
fn default_y_channel() -> u8 { 1 }
fn default_center() -> f32 { 1.65 }
fn default_dead_zone() -> f32 { 0.1 }
fn default_sensitivity() -> f32 { 10.0 }
fn default_stick_button() -> PointerButton { PointerButton::Left }
fn default_max_read_failures() -> u32 { 50 }
fn default_device_name() -> String { "KleagMFX Joystick".to_string() }
fn default_keypad_rows() -> Vec<u8> { vec![0, 1, 2, 3] }
fn default_keypad_cols() -> Vec<u8> { vec![4, 5, 6, 7] }
fn default_digit_timeout() -> u64 { 400 }
fn default_max_digits() -> usize { 3 }
fn default_release_timeout() -> u64 { 5000 }
fn default_power_led() -> Option<PinRef> { Some(PinRef::new("mcp1", 11)) }
fn default_stick_switch() -> Option<PinRef> { Some(PinRef::new("mcp1", 10)) }
fn default_power_curve() -> Option<f32> { Some(2.0) }

fn default_expanders() -> Vec<ExpanderConfig> {
    vec![
        ExpanderConfig { name: "mcp1".to_string(), address: 0x20 },
        ExpanderConfig { name: "mcp2".to_string(), address: 0x21 },
    ]
}

fn default_toggles() -> Vec<ToggleConfig> {
    [(14, 13), (15, 12), (6, 4), (7, 5)]
        .into_iter()
        .map(|(button, led)| ToggleConfig {
            button: PinRef::new("mcp1", button),
            led: PinRef::new("mcp1", led),
        })
        .collect()
}

fn default_encoder_units() -> Vec<EncoderConfig> {
    [("mcp1", 0, 8, 9, 20), ("mcp1", 3, 2, 1, 21), ("mcp2", 15, 14, 13, 22), ("mcp2", 12, 11, 10, 23)]
        .into_iter()
        .map(|(expander, clk, dt, sw, cc)| EncoderConfig {
            expander: expander.to_string(),
            clk,
            dt,
            sw,
            cc,
            reverse: false,
        })
        .collect()
}

fn default_layout() -> Vec<String> {
    keypad::DEFAULT_LAYOUT
        .iter()
        .map(|row| row.iter().collect())
        .collect()
}

fn default_aux_buttons() -> Vec<AuxButtonConfig> {
    vec![
        AuxButtonConfig { symbol: '*', button: PointerButton::Left },
        AuxButtonConfig { symbol: '#', button: PointerButton::Right },
    ]
}
