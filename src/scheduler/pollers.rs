//! Poll tasks for each input group
//!
//! A poller owns its decoders outright; the only thing shared with other
//! threads is the dispatcher handle.

use std::time::Instant;

use tracing::{debug, error, info};

use super::PollTask;
use crate::dispatcher::DispatcherHandle;
use crate::hal::{self, AnalogInput, DigitalInput, InputPair};
use crate::input::joystick::to_motion;
use crate::input::{AnalogStick, DigitAccumulator, Edge, Encoder, Keypad, ScanMode, SequenceCommand, Switch};
use crate::output::PointerButton;

/// Boxed digital input used by every poller
pub type InputPin = Box<dyn DigitalInput>;

/// Boxed CLK/DT pair sampled together
pub type QuadPins = Box<dyn InputPair>;

/// Boxed analog channel
pub type AnalogPin = Box<dyn AnalogInput>;

/// Keep the first error of a cycle, let the remaining devices run
fn first_err(acc: &mut hal::Result<()>, result: hal::Result<()>) {
    if acc.is_ok() {
        *acc = result;
    }
}

// ============================================================================
// Joystick
// ============================================================================

/// Analog stick to pointer motion, stick switch to pointer button
pub struct JoystickPoller {
    stick: AnalogStick<AnalogPin>,
    switch: Option<Switch<InputPin>>,
    button: PointerButton,
    handle: DispatcherHandle,
    failures: u32,
    max_failures: u32,
    analog_disabled: bool,
}

impl JoystickPoller {
    pub fn new(
        stick: AnalogStick<AnalogPin>,
        switch: Option<Switch<InputPin>>,
        button: PointerButton,
        max_failures: u32,
        handle: DispatcherHandle,
    ) -> Self {
        Self {
            stick,
            switch,
            button,
            handle,
            failures: 0,
            max_failures,
            analog_disabled: false,
        }
    }

    /// True once analog reads were given up after repeated failures
    pub fn analog_disabled(&self) -> bool {
        self.analog_disabled
    }

    fn poll_stick(&mut self) -> hal::Result<()> {
        if self.analog_disabled {
            return Ok(());
        }

        match self.stick.read() {
            Ok(velocity) => {
                self.failures = 0;
                if let Some((dx, dy)) = to_motion(velocity) {
                    self.handle.pointer_motion(dx, dy);
                }
                Ok(())
            }
            Err(e) => {
                self.failures += 1;
                if self.max_failures > 0 && self.failures >= self.max_failures {
                    self.analog_disabled = true;
                    error!(failures = self.failures, "Joystick ADC keeps failing, analog input disabled: {}", e);
                    return Ok(());
                }
                Err(e)
            }
        }
    }

    fn poll_switch(&mut self) -> hal::Result<()> {
        let Some(switch) = self.switch.as_mut() else {
            return Ok(());
        };
        if let Some(edge) = switch.sample()? {
            self.handle.pointer_button(self.button, edge.is_press());
        }
        Ok(())
    }
}

impl PollTask for JoystickPoller {
    fn name(&self) -> &str {
        "joystick"
    }

    fn poll(&mut self) -> hal::Result<()> {
        let mut result = self.poll_stick();
        first_err(&mut result, self.poll_switch());
        result
    }
}

// ============================================================================
// Keypad and toggle buttons
// ============================================================================

/// Keypad symbol acting as a pointer button while held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxButton {
    pub symbol: char,
    pub button: PointerButton,
}

/// Keypad scanning, digit accumulation and the toggle footswitches
pub struct KeypadPoller {
    keypad: Option<Keypad>,
    mode: ScanMode,
    digits: DigitAccumulator,
    aux: Vec<AuxButton>,
    last_key: Option<char>,
    held_aux: Option<PointerButton>,
    toggles: Vec<Switch<InputPin>>,
    handle: DispatcherHandle,
}

impl KeypadPoller {
    pub fn new(
        keypad: Option<Keypad>,
        mode: ScanMode,
        digits: DigitAccumulator,
        aux: Vec<AuxButton>,
        toggles: Vec<Switch<InputPin>>,
        handle: DispatcherHandle,
    ) -> Self {
        Self {
            keypad,
            mode,
            digits,
            aux,
            last_key: None,
            held_aux: None,
            toggles,
            handle,
        }
    }

    fn dispatch(&self, cmd: SequenceCommand) {
        match cmd {
            SequenceCommand::SelectBank(bank) => self.handle.select_bank(bank),
            SequenceCommand::SelectPreset(preset) => self.handle.select_preset(preset),
        }
    }

    fn key_changed(&mut self, symbol: Option<char>, now: Instant) {
        if let Some(button) = self.held_aux.take() {
            self.handle.pointer_button(button, false);
        }

        let Some(symbol) = symbol else {
            return;
        };
        debug!(%symbol, "Key pressed");

        if let Some(aux) = self.aux.iter().find(|a| a.symbol == symbol) {
            self.handle.pointer_button(aux.button, true);
            self.held_aux = Some(aux.button);
        } else if let Some(cmd) = self.digits.press(symbol, now) {
            self.dispatch(cmd);
        }
    }

    fn poll_keypad(&mut self) -> hal::Result<()> {
        let Some(keypad) = self.keypad.as_mut() else {
            return Ok(());
        };

        let symbol = keypad.scan_with(self.mode)?.map(|k| k.symbol);
        let now = Instant::now();

        if symbol != self.last_key {
            self.key_changed(symbol, now);
            self.last_key = symbol;
        }

        if let Some(cmd) = self.digits.poll(now) {
            self.dispatch(cmd);
        }
        Ok(())
    }

    fn poll_toggles(&mut self) -> hal::Result<()> {
        let mut result = Ok(());
        for (index, switch) in self.toggles.iter_mut().enumerate() {
            match switch.sample() {
                Ok(Some(Edge::Pressed)) => self.handle.toggle_effect(index),
                Ok(_) => {}
                Err(e) => first_err(&mut result, Err(e)),
            }
        }
        result
    }
}

impl PollTask for KeypadPoller {
    fn name(&self) -> &str {
        "keypad"
    }

    fn poll(&mut self) -> hal::Result<()> {
        let mut result = self.poll_keypad();
        first_err(&mut result, self.poll_toggles());
        result
    }
}

// ============================================================================
// Encoders
// ============================================================================

/// Every encoder wired to one expander
pub struct EncoderPoller {
    name: String,
    encoders: Vec<Encoder<QuadPins, InputPin>>,
    handle: DispatcherHandle,
}

impl EncoderPoller {
    pub fn new(name: impl Into<String>, encoders: Vec<Encoder<QuadPins, InputPin>>, handle: DispatcherHandle) -> Self {
        Self {
            name: name.into(),
            encoders,
            handle,
        }
    }
}

impl PollTask for EncoderPoller {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self) -> hal::Result<()> {
        let mut result = Ok(());

        for encoder in self.encoders.iter_mut() {
            match encoder.decoder.sample() {
                Ok(Some(rotation)) => self.handle.encoder_tick(encoder.index, rotation),
                Ok(None) => {}
                Err(e) => first_err(&mut result, Err(e)),
            }

            match encoder.switch.sample() {
                Ok(Some(edge)) => info!(encoder = encoder.index, cc = encoder.cc, ?edge, "Encoder button"),
                Ok(None) => {}
                Err(e) => first_err(&mut result, Err(e)),
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::commands::DispatchCommand;
    use crate::hal::mock::{MockAnalog, MockMatrix, MockPin};
    use crate::input::joystick::{AxisCalibration, StickCurve, StickMapper};
    use crate::input::keypad::{ReleaseTiming, DEFAULT_LAYOUT};
    use crate::input::{QuadratureDecoder, Rotation};
    use std::thread;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn handle() -> (DispatcherHandle, mpsc::UnboundedReceiver<DispatchCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (DispatcherHandle::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DispatchCommand>) -> Vec<DispatchCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    fn boxed(pin: &MockPin) -> InputPin {
        Box::new(pin.clone())
    }

    fn stick(x: &MockAnalog, y: &MockAnalog) -> AnalogStick<AnalogPin> {
        let cal = AxisCalibration {
            center: 1.65,
            invert: false,
        };
        let mapper = StickMapper {
            dead_zone: 0.1,
            power: 2.0,
            sensitivity: 10.0,
            curve: StickCurve::Radial,
        };
        AnalogStick::new(Box::new(x.clone()), Box::new(y.clone()), cal, cal, mapper)
    }

    #[test]
    fn test_joystick_motion_and_button() {
        let (handle, mut rx) = handle();
        let x = MockAnalog::new(3.3);
        let y = MockAnalog::new(1.65);
        let sw = MockPin::new(true);
        let mut poller = JoystickPoller::new(
            stick(&x, &y),
            Some(Switch::new(boxed(&sw)).unwrap()),
            PointerButton::Left,
            50,
            handle,
        );

        poller.poll().unwrap();
        let cmds = drain(&mut rx);
        assert!(matches!(cmds[..], [DispatchCommand::PointerMotion { dx: 9..=10, dy: 0 }]));

        x.set(1.65);
        sw.set(false);
        poller.poll().unwrap();
        let cmds = drain(&mut rx);
        assert!(matches!(
            cmds[..],
            [DispatchCommand::PointerButton {
                button: PointerButton::Left,
                pressed: true
            }]
        ));
    }

    #[test]
    fn test_joystick_disables_after_repeated_failures() {
        let (handle, _rx) = handle();
        let x = MockAnalog::new(1.65);
        let y = MockAnalog::new(1.65);
        x.fail_reads(usize::MAX);
        let mut poller = JoystickPoller::new(stick(&x, &y), None, PointerButton::Left, 3, handle);

        assert!(poller.poll().is_err());
        assert!(poller.poll().is_err());
        assert!(poller.poll().is_ok());
        assert!(poller.analog_disabled());

        let reads = x.reads();
        poller.poll().unwrap();
        assert_eq!(x.reads(), reads);
    }

    fn keypad_poller(matrix: &MockMatrix, toggles: Vec<InputPin>, timeout: Duration) -> (KeypadPoller, mpsc::UnboundedReceiver<DispatchCommand>) {
        keypad_poller_with(matrix, toggles, timeout, ScanMode::NonBlocking)
    }

    fn keypad_poller_with(
        matrix: &MockMatrix,
        toggles: Vec<InputPin>,
        timeout: Duration,
        mode: ScanMode,
    ) -> (KeypadPoller, mpsc::UnboundedReceiver<DispatchCommand>) {
        let (handle, rx) = handle();
        let keypad = Keypad::new(matrix.row_outputs(), matrix.column_inputs(), DEFAULT_LAYOUT, ReleaseTiming::default()).unwrap();
        let aux = vec![
            AuxButton {
                symbol: '*',
                button: PointerButton::Left,
            },
            AuxButton {
                symbol: '#',
                button: PointerButton::Right,
            },
        ];
        let toggles = toggles.into_iter().map(|p| Switch::new(p).unwrap()).collect();
        let poller = KeypadPoller::new(
            Some(keypad),
            mode,
            DigitAccumulator::new(timeout, 3),
            aux,
            toggles,
            handle,
        );
        (poller, rx)
    }

    fn tap(poller: &mut KeypadPoller, matrix: &MockMatrix, cell: (usize, usize)) {
        matrix.press(Some(cell));
        poller.poll().unwrap();
        matrix.press(None);
        poller.poll().unwrap();
    }

    #[test]
    fn test_keypad_digits_become_preset() {
        let matrix = MockMatrix::new();
        let (mut poller, mut rx) = keypad_poller(&matrix, vec![], Duration::from_millis(40));

        tap(&mut poller, &matrix, (0, 2)); // 3
        tap(&mut poller, &matrix, (2, 0)); // 7
        assert!(drain(&mut rx).is_empty());

        thread::sleep(Duration::from_millis(60));
        poller.poll().unwrap();
        assert!(matches!(drain(&mut rx)[..], [DispatchCommand::SelectPreset { preset: 37 }]));
    }

    #[test]
    fn test_held_key_counts_once() {
        let matrix = MockMatrix::new();
        let (mut poller, mut rx) = keypad_poller(&matrix, vec![], Duration::from_secs(10));

        matrix.press(Some((1, 3))); // B
        poller.poll().unwrap();
        poller.poll().unwrap();
        poller.poll().unwrap();
        assert!(matches!(drain(&mut rx)[..], [DispatchCommand::SelectBank { bank: 1 }]));
    }

    #[test]
    fn test_aux_keys_drive_pointer_buttons() {
        let matrix = MockMatrix::new();
        let (mut poller, mut rx) = keypad_poller(&matrix, vec![], Duration::from_secs(10));

        tap(&mut poller, &matrix, (3, 2)); // #
        let cmds = drain(&mut rx);
        assert!(matches!(
            cmds[..],
            [
                DispatchCommand::PointerButton {
                    button: PointerButton::Right,
                    pressed: true
                },
                DispatchCommand::PointerButton {
                    button: PointerButton::Right,
                    pressed: false
                }
            ]
        ));
    }

    /// Let go of the held key from another thread after `delay`
    fn release_after(matrix: &MockMatrix, delay: Duration) -> thread::JoinHandle<()> {
        let matrix = matrix.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            matrix.press(None);
        })
    }

    #[test]
    fn test_blocking_scan_reports_key_once_after_release() {
        let matrix = MockMatrix::new();
        let (mut poller, mut rx) = keypad_poller_with(&matrix, vec![], Duration::from_millis(40), ScanMode::Blocking);

        let started = Instant::now();
        matrix.press(Some((2, 0))); // 7
        let release = release_after(&matrix, Duration::from_millis(30));
        poller.poll().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
        release.join().unwrap();

        poller.poll().unwrap();
        poller.poll().unwrap();
        assert!(drain(&mut rx).is_empty());

        thread::sleep(Duration::from_millis(60));
        poller.poll().unwrap();
        assert!(matches!(drain(&mut rx)[..], [DispatchCommand::SelectPreset { preset: 7 }]));
    }

    #[test]
    fn test_blocking_aux_key_press_release_pair() {
        let matrix = MockMatrix::new();
        let (mut poller, mut rx) = keypad_poller_with(&matrix, vec![], Duration::from_secs(10), ScanMode::Blocking);

        matrix.press(Some((3, 0))); // *
        let release = release_after(&matrix, Duration::from_millis(20));
        poller.poll().unwrap();
        release.join().unwrap();
        poller.poll().unwrap();
        poller.poll().unwrap();

        assert!(matches!(
            drain(&mut rx)[..],
            [
                DispatchCommand::PointerButton {
                    button: PointerButton::Left,
                    pressed: true
                },
                DispatchCommand::PointerButton {
                    button: PointerButton::Left,
                    pressed: false
                }
            ]
        ));
    }

    #[test]
    fn test_toggle_buttons_fire_on_press_only() {
        let matrix = MockMatrix::new();
        let pins: Vec<MockPin> = (0..2).map(|_| MockPin::new(true)).collect();
        let (mut poller, mut rx) = keypad_poller(&matrix, pins.iter().map(boxed).collect(), Duration::from_secs(10));

        pins[1].set(false);
        poller.poll().unwrap();
        pins[1].set(true);
        poller.poll().unwrap();

        assert!(matches!(drain(&mut rx)[..], [DispatchCommand::ToggleEffect { index: 1 }]));
    }

    #[test]
    fn test_toggle_failure_does_not_block_others() {
        let matrix = MockMatrix::new();
        let pins: Vec<MockPin> = (0..2).map(|_| MockPin::new(true)).collect();
        let (mut poller, mut rx) = keypad_poller(&matrix, pins.iter().map(boxed).collect(), Duration::from_secs(10));

        pins[0].fail_reads(1);
        pins[1].set(false);
        assert!(poller.poll().is_err());
        assert!(matches!(drain(&mut rx)[..], [DispatchCommand::ToggleEffect { index: 1 }]));
    }

    #[test]
    fn test_encoder_poller_ticks() {
        let (handle, mut rx) = handle();
        let clk = MockPin::new(false);
        let dt = MockPin::new(false);
        let sw = MockPin::new(true);
        let encoder = Encoder {
            index: 2,
            cc: 22,
            decoder: QuadratureDecoder::new(Box::new((clk.clone(), dt.clone())) as QuadPins).unwrap(),
            switch: Switch::new(boxed(&sw)).unwrap(),
        };
        let mut poller = EncoderPoller::new("encoders-0x21", vec![encoder], handle);
        assert_eq!(poller.name(), "encoders-0x21");

        clk.set(true);
        poller.poll().unwrap();
        dt.set(true);
        poller.poll().unwrap();
        sw.set(false);
        poller.poll().unwrap();

        let cmds = drain(&mut rx);
        assert_eq!(cmds.len(), 2);
        assert!(cmds.iter().all(|c| matches!(
            c,
            DispatchCommand::EncoderTick {
                encoder: 2,
                rotation: Rotation::Clockwise
            }
        )));
    }
}
