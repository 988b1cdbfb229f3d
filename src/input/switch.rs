//! Active-low push switch with edge detection
//!
//! The switch shorts its pin to ground when pressed, so LOW = pressed. There
//! is no time-based debounce: the caller's poll interval is the debounce
//! window, and bounces shorter than one interval are never seen.

use crate::hal::{DigitalInput, Result};

/// A state change of a switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

impl Edge {
    pub fn is_press(self) -> bool {
        matches!(self, Edge::Pressed)
    }
}

/// Debounced switch owning its input pin
pub struct Switch<P> {
    pin: P,
    pressed: bool,
}

impl<P: DigitalInput> Switch<P> {
    /// Wrap `pin`, seeding the state from the current level so a button
    /// held at boot does not produce a press.
    pub fn new(mut pin: P) -> Result<Self> {
        let pressed = !pin.read()?;
        Ok(Self { pin, pressed })
    }

    /// Sample the pin once
    pub fn sample(&mut self) -> Result<Option<Edge>> {
        let pressed = !self.pin.read()?;
        if pressed == self.pressed {
            return Ok(None);
        }

        self.pressed = pressed;
        Ok(Some(if pressed { Edge::Pressed } else { Edge::Released }))
    }

    /// Last accepted state
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockPin;

    #[test]
    fn test_press_and_release_edges() {
        let pin = MockPin::new(true);
        let mut switch = Switch::new(pin.clone()).unwrap();
        assert!(!switch.is_pressed());
        assert_eq!(switch.sample().unwrap(), None);

        pin.set(false);
        assert_eq!(switch.sample().unwrap(), Some(Edge::Pressed));
        assert!(switch.is_pressed());

        // Holding is not a new press
        assert_eq!(switch.sample().unwrap(), None);

        pin.set(true);
        assert_eq!(switch.sample().unwrap(), Some(Edge::Released));
        assert!(!switch.is_pressed());
    }

    #[test]
    fn test_held_at_boot_does_not_fire() {
        let pin = MockPin::new(false);
        let mut switch = Switch::new(pin.clone()).unwrap();

        assert!(switch.is_pressed());
        assert_eq!(switch.sample().unwrap(), None);

        pin.set(true);
        assert_eq!(switch.sample().unwrap(), Some(Edge::Released));
    }

    #[test]
    fn test_read_failure_keeps_state() {
        let pin = MockPin::new(true);
        let mut switch = Switch::new(pin.clone()).unwrap();

        pin.set(false);
        pin.fail_reads(1);
        assert!(switch.sample().is_err());
        assert!(!switch.is_pressed());

        assert_eq!(switch.sample().unwrap(), Some(Edge::Pressed));
    }
}
