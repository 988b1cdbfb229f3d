//! Mock pins and channels for tests
//!
//! Every mock is a cheap clone around shared state, so a test keeps one
//! clone to drive or inspect while the device under test owns the other.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{AnalogInput, DigitalInput, DigitalOutput, HalError, Result};

#[derive(Debug, Default)]
struct PinState {
    level: bool,
    writes: Vec<bool>,
    fail_reads: usize,
}

/// Digital pin usable as input or output
#[derive(Debug, Clone, Default)]
pub struct MockPin {
    state: Arc<Mutex<PinState>>,
}

impl MockPin {
    /// Create a pin at the given level
    pub fn new(level: bool) -> Self {
        let pin = Self::default();
        pin.set(level);
        pin
    }

    /// Simulate an external signal
    pub fn set(&self, level: bool) {
        self.state.lock().level = level;
    }

    /// Current level (last set or written)
    pub fn level(&self) -> bool {
        self.state.lock().level
    }

    /// Every level written through [`DigitalOutput`], in order
    pub fn writes(&self) -> Vec<bool> {
        self.state.lock().writes.clone()
    }

    /// Make the next `count` reads fail
    pub fn fail_reads(&self, count: usize) {
        self.state.lock().fail_reads = count;
    }
}

impl DigitalInput for MockPin {
    fn read(&mut self) -> Result<bool> {
        let mut state = self.state.lock();
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(HalError::Unavailable("injected read failure".into()));
        }
        Ok(state.level)
    }
}

impl DigitalOutput for MockPin {
    fn write(&mut self, high: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.level = high;
        state.writes.push(high);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AnalogState {
    volts: f32,
    fail_reads: usize,
    reads: usize,
}

/// Analog channel returning a settable voltage
#[derive(Debug, Clone, Default)]
pub struct MockAnalog {
    state: Arc<Mutex<AnalogState>>,
}

impl MockAnalog {
    pub fn new(volts: f32) -> Self {
        let channel = Self::default();
        channel.set(volts);
        channel
    }

    pub fn set(&self, volts: f32) {
        self.state.lock().volts = volts;
    }

    pub fn fail_reads(&self, count: usize) {
        self.state.lock().fail_reads = count;
    }

    /// Number of read attempts, failed ones included
    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }
}

impl AnalogInput for MockAnalog {
    fn read(&mut self) -> Result<f32> {
        let mut state = self.state.lock();
        state.reads += 1;
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(HalError::Unavailable("injected read failure".into()));
        }
        Ok(state.volts)
    }
}

/// Simulated 4x4 key matrix
///
/// A column reads LOW only while the row of the pressed cell is driven LOW,
/// which is exactly what the real matrix does with pull-ups on the columns.
#[derive(Debug, Clone)]
pub struct MockMatrix {
    rows: Vec<MockPin>,
    pressed: Arc<Mutex<Option<(usize, usize)>>>,
    fail_columns: Arc<Mutex<bool>>,
}

impl MockMatrix {
    pub fn new() -> Self {
        Self {
            rows: (0..4).map(|_| MockPin::new(true)).collect(),
            pressed: Arc::new(Mutex::new(None)),
            fail_columns: Arc::new(Mutex::new(false)),
        }
    }

    /// Hold down the cell at (row, col), or release with `None`
    pub fn press(&self, cell: Option<(usize, usize)>) {
        *self.pressed.lock() = cell;
    }

    /// Make every column read fail until cleared
    pub fn fail_columns(&self, fail: bool) {
        *self.fail_columns.lock() = fail;
    }

    /// Row pins as seen by the test
    pub fn rows(&self) -> &[MockPin] {
        &self.rows
    }

    pub fn row_outputs(&self) -> Vec<Box<dyn DigitalOutput>> {
        self.rows
            .iter()
            .map(|row| Box::new(row.clone()) as Box<dyn DigitalOutput>)
            .collect()
    }

    pub fn column_inputs(&self) -> Vec<Box<dyn DigitalInput>> {
        (0..4)
            .map(|col| {
                Box::new(MockColumn {
                    matrix: self.clone(),
                    col,
                }) as Box<dyn DigitalInput>
            })
            .collect()
    }
}

#[derive(Debug)]
struct MockColumn {
    matrix: MockMatrix,
    col: usize,
}

impl DigitalInput for MockColumn {
    fn read(&mut self) -> Result<bool> {
        if *self.matrix.fail_columns.lock() {
            return Err(HalError::Unavailable("injected column failure".into()));
        }
        let pressed = *self.matrix.pressed.lock();
        match pressed {
            Some((row, col)) if col == self.col && !self.matrix.rows[row].level() => Ok(false),
            _ => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_pin_shared_state() {
        let pin = MockPin::new(true);
        let mut owned = pin.clone();

        assert!(owned.read().unwrap());
        pin.set(false);
        assert!(!owned.read().unwrap());

        owned.write(true).unwrap();
        assert!(pin.level());
        assert_eq!(pin.writes(), vec![true]);
    }

    #[test]
    fn test_mock_pin_failure_injection() {
        let pin = MockPin::new(true);
        let mut owned = pin.clone();
        pin.fail_reads(1);

        assert!(owned.read().is_err());
        assert!(owned.read().is_ok());
    }

    #[test]
    fn test_mock_matrix_needs_row_driven_low() {
        let matrix = MockMatrix::new();
        let mut rows = matrix.row_outputs();
        let mut cols = matrix.column_inputs();
        matrix.press(Some((1, 2)));

        assert!(cols[2].read().unwrap());
        rows[1].write(false).unwrap();
        assert!(!cols[2].read().unwrap());
        assert!(cols[1].read().unwrap());
    }
}
