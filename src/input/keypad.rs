//! 4x4 matrix keypad scanner
//!
//! Rows are outputs idling HIGH, columns are inputs with pull-ups. A scan
//! drives one row LOW at a time and looks for a column pulled LOW through a
//! closed key. A row is put back HIGH before moving on, whatever the column
//! reads returned.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::hal::{DigitalInput, DigitalOutput, Result};

/// Keypad dimension (rows and columns)
pub const SIZE: usize = 4;

/// Symbol layout of the keypad
pub type Layout = [[char; SIZE]; SIZE];

/// Default layout of a 4x4 membrane keypad
pub const DEFAULT_LAYOUT: Layout = [
    ['1', '2', '3', 'A'],
    ['4', '5', '6', 'B'],
    ['7', '8', '9', 'C'],
    ['*', '0', '#', 'D'],
];

/// Whether a scan waits for the key to be released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Return a key once, after it has been released
    Blocking,
    /// Return whatever is held on every scan
    #[default]
    NonBlocking,
}

/// A pressed key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    pub symbol: char,
    pub row: usize,
    pub col: usize,
}

/// Release wait settings for [`Keypad::scan_blocking`]
#[derive(Debug, Clone, Copy)]
pub struct ReleaseTiming {
    pub poll: Duration,
    pub timeout: Duration,
}

impl Default for ReleaseTiming {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Matrix scanner owning its row and column pins
pub struct Keypad {
    rows: Vec<Box<dyn DigitalOutput>>,
    cols: Vec<Box<dyn DigitalInput>>,
    layout: Layout,
    release: ReleaseTiming,
}

impl Keypad {
    /// Build the scanner and drive every row HIGH
    pub fn new(
        mut rows: Vec<Box<dyn DigitalOutput>>,
        cols: Vec<Box<dyn DigitalInput>>,
        layout: Layout,
        release: ReleaseTiming,
    ) -> Result<Self> {
        for row in rows.iter_mut() {
            row.write(true)?;
        }
        Ok(Self {
            rows,
            cols,
            layout,
            release,
        })
    }

    /// Scan the whole matrix once; first closed key wins
    pub fn scan(&mut self) -> Result<Option<Key>> {
        for row in 0..self.rows.len() {
            if let Some(col) = self.scan_row(row)? {
                let key = Key {
                    symbol: self.layout[row][col],
                    row,
                    col,
                };
                trace!(symbol = %key.symbol, row, col, "Key down");
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    /// Scan, then wait for the key to be released before returning it
    ///
    /// A key held longer than the release timeout is returned anyway so a
    /// stuck key cannot wedge the caller.
    pub fn scan_blocking(&mut self) -> Result<Option<Key>> {
        let Some(key) = self.scan()? else {
            return Ok(None);
        };

        let started = Instant::now();
        while self.is_held(key)? {
            if started.elapsed() >= self.release.timeout {
                warn!(symbol = %key.symbol, "Key not released, continuing");
                break;
            }
            thread::sleep(self.release.poll);
        }
        Ok(Some(key))
    }

    /// Scan according to `mode`
    pub fn scan_with(&mut self, mode: ScanMode) -> Result<Option<Key>> {
        match mode {
            ScanMode::Blocking => self.scan_blocking(),
            ScanMode::NonBlocking => self.scan(),
        }
    }

    fn is_held(&mut self, key: Key) -> Result<bool> {
        self.rows[key.row].write(false)?;
        let level = self.cols[key.col].read();
        self.rows[key.row].write(true)?;
        Ok(!level?)
    }

    /// Drive `row` LOW, return the first column reading LOW, restore the row
    fn scan_row(&mut self, row: usize) -> Result<Option<usize>> {
        self.rows[row].write(false)?;

        let mut hit = Ok(None);
        for (col, input) in self.cols.iter_mut().enumerate() {
            match input.read() {
                Ok(false) => {
                    hit = Ok(Some(col));
                    break;
                }
                Ok(true) => {}
                Err(e) => {
                    hit = Err(e);
                    break;
                }
            }
        }

        self.rows[row].write(true)?;
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockMatrix;

    fn keypad(matrix: &MockMatrix, release: ReleaseTiming) -> Keypad {
        Keypad::new(matrix.row_outputs(), matrix.column_inputs(), DEFAULT_LAYOUT, release).unwrap()
    }

    fn rows_high(matrix: &MockMatrix) -> bool {
        matrix.rows().iter().all(|r| r.level())
    }

    #[test]
    fn test_scan_finds_symbol() {
        let matrix = MockMatrix::new();
        let mut pad = keypad(&matrix, ReleaseTiming::default());

        assert_eq!(pad.scan().unwrap(), None);

        matrix.press(Some((2, 1)));
        let key = pad.scan().unwrap().unwrap();
        assert_eq!(key.symbol, '8');
        assert_eq!((key.row, key.col), (2, 1));

        matrix.press(Some((3, 3)));
        assert_eq!(pad.scan().unwrap().unwrap().symbol, 'D');
    }

    #[test]
    fn test_rows_restored_high() {
        let matrix = MockMatrix::new();
        let mut pad = keypad(&matrix, ReleaseTiming::default());

        matrix.press(Some((1, 0)));
        pad.scan().unwrap();
        assert!(rows_high(&matrix));

        matrix.press(None);
        pad.scan().unwrap();
        assert!(rows_high(&matrix));
    }

    #[test]
    fn test_rows_restored_on_column_failure() {
        let matrix = MockMatrix::new();
        let mut pad = keypad(&matrix, ReleaseTiming::default());

        matrix.fail_columns(true);
        assert!(pad.scan().is_err());
        assert!(rows_high(&matrix));

        // Every row that went LOW came back HIGH
        let first = &matrix.rows()[0];
        assert_eq!(first.writes().last(), Some(&true));
    }

    #[test]
    fn test_blocking_waits_for_release() {
        let matrix = MockMatrix::new();
        let mut pad = keypad(
            &matrix,
            ReleaseTiming {
                poll: Duration::from_millis(1),
                timeout: Duration::from_secs(2),
            },
        );

        matrix.press(Some((0, 2)));
        let releaser = {
            let matrix = matrix.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                matrix.press(None);
            })
        };

        let started = Instant::now();
        let key = pad.scan_blocking().unwrap().unwrap();
        assert_eq!(key.symbol, '3');
        assert!(started.elapsed() >= Duration::from_millis(25));
        assert!(rows_high(&matrix));
        releaser.join().unwrap();
    }

    #[test]
    fn test_blocking_gives_up_on_stuck_key() {
        let matrix = MockMatrix::new();
        let mut pad = keypad(
            &matrix,
            ReleaseTiming {
                poll: Duration::from_millis(1),
                timeout: Duration::from_millis(20),
            },
        );

        matrix.press(Some((3, 0)));
        let key = pad.scan_blocking().unwrap().unwrap();
        assert_eq!(key.symbol, '*');
    }

    #[test]
    fn test_non_blocking_reports_while_held() {
        let matrix = MockMatrix::new();
        let mut pad = keypad(&matrix, ReleaseTiming::default());

        matrix.press(Some((0, 0)));
        assert_eq!(pad.scan_with(ScanMode::NonBlocking).unwrap().unwrap().symbol, '1');
        assert_eq!(pad.scan_with(ScanMode::NonBlocking).unwrap().unwrap().symbol, '1');
    }
}
