//! Multi-digit preset entry
//!
//! Digits typed on the keypad accumulate into a preset number. The number is
//! committed once no digit arrived for the inter-key timeout, or as soon as
//! the buffer is full. Letters `A`-`D` select a bank immediately and discard
//! any digits typed so far.

use std::time::{Duration, Instant};

use tracing::debug;

/// Default inter-key timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(400);

/// Default number of digits after which the preset commits immediately
pub const DEFAULT_MAX_DIGITS: usize = 3;

/// Command produced by the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCommand {
    /// Bank 0-3 (keys A-D)
    SelectBank(u8),
    /// Preset number as typed; may exceed the MIDI range
    SelectPreset(u16),
}

/// Accumulates keypad digits into preset numbers
#[derive(Debug)]
pub struct DigitAccumulator {
    buffer: String,
    last_digit: Option<Instant>,
    timeout: Duration,
    max_digits: usize,
}

impl DigitAccumulator {
    pub fn new(timeout: Duration, max_digits: usize) -> Self {
        Self {
            buffer: String::with_capacity(max_digits),
            last_digit: None,
            timeout,
            max_digits,
        }
    }

    /// True while digits are waiting to be committed
    pub fn is_pending(&self) -> bool {
        self.last_digit.is_some()
    }

    /// Digits typed so far
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Feed one key symbol
    pub fn press(&mut self, symbol: char, now: Instant) -> Option<SequenceCommand> {
        match symbol {
            'A'..='D' => {
                self.clear();
                let bank = symbol as u8 - b'A';
                debug!(bank, "Bank key");
                Some(SequenceCommand::SelectBank(bank))
            }
            '0'..='9' => {
                // A late digit starts a new number; the old one is due
                let expired = self.poll(now);

                self.buffer.push(symbol);
                self.last_digit = Some(now);

                if self.buffer.len() >= self.max_digits {
                    return self.commit().or(expired);
                }
                expired
            }
            _ => None,
        }
    }

    /// Commit the buffer if the timeout elapsed since the last digit
    pub fn poll(&mut self, now: Instant) -> Option<SequenceCommand> {
        let last = self.last_digit?;
        if now.saturating_duration_since(last) >= self.timeout {
            self.commit()
        } else {
            None
        }
    }

    fn commit(&mut self) -> Option<SequenceCommand> {
        let preset = self.buffer.parse::<u16>().ok();
        debug!(buffer = %self.buffer, ?preset, "Committing preset");
        self.clear();
        preset.map(SequenceCommand::SelectPreset)
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.last_digit = None;
    }
}

impl Default for DigitAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_MAX_DIGITS)
    }
}
