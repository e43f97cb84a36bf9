//! Runtime configuration of the emulated machine.
//!
//! Every field has a hardware default (NTSC console, 8 MiB expansion RDRAM),
//! so an empty JSON object `{}` is a valid configuration.

use serde::{Deserialize, Serialize};

/// VR4300 pipeline clock of a retail console.
pub const DEFAULT_CPU_CLOCK_HZ: u64 = 93_750_000;

/// NTSC field rate.
pub const DEFAULT_FRAME_RATE: u64 = 60;

/// RDRAM with the expansion pak inserted.
pub const DEFAULT_RDRAM_SIZE: u32 = 8 * 1024 * 1024;

/// Largest retail cartridge (64 MiB).
pub const DEFAULT_ROM_WINDOW_SIZE: u32 = 64 * 1024 * 1024;

/// Half-line used by libultra for the vertical interrupt.
pub const DEFAULT_VI_INTERRUPT_LINE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmuConfig {
    pub cpu_clock_hz: u64,
    pub frame_rate: u64,
    pub rdram_size: u32,
    pub rom_window_size: u32,
    pub vi_interrupt_line: u32,
}

impl Default for EmuConfig {
    fn default() -> Self {
        Self {
            cpu_clock_hz: DEFAULT_CPU_CLOCK_HZ,
            frame_rate: DEFAULT_FRAME_RATE,
            rdram_size: DEFAULT_RDRAM_SIZE,
            rom_window_size: DEFAULT_ROM_WINDOW_SIZE,
            vi_interrupt_line: DEFAULT_VI_INTERRUPT_LINE,
        }
    }
}

impl EmuConfig {
    /// CPU cycles that make up one video frame.
    #[must_use]
    pub const fn cycles_per_frame(&self) -> u64 {
        if self.frame_rate == 0 {
            self.cpu_clock_hz
        } else {
            self.cpu_clock_hz / self.frame_rate
        }
    }

    /// Parses a JSON configuration; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the document is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_frame_budget() {
        assert_eq!(EmuConfig::default().cycles_per_frame(), 1_562_500);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EmuConfig::from_json(r#"{ "frame_rate": 50 }"#).unwrap();

        assert_eq!(config.frame_rate, 50);
        assert_eq!(config.rdram_size, DEFAULT_RDRAM_SIZE);
        assert_eq!(config.cycles_per_frame(), 1_875_000);
    }

    #[test]
    fn zero_frame_rate_does_not_divide_by_zero() {
        let config = EmuConfig {
            frame_rate: 0,
            ..EmuConfig::default()
        };

        assert_eq!(config.cycles_per_frame(), DEFAULT_CPU_CLOCK_HZ);
    }
}
