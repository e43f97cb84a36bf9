use serde::{Deserialize, Serialize};

use super::{Device, DeviceOutput};

/// Offset of the COP0 `Count` register in the timer window.
pub const TIMER_COUNT: u32 = 0x00;
/// Offset of the COP0 `Compare` register in the timer window.
pub const TIMER_COMPARE: u32 = 0x04;

/// The VR4300 programmable timer.
///
/// `Count` runs at half the pipeline clock. When it reaches `Compare` the timer
/// interrupt (`Cause.IP7`) is raised and stays pending until `Compare` is written.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Timer {
    pub count: u32,
    pub compare: u32,
    pending: bool,
    /// Odd cycle left over from the previous tick.
    half_cycle: u64,
}

impl Timer {
    pub fn tick(&mut self, elapsed: u64) {
        let total = self.half_cycle + elapsed;
        let increments = total / 2;
        self.half_cycle = total % 2;

        if increments == 0 {
            return;
        }

        let distance = self.compare.wrapping_sub(self.count);
        if distance != 0 && u64::from(distance) <= increments {
            self.pending = true;
        }

        #[allow(clippy::cast_possible_truncation)]
        let increments = increments as u32;
        self.count = self.count.wrapping_add(increments);
    }

    #[must_use]
    pub const fn is_interrupt_pending(&self) -> bool {
        self.pending
    }
}

impl Device for Timer {
    fn read(&self, offset: u32) -> u32 {
        match offset {
            TIMER_COUNT => self.count,
            TIMER_COMPARE => self.compare,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) -> DeviceOutput {
        match offset {
            TIMER_COUNT => self.count = value,
            TIMER_COMPARE => {
                self.compare = value;
                self.pending = false;
            }
            _ => {}
        }

        DeviceOutput::default()
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
