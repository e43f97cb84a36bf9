use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

use super::{Device, DeviceOutput};

pub const MI_MODE: u32 = 0x00;
pub const MI_VERSION: u32 = 0x04;
pub const MI_INTR: u32 = 0x08;
pub const MI_MASK: u32 = 0x0C;

/// Value reported by retail consoles (RSP 2, RDP 2, RAC 1, IO 2).
const VERSION: u32 = 0x0202_0102;

/// Interrupt sources collected by the MIPS Interface, by bit position in `MI_INTR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MiInterrupt {
    Sp = 0,
    Si = 1,
    Ai = 2,
    Vi = 3,
    Pi = 4,
    Dp = 5,
}

/// MIPS Interface: the RCP interrupt controller wired to `Cause.IP2`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InterruptControl {
    /// Init length (bits 0-6), init mode (7), ebus test mode (8), RDRAM register mode (9).
    pub mode: u32,
    /// Interrupt Request Flags, set by the devices and cleared through their own registers.
    pub interrupt_request: u32,
    pub interrupt_mask: u32,
}

impl InterruptControl {
    pub fn raise(&mut self, interrupt: MiInterrupt) {
        self.interrupt_request.set_bit_on(interrupt as u8);
    }

    pub fn acknowledge(&mut self, interrupt: MiInterrupt) {
        self.interrupt_request.set_bit_off(interrupt as u8);
    }

    /// True when an unmasked source is requesting service.
    #[must_use]
    pub const fn is_interrupt_pending(&self) -> bool {
        self.interrupt_request & self.interrupt_mask & 0x3F != 0
    }

    fn write_mode(&mut self, value: u32) -> DeviceOutput {
        let mut output = DeviceOutput::default();

        self.mode.set_bits(0..=6, value.get_bits(0..=6));
        // Each flag has a clear bit followed by a set bit.
        for (flag, clear_bit) in [(7, 7), (8, 9), (9, 12)] {
            if value.get_bit(clear_bit) {
                self.mode.set_bit_off(flag);
            }
            if value.get_bit(clear_bit + 1) {
                self.mode.set_bit_on(flag);
            }
        }
        if value.get_bit(11) {
            output.acknowledge_interrupt = Some(MiInterrupt::Dp);
        }

        output
    }

    fn write_mask(&mut self, value: u32) {
        for interrupt in 0..6 {
            let clear_bit = interrupt * 2;
            if value.get_bit(clear_bit) {
                self.interrupt_mask.set_bit_off(interrupt);
            }
            if value.get_bit(clear_bit + 1) {
                self.interrupt_mask.set_bit_on(interrupt);
            }
        }
    }
}

impl Device for InterruptControl {
    fn read(&self, offset: u32) -> u32 {
        match offset {
            MI_MODE => self.mode,
            MI_VERSION => VERSION,
            MI_INTR => self.interrupt_request,
            MI_MASK => self.interrupt_mask,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) -> DeviceOutput {
        match offset {
            MI_MODE => self.write_mode(value),
            MI_MASK => {
                self.write_mask(value);
                DeviceOutput::default()
            }
            _ => {
                tracing::debug!("write to read-only MI register 0x{offset:02X}");
                DeviceOutput::default()
            }
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
