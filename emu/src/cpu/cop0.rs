//! # System Control Coprocessor (COP0)
//!
//! Plain storage for the 32 COP0 registers plus the architectural side
//! effects the interpreter relies on: exception entry/return and the
//! interrupt check. The TLB is not modeled, so the TLB registers are only
//! read back as written.
//!
//! ```text
//! Status   31..28 CU3-CU0   22 BEV   15..8 IM   4..3 KSU   2 ERL   1 EXL   0 IE
//! Cause    31 BD   29..28 CE   15..8 IP   6..2 ExcCode
//! ```
//!
//! `Count` and `Compare` are owned by the timer device and never stored here.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

use super::exception::ExceptionCode;

pub const COP0_RANDOM: usize = 1;
pub const COP0_BAD_VADDR: usize = 8;
pub const COP0_COUNT: usize = 9;
pub const COP0_COMPARE: usize = 11;
pub const COP0_STATUS: usize = 12;
pub const COP0_CAUSE: usize = 13;
pub const COP0_EPC: usize = 14;
pub const COP0_PRID: usize = 15;
pub const COP0_CONFIG: usize = 16;
pub const COP0_LLADDR: usize = 17;
pub const COP0_ERROR_EPC: usize = 30;

const STATUS_IE: u8 = 0;
const STATUS_EXL: u8 = 1;
const STATUS_ERL: u8 = 2;
const STATUS_BEV: u8 = 22;

const CAUSE_BD: u8 = 31;

/// Software interrupt bits IP0/IP1, the only writable part of `Cause`.
const CAUSE_SOFTWARE_IP: u64 = 0x300;
/// Hardware interrupt bits IP2..IP7.
const CAUSE_HARDWARE_IP: u64 = 0xFC00;

/// VR4300 revision 2.2.
pub const PRID_VR4300: u64 = 0x0B22;
pub const CONFIG_RESET: u64 = 0x7006_E463;
/// CU0 and CU1 usable, BEV off, kernel mode.
pub const STATUS_RESET: u64 = 0x3400_0000;

/// General exception vector (kseg0), sign-extended.
pub const EXCEPTION_VECTOR: u64 = 0xFFFF_FFFF_8000_0180;
/// Bootstrap exception vector used while `Status.BEV` is set.
pub const EXCEPTION_VECTOR_BEV: u64 = 0xFFFF_FFFF_BFC0_0380;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cop0 {
    registers: [u64; 32],
    /// Set by LL/LLD, cleared by ERET; checked by SC/SCD.
    pub ll_bit: bool,
}

impl Default for Cop0 {
    fn default() -> Self {
        let mut cop0 = Self {
            registers: [0; 32],
            ll_bit: false,
        };
        cop0.reset();
        cop0
    }
}

impl Cop0 {
    pub fn reset(&mut self) {
        self.registers = [0; 32];
        self.registers[COP0_RANDOM] = 31;
        self.registers[COP0_STATUS] = STATUS_RESET;
        self.registers[COP0_PRID] = PRID_VR4300;
        self.registers[COP0_CONFIG] = CONFIG_RESET;
        self.ll_bit = false;
    }

    #[must_use]
    pub const fn read(&self, reg: usize) -> u64 {
        self.registers[reg & 0x1F]
    }

    /// MTC0/DMTC0 semantics: read-only registers and bits are preserved.
    pub fn write(&mut self, reg: usize, value: u64) {
        let reg = reg & 0x1F;
        match reg {
            COP0_RANDOM | COP0_PRID | COP0_BAD_VADDR => {
                tracing::debug!("write to read-only COP0 register {reg} ignored");
            }
            COP0_CAUSE => {
                let cause = &mut self.registers[COP0_CAUSE];
                *cause = (*cause & !CAUSE_SOFTWARE_IP) | (value & CAUSE_SOFTWARE_IP);
            }
            COP0_COUNT | COP0_COMPARE => {
                tracing::debug!("COP0 timer register {reg} written outside the timer device");
            }
            _ => self.registers[reg] = value,
        }
    }

    #[must_use]
    pub const fn status(&self) -> u64 {
        self.registers[COP0_STATUS]
    }

    #[must_use]
    pub const fn cause(&self) -> u64 {
        self.registers[COP0_CAUSE]
    }

    #[must_use]
    pub fn exl(&self) -> bool {
        self.status().get_bit(STATUS_EXL)
    }

    #[must_use]
    pub fn erl(&self) -> bool {
        self.status().get_bit(STATUS_ERL)
    }

    /// COP0 is always usable in kernel mode, otherwise only with CU0.
    #[must_use]
    pub fn coprocessor_usable(&self, cop: u8) -> bool {
        let status = self.status();
        let kernel = status.get_bits(3..=4) == 0 || self.exl() || self.erl();

        status.get_bit(28 + cop) || (cop == 0 && kernel)
    }

    /// Mirrors the device interrupt lines into `Cause.IP2..IP7`.
    pub fn set_interrupt_lines(&mut self, lines: u32) {
        let cause = &mut self.registers[COP0_CAUSE];
        *cause = (*cause & !CAUSE_HARDWARE_IP) | (u64::from(lines) & CAUSE_HARDWARE_IP);
    }

    /// IE set, not at exception level, and an unmasked line asserted.
    #[must_use]
    pub fn interrupt_pending(&self) -> bool {
        let status = self.status();
        status.get_bit(STATUS_IE)
            && !self.exl()
            && !self.erl()
            && status.get_bits(8..=15) & self.cause().get_bits(8..=15) != 0
    }

    /// Performs exception entry and returns the vector to jump to.
    ///
    /// `pc` is the address of the instruction that raised the exception.
    pub fn enter_exception(
        &mut self,
        code: ExceptionCode,
        pc: u64,
        in_delay_slot: bool,
        bad_address: Option<u64>,
        coprocessor: u8,
    ) -> u64 {
        if !self.exl() {
            let (epc, branch_delay) = if in_delay_slot {
                (pc.wrapping_sub(4), true)
            } else {
                (pc, false)
            };
            self.registers[COP0_EPC] = epc;
            self.registers[COP0_CAUSE].set_bit(CAUSE_BD, branch_delay);
        }

        let cause = &mut self.registers[COP0_CAUSE];
        cause.set_bits(2..=6, code as u64);
        cause.set_bits(28..=29, u64::from(coprocessor));

        if let Some(address) = bad_address {
            self.registers[COP0_BAD_VADDR] = address;
        }

        self.registers[COP0_STATUS].set_bit_on(STATUS_EXL);

        if self.status().get_bit(STATUS_BEV) {
            EXCEPTION_VECTOR_BEV
        } else {
            EXCEPTION_VECTOR
        }
    }

    /// ERET: leaves the exception level and returns the resume address.
    pub fn return_from_exception(&mut self) -> u64 {
        self.ll_bit = false;

        if self.erl() {
            self.registers[COP0_STATUS].set_bit_off(STATUS_ERL);
            self.registers[COP0_ERROR_EPC]
        } else {
            self.registers[COP0_STATUS].set_bit_off(STATUS_EXL);
            self.registers[COP0_EPC]
        }
    }
}
