//! # VR4300 Register File
//!
//! 32 general-purpose 64-bit registers plus the multiply/divide pair HI/LO.
//!
//! - **r0 (zero)**: Hardwired to zero, writes are discarded
//! - **r29 (sp)**: Stack pointer (by convention)
//! - **r31 (ra)**: Link register written by JAL/JALR/BxxAL
//!
//! The program counter lives in [`R4300`](super::r4300::R4300) together with
//! `next_pc`, which is how branch delay slots are modeled.

use serde::{Deserialize, Serialize};

/// Stack Pointer register index.
pub const REG_SP: usize = 29;

/// Return Address register index.
pub const REG_RA: usize = 31;

/// Conventional assembler names, indexed by register number.
pub const REGISTER_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp",
    "fp", "ra",
];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    gpr: [u64; 32],
    pub hi: u64,
    pub lo: u64,
}

impl RegisterFile {
    #[must_use]
    pub const fn register_at(&self, reg: usize) -> u64 {
        self.gpr[reg & 0x1F]
    }

    /// Writes a register; writes to r0 are discarded.
    pub const fn set_register_at(&mut self, reg: usize, value: u64) {
        if reg & 0x1F != 0 {
            self.gpr[reg & 0x1F] = value;
        }
    }

    /// Writes the sign-extended low 32 bits of `value`.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_possible_wrap)]
    #[allow(clippy::cast_sign_loss)]
    pub const fn set_register_word(&mut self, reg: usize, value: u32) {
        self.set_register_at(reg, value as i32 as i64 as u64);
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<u64> {
        self.gpr.to_vec()
    }
}
