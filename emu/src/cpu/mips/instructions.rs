//! # MIPS III Instruction Decoding
//!
//! Every instruction word shares one of three layouts:
//!
//! ```text
//! I-type  |  op (6) |  rs (5) |  rt (5) |          immediate (16)           |
//! J-type  |  op (6) |                   target (26)                         |
//! R-type  |  op (6) |  rs (5) |  rt (5) |  rd (5) |  sa (5) |  function (6) |
//!          31     26 25     21 20     16 15     11 10      6 5             0
//! ```
//!
//! The primary opcode selects the instruction, except for three groups that
//! need a second field:
//!
//! - `SPECIAL` (op 0): selected by `function`
//! - `REGIMM` (op 1): selected by `rt`
//! - `COP0` (op 16): selected by `rs`, and by `function` when `rs` has bit 4 set
//!
//! Decoding is total: any word without a meaning decodes to
//! [`Opcode::Reserved`], which the interpreter turns into a Reserved
//! Instruction exception. Fields an instruction does not use are zero.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::registers::REGISTER_NAMES;

use super::opcode::{self, AddressingMode, Format, OperationKind, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub kind: OperationKind,
    pub addressing: AddressingMode,
    pub rs: usize,
    pub rt: usize,
    pub rd: usize,
    pub sa: u32,
    pub immediate: u16,
    /// 26-bit instruction index of J/JAL.
    pub target: u32,
}

impl Instruction {
    /// The immediate sign-extended to 64 bits.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    #[allow(clippy::cast_sign_loss)]
    pub const fn signed_immediate(&self) -> u64 {
        self.immediate as i16 as i64 as u64
    }

    /// Branch displacement in bytes.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn branch_offset(&self) -> i64 {
        (self.immediate as i16 as i64) << 2
    }
}

impl From<u32> for Instruction {
    fn from(word: u32) -> Self {
        let op = word.get_bits(26..=31);
        let rs = word.get_bits(21..=25);
        let rt = word.get_bits(16..=20);
        let function = word.get_bits(0..=5);

        let opcode = match op {
            0x00 => opcode::special(function),
            0x01 => opcode::regimm(rt),
            0x10 => opcode::cop0(rs, function),
            _ => opcode::primary(op),
        };

        let rs = rs as usize;
        let rt = rt as usize;
        let rd = word.get_bits(11..=15) as usize;
        let sa = word.get_bits(6..=10);
        #[allow(clippy::cast_possible_truncation)]
        let immediate = word.get_bits(0..=15) as u16;
        let target = word.get_bits(0..=25);

        let mut instruction = Self {
            opcode,
            kind: opcode.kind(),
            addressing: opcode.addressing(),
            rs: 0,
            rt: 0,
            rd: 0,
            sa: 0,
            immediate: 0,
            target: 0,
        };

        match opcode.format() {
            Format::RsRtRd => {
                instruction.rs = rs;
                instruction.rt = rt;
                instruction.rd = rd;
            }
            Format::RtRdSa => {
                instruction.rt = rt;
                instruction.rd = rd;
                instruction.sa = sa;
            }
            Format::Rs => instruction.rs = rs,
            Format::RsRd => {
                instruction.rs = rs;
                instruction.rd = rd;
            }
            Format::Rd => instruction.rd = rd,
            Format::RsRt => {
                instruction.rs = rs;
                instruction.rt = rt;
            }
            Format::RsImm => {
                instruction.rs = rs;
                instruction.immediate = immediate;
            }
            Format::RtImm => {
                instruction.rt = rt;
                instruction.immediate = immediate;
            }
            Format::RsRtImm => {
                instruction.rs = rs;
                instruction.rt = rt;
                instruction.immediate = immediate;
            }
            Format::RtRd => {
                instruction.rt = rt;
                instruction.rd = rd;
            }
            Format::Target => instruction.target = target,
            Format::None => {}
        }

        instruction
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = |reg: usize| REGISTER_NAMES[reg];
        let mnemonic = self.opcode.mnemonic();
        #[allow(clippy::cast_possible_wrap)]
        let signed = self.immediate as i16;

        if self.opcode == Opcode::Sll && self.rd == 0 && self.rt == 0 && self.sa == 0 {
            return write!(f, "nop");
        }

        match self.opcode.format() {
            Format::RsRtRd => {
                let (rd, rs, rt) = (name(self.rd), name(self.rs), name(self.rt));
                if self.kind == OperationKind::Shift {
                    write!(f, "{mnemonic} {rd}, {rt}, {rs}")
                } else {
                    write!(f, "{mnemonic} {rd}, {rs}, {rt}")
                }
            }
            Format::RtRdSa => {
                write!(f, "{mnemonic} {}, {}, {}", name(self.rd), name(self.rt), self.sa)
            }
            Format::Rs => write!(f, "{mnemonic} {}", name(self.rs)),
            Format::RsRd => write!(f, "{mnemonic} {}, {}", name(self.rd), name(self.rs)),
            Format::Rd => write!(f, "{mnemonic} {}", name(self.rd)),
            Format::RsRt => write!(f, "{mnemonic} {}, {}", name(self.rs), name(self.rt)),
            Format::RsImm => {
                if self.kind == OperationKind::Branch {
                    write!(f, "{mnemonic} {}, {}", name(self.rs), self.branch_offset())
                } else {
                    write!(f, "{mnemonic} {}, {signed}", name(self.rs))
                }
            }
            Format::RtImm => write!(f, "{mnemonic} {}, 0x{:04X}", name(self.rt), self.immediate),
            Format::RsRtImm => {
                let (rs, rt) = (name(self.rs), name(self.rt));
                match self.addressing {
                    AddressingMode::BaseOffset => write!(f, "{mnemonic} {rt}, {signed}({rs})"),
                    AddressingMode::PcRelative => {
                        write!(f, "{mnemonic} {rs}, {rt}, {}", self.branch_offset())
                    }
                    _ if self.kind == OperationKind::Logical => {
                        write!(f, "{mnemonic} {rt}, {rs}, 0x{:04X}", self.immediate)
                    }
                    _ => write!(f, "{mnemonic} {rt}, {rs}, {signed}"),
                }
            }
            Format::RtRd => write!(f, "{mnemonic} {}, ${}", name(self.rt), self.rd),
            Format::Target => write!(f, "{mnemonic} 0x{:07X}", self.target << 2),
            Format::None => write!(f, "{mnemonic}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{RngCore, SeedableRng};

    #[test]
    fn decode_nop() {
        let instruction = Instruction::from(0x0000_0000);

        assert_eq!(
            instruction,
            Instruction {
                opcode: Opcode::Sll,
                kind: OperationKind::Shift,
                addressing: AddressingMode::Register,
                rs: 0,
                rt: 0,
                rd: 0,
                sa: 0,
                immediate: 0,
                target: 0,
            }
        );
        assert_eq!(instruction.to_string(), "nop");
    }

    #[test]
    fn decode_addi() {
        // addi t0, zero, 5
        let instruction = Instruction::from(0x2008_0005);

        assert_eq!(
            instruction,
            Instruction {
                opcode: Opcode::Addi,
                kind: OperationKind::Arithmetic,
                addressing: AddressingMode::Immediate,
                rs: 0,
                rt: 8,
                rd: 0,
                sa: 0,
                immediate: 5,
                target: 0,
            }
        );
        assert_eq!(instruction.to_string(), "addi t0, zero, 5");
    }

    #[test]
    fn decode_beq() {
        // beq t0, t1, -4
        let instruction = Instruction::from(0x1109_FFFF);

        assert_eq!(instruction.opcode, Opcode::Beq);
        assert_eq!(instruction.kind, OperationKind::Branch);
        assert_eq!(instruction.addressing, AddressingMode::PcRelative);
        assert_eq!((instruction.rs, instruction.rt), (8, 9));
        assert_eq!(instruction.immediate, 0xFFFF);
        assert_eq!(instruction.branch_offset(), -4);
        assert_eq!(instruction.to_string(), "beq t0, t1, -4");
    }

    #[test]
    fn decode_table() {
        let cases = [
            (0x0C00_0400, Opcode::Jal, "jal 0x0001000"),
            (0x8FA4_0010, Opcode::Lw, "lw a0, 16(sp)"),
            (0x0085_1020, Opcode::Add, "add v0, a0, a1"),
            (0x0004_2080, Opcode::Sll, "sll a0, a0, 2"),
            (0x03E0_0008, Opcode::Jr, "jr ra"),
            (0x4208_6000, Opcode::Reserved, "reserved"),
            (0x4008_6000, Opcode::Mfc0, "mfc0 t0, $12"),
            (0x4200_0018, Opcode::Eret, "eret"),
            (0x3C08_A400, Opcode::Lui, "lui t0, 0xA400"),
            (0x3508_00FF, Opcode::Ori, "ori t0, t0, 0x00FF"),
            (0x0441_0003, Opcode::Bgez, "bgez v0, 12"),
            (0x0000_000C, Opcode::Syscall, "syscall"),
            (0x0000_0001, Opcode::Reserved, "reserved"),
            (0x4C00_0000, Opcode::Reserved, "reserved"),
            (0x0109_001A, Opcode::Div, "div t0, t1"),
            (0x0001_083C, Opcode::Dsll32, "dsll32 at, at, 0"),
            (0xBD00_0000, Opcode::Cache, "cache zero, 0(t0)"),
            (0x0128_4004, Opcode::Sllv, "sllv t0, t0, t1"),
        ];

        for (word, opcode, text) in cases {
            let instruction = Instruction::from(word);
            assert_eq!(instruction.opcode, opcode, "word 0x{word:08X}");
            assert_eq!(instruction.to_string(), text, "word 0x{word:08X}");
        }
    }

    #[test]
    fn load_store_addressing() {
        // sb t1, -1(a0)
        let instruction = Instruction::from(0xA089_FFFF);

        assert_eq!(instruction.opcode, Opcode::Sb);
        assert_eq!(instruction.kind, OperationKind::Store);
        assert_eq!(instruction.addressing, AddressingMode::BaseOffset);
        assert_eq!(instruction.signed_immediate(), u64::MAX);
        assert_eq!(instruction.to_string(), "sb t1, -1(a0)");
    }

    /// Structural checks that must hold for every word.
    fn assert_well_formed(word: u32, instruction: &Instruction) {
        assert_eq!(
            instruction.kind == OperationKind::Reserved,
            instruction.opcode == Opcode::Reserved,
            "word 0x{word:08X}"
        );

        // Every field is either unused (zero) or the word's own bits.
        let fields = [
            (instruction.rs as u32, word.get_bits(21..=25)),
            (instruction.rt as u32, word.get_bits(16..=20)),
            (instruction.rd as u32, word.get_bits(11..=15)),
            (instruction.sa, word.get_bits(6..=10)),
            (u32::from(instruction.immediate), word.get_bits(0..=15)),
            (instruction.target, word.get_bits(0..=25)),
        ];
        for (decoded, bits) in fields {
            assert!(decoded == 0 || decoded == bits, "word 0x{word:08X}");
        }

        // Unused fields stay zero.
        match instruction.addressing {
            AddressingMode::Absolute => {
                assert_eq!((instruction.rs, instruction.rt, instruction.rd), (0, 0, 0));
            }
            AddressingMode::Implied => {
                let unused = (instruction.rs, instruction.immediate, instruction.target);
                assert_eq!(unused, (0, 0, 0));
            }
            _ => assert_eq!(instruction.target, 0),
        }
    }

    #[test]
    fn decode_is_total() {
        for word in 0..=u32::MAX {
            assert_well_formed(word, &Instruction::from(word));
        }
    }

    #[test]
    fn display_is_total() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x4E36_3400);

        for _ in 0..200_000 {
            let word = rng.next_u32();
            let instruction = Instruction::from(word);

            assert_well_formed(word, &instruction);
            assert!(!instruction.to_string().is_empty());
        }
    }
}
