use serde::{Deserialize, Serialize};

/// Every operation the VR4300 interpreter knows, plus `Reserved` for the
/// encodings it does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // SPECIAL
    Sll,
    Srl,
    Sra,
    Sllv,
    Srlv,
    Srav,
    Jr,
    Jalr,
    Syscall,
    Break,
    Sync,
    Mfhi,
    Mthi,
    Mflo,
    Mtlo,
    Dsllv,
    Dsrlv,
    Dsrav,
    Mult,
    Multu,
    Div,
    Divu,
    Dmult,
    Dmultu,
    Ddiv,
    Ddivu,
    Add,
    Addu,
    Sub,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
    Dadd,
    Daddu,
    Dsub,
    Dsubu,
    Tge,
    Tgeu,
    Tlt,
    Tltu,
    Teq,
    Tne,
    Dsll,
    Dsrl,
    Dsra,
    Dsll32,
    Dsrl32,
    Dsra32,

    // REGIMM
    Bltz,
    Bgez,
    Bltzl,
    Bgezl,
    Tgei,
    Tgeiu,
    Tlti,
    Tltiu,
    Teqi,
    Tnei,
    Bltzal,
    Bgezal,
    Bltzall,
    Bgezall,

    // Primary
    J,
    Jal,
    Beq,
    Bne,
    Blez,
    Bgtz,
    Addi,
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
    Lui,
    Beql,
    Bnel,
    Blezl,
    Bgtzl,
    Daddi,
    Daddiu,
    Ldl,
    Ldr,
    Lb,
    Lh,
    Lwl,
    Lw,
    Lbu,
    Lhu,
    Lwr,
    Lwu,
    Sb,
    Sh,
    Swl,
    Sw,
    Sdl,
    Sdr,
    Swr,
    Cache,
    Ll,
    Lld,
    Ld,
    Sc,
    Scd,
    Sd,

    // COP0
    Mfc0,
    Dmfc0,
    Mtc0,
    Dmtc0,
    Tlbr,
    Tlbwi,
    Tlbwr,
    Tlbp,
    Eret,

    // COP1/COP2 and their loads/stores
    Cop1,
    Cop2,
    Lwc1,
    Ldc1,
    Swc1,
    Sdc1,
    Lwc2,
    Ldc2,
    Swc2,
    Sdc2,

    Reserved,
}

/// Coarse class of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Arithmetic,
    Logical,
    Shift,
    Branch,
    Jump,
    Load,
    Store,
    System,
    Coprocessor,
    Reserved,
}

/// Where the operands of an operation come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressingMode {
    /// Register operands only.
    Register,
    /// Register and 16-bit immediate.
    Immediate,
    /// `offset(base)` memory operand.
    BaseOffset,
    /// Branch offset relative to the delay slot.
    PcRelative,
    /// 26-bit jump target within the current 256 MiB segment.
    Absolute,
    /// Jump through a register.
    RegisterIndirect,
    /// No operands.
    Implied,
}

/// Which encoding fields an operation uses; the others decode as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Format {
    RsRtRd,
    RtRdSa,
    Rs,
    RsRd,
    Rd,
    RsRt,
    RsImm,
    RtImm,
    RsRtImm,
    RtRd,
    Target,
    None,
}

impl Opcode {
    #[must_use]
    pub const fn kind(self) -> OperationKind {
        use Opcode::*;
        match self {
            Add | Addu | Sub | Subu | Dadd | Daddu | Dsub | Dsubu | Addi | Addiu | Daddi
            | Daddiu | Slt | Sltu | Slti | Sltiu | Lui | Mult | Multu | Div | Divu | Dmult
            | Dmultu | Ddiv | Ddivu | Mfhi | Mthi | Mflo | Mtlo => OperationKind::Arithmetic,
            And | Or | Xor | Nor | Andi | Ori | Xori => OperationKind::Logical,
            Sll | Srl | Sra | Sllv | Srlv | Srav | Dsll | Dsrl | Dsra | Dsllv | Dsrlv | Dsrav
            | Dsll32 | Dsrl32 | Dsra32 => OperationKind::Shift,
            Beq | Bne | Blez | Bgtz | Beql | Bnel | Blezl | Bgtzl | Bltz | Bgez | Bltzl
            | Bgezl | Bltzal | Bgezal | Bltzall | Bgezall => OperationKind::Branch,
            J | Jal | Jr | Jalr => OperationKind::Jump,
            Lb | Lbu | Lh | Lhu | Lw | Lwu | Lwl | Lwr | Ld | Ldl | Ldr | Ll | Lld => {
                OperationKind::Load
            }
            Sb | Sh | Sw | Swl | Swr | Sd | Sdl | Sdr | Sc | Scd => OperationKind::Store,
            Syscall | Break | Sync | Cache | Tge | Tgeu | Tlt | Tltu | Teq | Tne | Tgei | Tgeiu
            | Tlti | Tltiu | Teqi | Tnei | Tlbr | Tlbwi | Tlbwr | Tlbp | Eret => {
                OperationKind::System
            }
            Mfc0 | Dmfc0 | Mtc0 | Dmtc0 | Cop1 | Cop2 | Lwc1 | Ldc1 | Swc1 | Sdc1 | Lwc2
            | Ldc2 | Swc2 | Sdc2 => OperationKind::Coprocessor,
            Reserved => OperationKind::Reserved,
        }
    }

    #[must_use]
    pub const fn addressing(self) -> AddressingMode {
        use Opcode::*;
        match self {
            J | Jal => AddressingMode::Absolute,
            Jr | Jalr => AddressingMode::RegisterIndirect,
            Syscall | Break | Sync | Tlbr | Tlbwi | Tlbwr | Tlbp | Eret | Cop1 | Cop2
            | Reserved => AddressingMode::Implied,
            _ => match self.kind() {
                OperationKind::Branch => AddressingMode::PcRelative,
                OperationKind::Load | OperationKind::Store => AddressingMode::BaseOffset,
                _ => match self.format() {
                    Format::RsRtImm | Format::RtImm | Format::RsImm => {
                        if matches!(
                            self,
                            Cache | Lwc1 | Ldc1 | Swc1 | Sdc1 | Lwc2 | Ldc2 | Swc2 | Sdc2
                        ) {
                            AddressingMode::BaseOffset
                        } else {
                            AddressingMode::Immediate
                        }
                    }
                    _ => AddressingMode::Register,
                },
            },
        }
    }

    pub(crate) const fn format(self) -> Format {
        use Opcode::*;
        match self {
            Add | Addu | Sub | Subu | And | Or | Xor | Nor | Slt | Sltu | Dadd | Daddu | Dsub
            | Dsubu | Sllv | Srlv | Srav | Dsllv | Dsrlv | Dsrav => Format::RsRtRd,
            Sll | Srl | Sra | Dsll | Dsrl | Dsra | Dsll32 | Dsrl32 | Dsra32 => Format::RtRdSa,
            Jr | Mthi | Mtlo => Format::Rs,
            Jalr => Format::RsRd,
            Mfhi | Mflo => Format::Rd,
            Mult | Multu | Div | Divu | Dmult | Dmultu | Ddiv | Ddivu | Tge | Tgeu | Tlt | Tltu
            | Teq | Tne => Format::RsRt,
            Bltz | Bgez | Bltzl | Bgezl | Bltzal | Bgezal | Bltzall | Bgezall | Blez | Bgtz
            | Blezl | Bgtzl | Tgei | Tgeiu | Tlti | Tltiu | Teqi | Tnei => Format::RsImm,
            Lui => Format::RtImm,
            Beq | Bne | Beql | Bnel | Addi | Addiu | Slti | Sltiu | Andi | Ori | Xori | Daddi
            | Daddiu | Ldl | Ldr | Lb | Lh | Lwl | Lw | Lbu | Lhu | Lwr | Lwu | Sb | Sh | Swl
            | Sw | Sdl | Sdr | Swr | Cache | Ll | Lld | Ld | Sc | Scd | Sd | Lwc1 | Ldc1
            | Swc1 | Sdc1 | Lwc2 | Ldc2 | Swc2 | Sdc2 => Format::RsRtImm,
            Mfc0 | Dmfc0 | Mtc0 | Dmtc0 => Format::RtRd,
            J | Jal => Format::Target,
            Syscall | Break | Sync | Tlbr | Tlbwi | Tlbwr | Tlbp | Eret | Cop1 | Cop2
            | Reserved => Format::None,
        }
    }

    /// Lowercase assembler mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> String {
        format!("{self:?}").to_lowercase()
    }
}

pub(crate) const fn special(function: u32) -> Opcode {
    use Opcode::*;
    match function {
        0x00 => Sll,
        0x02 => Srl,
        0x03 => Sra,
        0x04 => Sllv,
        0x06 => Srlv,
        0x07 => Srav,
        0x08 => Jr,
        0x09 => Jalr,
        0x0C => Syscall,
        0x0D => Break,
        0x0F => Sync,
        0x10 => Mfhi,
        0x11 => Mthi,
        0x12 => Mflo,
        0x13 => Mtlo,
        0x14 => Dsllv,
        0x16 => Dsrlv,
        0x17 => Dsrav,
        0x18 => Mult,
        0x19 => Multu,
        0x1A => Div,
        0x1B => Divu,
        0x1C => Dmult,
        0x1D => Dmultu,
        0x1E => Ddiv,
        0x1F => Ddivu,
        0x20 => Add,
        0x21 => Addu,
        0x22 => Sub,
        0x23 => Subu,
        0x24 => And,
        0x25 => Or,
        0x26 => Xor,
        0x27 => Nor,
        0x2A => Slt,
        0x2B => Sltu,
        0x2C => Dadd,
        0x2D => Daddu,
        0x2E => Dsub,
        0x2F => Dsubu,
        0x30 => Tge,
        0x31 => Tgeu,
        0x32 => Tlt,
        0x33 => Tltu,
        0x34 => Teq,
        0x36 => Tne,
        0x38 => Dsll,
        0x3A => Dsrl,
        0x3B => Dsra,
        0x3C => Dsll32,
        0x3E => Dsrl32,
        0x3F => Dsra32,
        _ => Reserved,
    }
}

pub(crate) const fn regimm(rt: u32) -> Opcode {
    use Opcode::*;
    match rt {
        0x00 => Bltz,
        0x01 => Bgez,
        0x02 => Bltzl,
        0x03 => Bgezl,
        0x08 => Tgei,
        0x09 => Tgeiu,
        0x0A => Tlti,
        0x0B => Tltiu,
        0x0C => Teqi,
        0x0E => Tnei,
        0x10 => Bltzal,
        0x11 => Bgezal,
        0x12 => Bltzall,
        0x13 => Bgezall,
        _ => Reserved,
    }
}

pub(crate) const fn cop0(rs: u32, function: u32) -> Opcode {
    use Opcode::*;
    match rs {
        0x00 => Mfc0,
        0x01 => Dmfc0,
        0x04 => Mtc0,
        0x05 => Dmtc0,
        0x10..=0x1F => match function {
            0x01 => Tlbr,
            0x02 => Tlbwi,
            0x06 => Tlbwr,
            0x08 => Tlbp,
            0x18 => Eret,
            _ => Reserved,
        },
        _ => Reserved,
    }
}

pub(crate) const fn primary(op: u32) -> Opcode {
    use Opcode::*;
    match op {
        0x02 => J,
        0x03 => Jal,
        0x04 => Beq,
        0x05 => Bne,
        0x06 => Blez,
        0x07 => Bgtz,
        0x08 => Addi,
        0x09 => Addiu,
        0x0A => Slti,
        0x0B => Sltiu,
        0x0C => Andi,
        0x0D => Ori,
        0x0E => Xori,
        0x0F => Lui,
        0x11 => Cop1,
        0x12 => Cop2,
        0x14 => Beql,
        0x15 => Bnel,
        0x16 => Blezl,
        0x17 => Bgtzl,
        0x18 => Daddi,
        0x19 => Daddiu,
        0x1A => Ldl,
        0x1B => Ldr,
        0x20 => Lb,
        0x21 => Lh,
        0x22 => Lwl,
        0x23 => Lw,
        0x24 => Lbu,
        0x25 => Lhu,
        0x26 => Lwr,
        0x27 => Lwu,
        0x28 => Sb,
        0x29 => Sh,
        0x2A => Swl,
        0x2B => Sw,
        0x2C => Sdl,
        0x2D => Sdr,
        0x2E => Swr,
        0x2F => Cache,
        0x30 => Ll,
        0x31 => Lwc1,
        0x32 => Lwc2,
        0x34 => Lld,
        0x35 => Ldc1,
        0x36 => Ldc2,
        0x37 => Ld,
        0x38 => Sc,
        0x39 => Swc1,
        0x3A => Swc2,
        0x3C => Scd,
        0x3D => Sdc1,
        0x3E => Sdc2,
        0x3F => Sd,
        _ => Reserved,
    }
}
