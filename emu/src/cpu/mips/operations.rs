use crate::bus::AccessWidth;
use crate::cpu::cop0::{COP0_CAUSE, COP0_COMPARE, COP0_COUNT, COP0_LLADDR};
use crate::cpu::exception::Fault;
use crate::cpu::hardware::DeviceId;
use crate::cpu::hardware::timers::{TIMER_COMPARE, TIMER_COUNT};
use crate::cpu::r4300::{R4300, translate};
use crate::cpu::registers::REG_RA;

use super::instructions::Instruction;
use super::opcode::{OperationKind, Opcode};

const CYCLES_DEFAULT: u64 = 1;
const CYCLES_MULT: u64 = 5;
const CYCLES_DMULT: u64 = 8;
const CYCLES_DIV: u64 = 37;
const CYCLES_DDIV: u64 = 69;

/// Cycles consumed by a completed instruction, or the fault it raised.
type Execution = Result<u64, Fault>;

const fn sign_extend_word(value: u32) -> u64 {
    value as i32 as i64 as u64
}

/// `bits` low bits set, for `bits < 64`.
const fn low_mask(bits: u32) -> u64 {
    (1 << bits) - 1
}

impl R4300 {
    pub(crate) fn execute(&mut self, instruction: Instruction) -> Execution {
        match instruction.kind {
            OperationKind::Arithmetic => self.arithmetic(instruction),
            OperationKind::Logical => self.logical(instruction),
            OperationKind::Shift => self.shift(instruction),
            OperationKind::Branch => self.branch(instruction),
            OperationKind::Jump => self.jump(instruction),
            OperationKind::Load => self.load(instruction),
            OperationKind::Store => self.store(instruction),
            OperationKind::System => self.system(instruction),
            OperationKind::Coprocessor => self.coprocessor(instruction),
            OperationKind::Reserved => {
                tracing::debug!("reserved instruction {instruction:?}");
                Err(Fault::IllegalInstruction)
            }
        }
    }

    const fn reg(&self, index: usize) -> u64 {
        self.registers.register_at(index)
    }

    /// Commits a 32-bit result that may have overflowed.
    fn set_checked_word(&mut self, reg: usize, result: Option<i32>) -> Result<(), Fault> {
        let value = result.ok_or(Fault::ArithmeticOverflow)?;
        self.registers.set_register_word(reg, value as u32);
        Ok(())
    }

    fn set_checked(&mut self, reg: usize, result: Option<i64>) -> Result<(), Fault> {
        let value = result.ok_or(Fault::ArithmeticOverflow)?;
        self.registers.set_register_at(reg, value as u64);
        Ok(())
    }

    fn arithmetic(&mut self, i: Instruction) -> Execution {
        use Opcode::*;

        let rs = self.reg(i.rs);
        let rt = self.reg(i.rt);
        let imm = i.signed_immediate();

        match i.opcode {
            Add => self.set_checked_word(i.rd, (rs as i32).checked_add(rt as i32))?,
            Addu => {
                self.registers
                    .set_register_word(i.rd, (rs as u32).wrapping_add(rt as u32));
            }
            Sub => self.set_checked_word(i.rd, (rs as i32).checked_sub(rt as i32))?,
            Subu => {
                self.registers
                    .set_register_word(i.rd, (rs as u32).wrapping_sub(rt as u32));
            }
            Addi => self.set_checked_word(i.rt, (rs as i32).checked_add(imm as i32))?,
            Addiu => {
                self.registers
                    .set_register_word(i.rt, (rs as u32).wrapping_add(imm as u32));
            }
            Dadd => self.set_checked(i.rd, (rs as i64).checked_add(rt as i64))?,
            Daddu => self.registers.set_register_at(i.rd, rs.wrapping_add(rt)),
            Dsub => self.set_checked(i.rd, (rs as i64).checked_sub(rt as i64))?,
            Dsubu => self.registers.set_register_at(i.rd, rs.wrapping_sub(rt)),
            Daddi => self.set_checked(i.rt, (rs as i64).checked_add(imm as i64))?,
            Daddiu => self.registers.set_register_at(i.rt, rs.wrapping_add(imm)),
            Slt => {
                self.registers
                    .set_register_at(i.rd, u64::from((rs as i64) < (rt as i64)));
            }
            Sltu => self.registers.set_register_at(i.rd, u64::from(rs < rt)),
            Slti => {
                self.registers
                    .set_register_at(i.rt, u64::from((rs as i64) < (imm as i64)));
            }
            Sltiu => self.registers.set_register_at(i.rt, u64::from(rs < imm)),
            Lui => {
                self.registers
                    .set_register_word(i.rt, u32::from(i.immediate) << 16);
            }
            Mfhi => self.registers.set_register_at(i.rd, self.registers.hi),
            Mflo => self.registers.set_register_at(i.rd, self.registers.lo),
            Mthi => self.registers.hi = rs,
            Mtlo => self.registers.lo = rs,
            Mult | Multu | Div | Divu | Dmult | Dmultu | Ddiv | Ddivu => {
                return Ok(self.multiply_divide(i.opcode, rs, rt));
            }
            _ => return Err(Fault::IllegalInstruction),
        }

        Ok(CYCLES_DEFAULT)
    }

    /// HI/LO operations. Division by zero does not trap, it leaves the
    /// values the hardware divider produces.
    fn multiply_divide(&mut self, opcode: Opcode, rs: u64, rt: u64) -> u64 {
        use Opcode::*;

        let (lo, hi, cycles) = match opcode {
            Mult => {
                let product = i64::from(rs as i32) * i64::from(rt as i32);
                (
                    sign_extend_word(product as u32),
                    sign_extend_word((product >> 32) as u32),
                    CYCLES_MULT,
                )
            }
            Multu => {
                let product = u64::from(rs as u32) * u64::from(rt as u32);
                (
                    sign_extend_word(product as u32),
                    sign_extend_word((product >> 32) as u32),
                    CYCLES_MULT,
                )
            }
            Div => {
                let (dividend, divisor) = (rs as i32, rt as i32);
                if divisor == 0 {
                    let lo = if dividend < 0 { 1 } else { u64::MAX };
                    (lo, sign_extend_word(dividend as u32), CYCLES_DIV)
                } else {
                    (
                        sign_extend_word(dividend.wrapping_div(divisor) as u32),
                        sign_extend_word(dividend.wrapping_rem(divisor) as u32),
                        CYCLES_DIV,
                    )
                }
            }
            Divu => {
                let (dividend, divisor) = (rs as u32, rt as u32);
                if divisor == 0 {
                    (u64::MAX, sign_extend_word(dividend), CYCLES_DIV)
                } else {
                    (
                        sign_extend_word(dividend / divisor),
                        sign_extend_word(dividend % divisor),
                        CYCLES_DIV,
                    )
                }
            }
            Dmult => {
                let product = i128::from(rs as i64) * i128::from(rt as i64);
                (product as u64, (product >> 64) as u64, CYCLES_DMULT)
            }
            Dmultu => {
                let product = u128::from(rs) * u128::from(rt);
                (product as u64, (product >> 64) as u64, CYCLES_DMULT)
            }
            Ddiv => {
                let (dividend, divisor) = (rs as i64, rt as i64);
                if divisor == 0 {
                    let lo = if dividend < 0 { 1 } else { u64::MAX };
                    (lo, rs, CYCLES_DDIV)
                } else {
                    (
                        dividend.wrapping_div(divisor) as u64,
                        dividend.wrapping_rem(divisor) as u64,
                        CYCLES_DDIV,
                    )
                }
            }
            _ => {
                // Ddivu
                if rt == 0 {
                    (u64::MAX, rs, CYCLES_DDIV)
                } else {
                    (rs / rt, rs % rt, CYCLES_DDIV)
                }
            }
        };

        self.registers.lo = lo;
        self.registers.hi = hi;
        cycles
    }

    fn logical(&mut self, i: Instruction) -> Execution {
        use Opcode::*;

        let rs = self.reg(i.rs);
        let rt = self.reg(i.rt);
        let imm = u64::from(i.immediate);

        let (reg, value) = match i.opcode {
            And => (i.rd, rs & rt),
            Or => (i.rd, rs | rt),
            Xor => (i.rd, rs ^ rt),
            Nor => (i.rd, !(rs | rt)),
            Andi => (i.rt, rs & imm),
            Ori => (i.rt, rs | imm),
            Xori => (i.rt, rs ^ imm),
            _ => return Err(Fault::IllegalInstruction),
        };
        self.registers.set_register_at(reg, value);

        Ok(CYCLES_DEFAULT)
    }

    fn shift(&mut self, i: Instruction) -> Execution {
        use Opcode::*;

        let rt = self.reg(i.rt);
        let variable = self.reg(i.rs) as u32;
        let word = rt as u32;

        match i.opcode {
            Sll => self.registers.set_register_word(i.rd, word << i.sa),
            Srl => self.registers.set_register_word(i.rd, word >> i.sa),
            // The VR4300 shifts the whole 64-bit register before truncating.
            Sra => {
                self.registers
                    .set_register_word(i.rd, ((rt as i64) >> i.sa) as u32);
            }
            Sllv => self.registers.set_register_word(i.rd, word << (variable & 31)),
            Srlv => self.registers.set_register_word(i.rd, word >> (variable & 31)),
            Srav => {
                self.registers
                    .set_register_word(i.rd, ((rt as i64) >> (variable & 31)) as u32);
            }
            Dsll => self.registers.set_register_at(i.rd, rt << i.sa),
            Dsrl => self.registers.set_register_at(i.rd, rt >> i.sa),
            Dsra => self.registers.set_register_at(i.rd, ((rt as i64) >> i.sa) as u64),
            Dsll32 => self.registers.set_register_at(i.rd, rt << (i.sa + 32)),
            Dsrl32 => self.registers.set_register_at(i.rd, rt >> (i.sa + 32)),
            Dsra32 => {
                self.registers
                    .set_register_at(i.rd, ((rt as i64) >> (i.sa + 32)) as u64);
            }
            Dsllv => self.registers.set_register_at(i.rd, rt << (variable & 63)),
            Dsrlv => self.registers.set_register_at(i.rd, rt >> (variable & 63)),
            Dsrav => {
                self.registers
                    .set_register_at(i.rd, ((rt as i64) >> (variable & 63)) as u64);
            }
            _ => return Err(Fault::IllegalInstruction),
        }

        Ok(CYCLES_DEFAULT)
    }

    /// `pc` already points at the delay slot when this runs.
    fn branch(&mut self, i: Instruction) -> Execution {
        use Opcode::*;

        let rs = self.reg(i.rs);
        let rt = self.reg(i.rt);
        let signed = rs as i64;

        let (taken, likely, link) = match i.opcode {
            Beq => (rs == rt, false, false),
            Bne => (rs != rt, false, false),
            Blez => (signed <= 0, false, false),
            Bgtz => (signed > 0, false, false),
            Bltz => (signed < 0, false, false),
            Bgez => (signed >= 0, false, false),
            Beql => (rs == rt, true, false),
            Bnel => (rs != rt, true, false),
            Blezl => (signed <= 0, true, false),
            Bgtzl => (signed > 0, true, false),
            Bltzl => (signed < 0, true, false),
            Bgezl => (signed >= 0, true, false),
            Bltzal => (signed < 0, false, true),
            Bgezal => (signed >= 0, false, true),
            Bltzall => (signed < 0, true, true),
            Bgezall => (signed >= 0, true, true),
            _ => return Err(Fault::IllegalInstruction),
        };

        if link {
            self.registers
                .set_register_at(REG_RA, self.pc.wrapping_add(4));
        }

        if taken {
            self.branch_to(self.pc.wrapping_add_signed(i.branch_offset()));
        } else if likely {
            self.skip_delay_slot();
        } else {
            self.branch_not_taken();
        }

        Ok(CYCLES_DEFAULT)
    }

    fn jump(&mut self, i: Instruction) -> Execution {
        use Opcode::*;

        let delay_slot = self.pc;
        let return_address = delay_slot.wrapping_add(4);

        match i.opcode {
            J | Jal => {
                let target = (delay_slot & !0x0FFF_FFFF) | (u64::from(i.target) << 2);
                if i.opcode == Jal {
                    self.registers.set_register_at(REG_RA, return_address);
                }
                self.branch_to(target);
            }
            Jr => self.branch_to(self.reg(i.rs)),
            Jalr => {
                let target = self.reg(i.rs);
                self.registers.set_register_at(i.rd, return_address);
                self.branch_to(target);
            }
            _ => return Err(Fault::IllegalInstruction),
        }

        Ok(CYCLES_DEFAULT)
    }

    fn effective_address(&self, i: Instruction) -> u64 {
        self.reg(i.rs).wrapping_add(i.signed_immediate())
    }

    fn load(&mut self, i: Instruction) -> Execution {
        use Opcode::*;

        let address = self.effective_address(i);
        let physical = translate(address);
        let old = self.reg(i.rt);

        match i.opcode {
            Lb => {
                let byte = self.bus.read(physical, AccessWidth::Byte) as u8;
                self.registers.set_register_at(i.rt, byte as i8 as i64 as u64);
            }
            Lbu => {
                let byte = self.bus.read(physical, AccessWidth::Byte);
                self.registers.set_register_at(i.rt, byte);
            }
            Lh => {
                let half = self.bus.read(physical, AccessWidth::HalfWord) as u16;
                self.registers.set_register_at(i.rt, half as i16 as i64 as u64);
            }
            Lhu => {
                let half = self.bus.read(physical, AccessWidth::HalfWord);
                self.registers.set_register_at(i.rt, half);
            }
            Lw | Ll => {
                let word = self.bus.read_word(physical);
                self.registers.set_register_word(i.rt, word);
                if i.opcode == Ll {
                    self.link(physical);
                }
            }
            Lwu => {
                let word = self.bus.read(physical, AccessWidth::Word);
                self.registers.set_register_at(i.rt, word);
            }
            Ld | Lld => {
                let double = self.bus.read(physical, AccessWidth::DoubleWord);
                self.registers.set_register_at(i.rt, double);
                if i.opcode == Lld {
                    self.link(physical);
                }
            }
            Lwl => {
                let shift = 8 * (physical & 3);
                let word = self.bus.read_word(physical);
                let merged = (word << shift) | (old as u32 & low_mask(shift) as u32);
                self.registers.set_register_word(i.rt, merged);
            }
            Lwr => {
                let shift = 8 * (3 - (physical & 3));
                let word = self.bus.read_word(physical);
                let merged = (word >> shift) | (old as u32 & !(u32::MAX >> shift));
                self.registers.set_register_word(i.rt, merged);
            }
            Ldl => {
                let shift = 8 * (physical & 7);
                let double = self.bus.read(physical, AccessWidth::DoubleWord);
                let merged = (double << shift) | (old & low_mask(shift));
                self.registers.set_register_at(i.rt, merged);
            }
            Ldr => {
                let shift = 8 * (7 - (physical & 7));
                let double = self.bus.read(physical, AccessWidth::DoubleWord);
                let merged = (double >> shift) | (old & !(u64::MAX >> shift));
                self.registers.set_register_at(i.rt, merged);
            }
            _ => return Err(Fault::IllegalInstruction),
        }

        Ok(CYCLES_DEFAULT)
    }

    fn link(&mut self, physical: u32) {
        self.cop0.ll_bit = true;
        self.cop0.write(COP0_LLADDR, u64::from(physical >> 4));
    }

    fn store(&mut self, i: Instruction) -> Execution {
        use Opcode::*;

        let address = self.effective_address(i);
        let physical = translate(address);
        let value = self.reg(i.rt);

        match i.opcode {
            Sb => self.bus.write(physical, AccessWidth::Byte, value & 0xFF),
            Sh => self.bus.write(physical, AccessWidth::HalfWord, value & 0xFFFF),
            Sw => self.bus.write(physical, AccessWidth::Word, value & 0xFFFF_FFFF),
            Sd => self.bus.write(physical, AccessWidth::DoubleWord, value),
            Sc | Scd => {
                let linked = self.cop0.ll_bit;
                if linked {
                    let width = if i.opcode == Sc {
                        AccessWidth::Word
                    } else {
                        AccessWidth::DoubleWord
                    };
                    let stored = if i.opcode == Sc { value & 0xFFFF_FFFF } else { value };
                    self.bus.write(physical, width, stored);
                }
                self.registers.set_register_at(i.rt, u64::from(linked));
            }
            Swl => {
                let shift = 8 * (physical & 3);
                let word = self.bus.read_word(physical);
                let merged = (word & !(u32::MAX >> shift)) | ((value as u32) >> shift);
                self.bus.write_word(physical, merged);
            }
            Swr => {
                let shift = 8 * (3 - (physical & 3));
                let word = self.bus.read_word(physical);
                let merged = (word & low_mask(shift) as u32) | ((value as u32) << shift);
                self.bus.write_word(physical, merged);
            }
            Sdl => {
                let shift = 8 * (physical & 7);
                let double = self.bus.read(physical, AccessWidth::DoubleWord);
                let merged = (double & !(u64::MAX >> shift)) | (value >> shift);
                self.bus.write(physical, AccessWidth::DoubleWord, merged);
            }
            Sdr => {
                let shift = 8 * (7 - (physical & 7));
                let double = self.bus.read(physical, AccessWidth::DoubleWord);
                let merged = (double & low_mask(shift)) | (value << shift);
                self.bus.write(physical, AccessWidth::DoubleWord, merged);
            }
            _ => return Err(Fault::IllegalInstruction),
        }

        Ok(CYCLES_DEFAULT)
    }

    fn system(&mut self, i: Instruction) -> Execution {
        use Opcode::*;

        let rs = self.reg(i.rs);
        let rt = self.reg(i.rt);
        let imm = i.signed_immediate();

        let trap = match i.opcode {
            Tge => (rs as i64) >= (rt as i64),
            Tgeu => rs >= rt,
            Tlt => (rs as i64) < (rt as i64),
            Tltu => rs < rt,
            Teq => rs == rt,
            Tne => rs != rt,
            Tgei => (rs as i64) >= (imm as i64),
            Tgeiu => rs >= imm,
            Tlti => (rs as i64) < (imm as i64),
            Tltiu => rs < imm,
            Teqi => rs == imm,
            Tnei => rs != imm,
            Syscall => return Err(Fault::Syscall),
            Break => return Err(Fault::Breakpoint),
            Sync => false,
            Cache | Tlbr | Tlbwi | Tlbwr | Tlbp => {
                self.require_coprocessor(0)?;
                false
            }
            Eret => {
                self.require_coprocessor(0)?;
                let target = self.cop0.return_from_exception();
                self.jump_immediately(target);
                false
            }
            _ => return Err(Fault::IllegalInstruction),
        };

        if trap {
            return Err(Fault::Trap);
        }

        Ok(CYCLES_DEFAULT)
    }

    fn require_coprocessor(&self, cop: u8) -> Result<(), Fault> {
        if self.cop0.coprocessor_usable(cop) {
            Ok(())
        } else {
            Err(Fault::CoprocessorUnusable(cop))
        }
    }

    fn coprocessor(&mut self, i: Instruction) -> Execution {
        use Opcode::*;

        match i.opcode {
            Mfc0 | Dmfc0 | Mtc0 | Dmtc0 => self.require_coprocessor(0)?,
            Cop1 | Lwc1 | Ldc1 | Swc1 | Sdc1 => {
                self.require_coprocessor(1)?;
                tracing::debug!("FPU instruction {} ignored", i.opcode.mnemonic());
                return Ok(CYCLES_DEFAULT);
            }
            Cop2 | Lwc2 | Ldc2 | Swc2 | Sdc2 => {
                self.require_coprocessor(2)?;
                tracing::debug!("COP2 instruction {} ignored", i.opcode.mnemonic());
                return Ok(CYCLES_DEFAULT);
            }
            _ => return Err(Fault::IllegalInstruction),
        }

        let rt = self.reg(i.rt);
        match i.opcode {
            Mfc0 => {
                let value = self.read_cop0(i.rd) as u32;
                self.registers.set_register_word(i.rt, value);
            }
            Dmfc0 => {
                let value = self.read_cop0(i.rd);
                self.registers.set_register_at(i.rt, value);
            }
            Mtc0 => self.write_cop0(i.rd, sign_extend_word(rt as u32)),
            _ => self.write_cop0(i.rd, rt),
        }

        Ok(CYCLES_DEFAULT)
    }

    /// Count/Compare live in the timer device; Cause reflects the current lines.
    fn read_cop0(&mut self, reg: usize) -> u64 {
        match reg {
            COP0_COUNT => u64::from(self.bus.devices.handle_read(DeviceId::Timer, TIMER_COUNT)),
            COP0_COMPARE => {
                u64::from(self.bus.devices.handle_read(DeviceId::Timer, TIMER_COMPARE))
            }
            COP0_CAUSE => {
                self.cop0
                    .set_interrupt_lines(self.bus.devices.interrupt_lines());
                self.cop0.read(reg)
            }
            _ => self.cop0.read(reg),
        }
    }

    fn write_cop0(&mut self, reg: usize, value: u64) {
        match reg {
            COP0_COUNT => {
                self.bus
                    .devices
                    .handle_write(DeviceId::Timer, TIMER_COUNT, value as u32);
            }
            COP0_COMPARE => {
                self.bus
                    .devices
                    .handle_write(DeviceId::Timer, TIMER_COMPARE, value as u32);
            }
            _ => self.cop0.write(reg, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{Rng, SeedableRng};

    use crate::cpu::cop0::{COP0_EPC, EXCEPTION_VECTOR};
    use crate::cpu::r4300::tests::{PROGRAM_BASE, cpu_with_program};

    const ZERO: u32 = 0;
    const A0: u32 = 4;
    const T0: u32 = 8;
    const T1: u32 = 9;
    const T2: u32 = 10;
    const T3: u32 = 11;
    const RA: usize = 31;

    const fn i_type(op: u32, rs: u32, rt: u32, imm: u16) -> u32 {
        (op << 26) | (rs << 21) | (rt << 16) | imm as u32
    }

    const fn r_type(rs: u32, rt: u32, rd: u32, sa: u32, function: u32) -> u32 {
        (rs << 21) | (rt << 16) | (rd << 11) | (sa << 6) | function
    }

    const fn addiu(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x09, rs, rt, imm as u16)
    }

    const NOP: u32 = 0;
    /// lui a0, 0x8000: base of kseg0.
    const LUI_A0_KSEG0: u32 = i_type(0x0F, ZERO, A0, 0x8000);

    fn run(cpu: &mut R4300, steps: usize) {
        for _ in 0..steps {
            cpu.step();
        }
    }

    #[test]
    fn addiu_sign_extends() {
        let mut cpu = cpu_with_program(&[addiu(T0, ZERO, -1), addiu(T1, ZERO, 0x7FFF)]);
        run(&mut cpu, 2);

        assert_eq!(cpu.registers.register_at(8), u64::MAX);
        assert_eq!(cpu.registers.register_at(9), 0x7FFF);
    }

    #[test]
    fn writes_to_register_zero_are_discarded() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let program: Vec<u32> = (0..64)
            .map(|_| {
                let op = [0x09, 0x0D, 0x0E, 0x0F, 0x19][rng.gen_range(0..5)];
                i_type(op, rng.gen_range(0..32), ZERO, rng.gen_range(0..=u16::MAX))
            })
            .collect();
        let mut cpu = cpu_with_program(&program);

        for _ in 0..program.len() {
            cpu.step();
            assert_eq!(cpu.registers.register_at(0), 0);
        }
    }

    #[test]
    fn branch_delay_slot_runs_once_before_target() {
        let mut cpu = cpu_with_program(&[
            addiu(T0, ZERO, 1),
            i_type(0x04, ZERO, ZERO, 2), // beq zero, zero, +8
            addiu(T1, T1, 2),            // delay slot
            addiu(T2, ZERO, 3),          // skipped
            addiu(T3, ZERO, 4),          // target
        ]);
        run(&mut cpu, 4);

        assert_eq!(cpu.registers.register_at(9), 2);
        assert_eq!(cpu.registers.register_at(10), 0);
        assert_eq!(cpu.registers.register_at(11), 4);
        assert_eq!(cpu.pc, PROGRAM_BASE + 20);
    }

    #[test]
    fn not_taken_branch_still_runs_delay_slot() {
        let mut cpu = cpu_with_program(&[
            i_type(0x05, ZERO, ZERO, 2), // bne zero, zero, +8
            addiu(T1, ZERO, 2),
            addiu(T2, ZERO, 3),
        ]);
        run(&mut cpu, 3);

        assert_eq!(cpu.registers.register_at(9), 2);
        assert_eq!(cpu.registers.register_at(10), 3);
    }

    #[test]
    fn branch_likely_not_taken_nullifies_delay_slot() {
        let mut cpu = cpu_with_program(&[
            i_type(0x15, ZERO, ZERO, 2), // bnel zero, zero, +8
            addiu(T1, ZERO, 2),
            addiu(T2, ZERO, 3),
        ]);
        run(&mut cpu, 2);

        assert_eq!(cpu.registers.register_at(9), 0);
        assert_eq!(cpu.registers.register_at(10), 3);
    }

    #[test]
    fn branch_and_link_links_even_when_not_taken() {
        let mut cpu = cpu_with_program(&[
            addiu(T0, ZERO, -1),
            i_type(0x01, T0, 0x11, 4), // bgezal t0, +16
            NOP,
        ]);
        run(&mut cpu, 3);

        assert_eq!(cpu.registers.register_at(RA), PROGRAM_BASE + 12);
        assert_eq!(cpu.pc, PROGRAM_BASE + 12);
    }

    #[test]
    fn jal_and_jr() {
        let target = ((PROGRAM_BASE + 16) & 0x0FFF_FFFF) as u32 >> 2;
        let mut cpu = cpu_with_program(&[
            (0x03 << 26) | target, // jal base + 16
            NOP,
            addiu(T0, ZERO, 1),
            NOP,
            r_type(31, 0, 0, 0, 0x08), // jr ra
            NOP,
        ]);
        run(&mut cpu, 2);
        assert_eq!(cpu.pc, PROGRAM_BASE + 16);
        assert_eq!(cpu.registers.register_at(RA), PROGRAM_BASE + 8);

        run(&mut cpu, 3);
        assert_eq!(cpu.registers.register_at(8), 1);
        assert_eq!(cpu.pc, PROGRAM_BASE + 12);
    }

    #[test]
    fn jump_runs_delay_slot_once() {
        let target = ((PROGRAM_BASE + 16) & 0x0FFF_FFFF) as u32 >> 2;
        let mut cpu = cpu_with_program(&[
            (0x02 << 26) | target, // j base + 16
            addiu(T1, ZERO, 2),    // delay slot
            addiu(T2, ZERO, 3),    // skipped
            NOP,
            addiu(T3, ZERO, 4), // target
        ]);
        run(&mut cpu, 3);

        assert_eq!(cpu.registers.register_at(9), 2);
        assert_eq!(cpu.registers.register_at(10), 0);
        assert_eq!(cpu.registers.register_at(11), 4);
        assert_eq!(cpu.pc, PROGRAM_BASE + 20);
    }

    #[test]
    fn jalr_links_into_rd_and_runs_delay_slot() {
        let mut cpu = cpu_with_program(&[
            i_type(0x0F, ZERO, T1, 0x8000), // lui t1, 0x8000
            i_type(0x0D, T1, T1, 0x1014),   // ori t1, t1, 0x1014 (base + 20)
            r_type(T1, 0, T0, 0, 0x09),     // jalr t0, t1
            addiu(T2, ZERO, 3),             // delay slot
            addiu(T3, ZERO, 4),             // skipped
            addiu(T3, T3, 5),               // target
        ]);
        run(&mut cpu, 5);

        assert_eq!(cpu.registers.register_at(8), PROGRAM_BASE + 16);
        assert_eq!(cpu.registers.register_at(10), 3);
        assert_eq!(cpu.registers.register_at(11), 5);
        assert_eq!(cpu.registers.register_at(RA), 0);
        assert_eq!(cpu.pc, PROGRAM_BASE + 24);
    }

    #[test]
    fn blez_taken_and_bgtz_not_taken_on_negative() {
        let mut cpu = cpu_with_program(&[
            addiu(T0, ZERO, -1),
            i_type(0x06, T0, ZERO, 2), // blez t0, +8
            addiu(T1, ZERO, 2),        // delay slot
            addiu(T2, ZERO, 3),        // skipped
            i_type(0x07, T0, ZERO, 2), // bgtz t0, +8
            addiu(T3, ZERO, 4),        // delay slot, not taken
            addiu(T2, T2, 6),
        ]);
        run(&mut cpu, 6);

        assert_eq!(cpu.registers.register_at(9), 2);
        assert_eq!(cpu.registers.register_at(10), 6);
        assert_eq!(cpu.registers.register_at(11), 4);
        assert_eq!(cpu.pc, PROGRAM_BASE + 28);
    }

    #[test]
    fn bgtz_taken_and_blez_not_taken_on_positive() {
        let mut cpu = cpu_with_program(&[
            addiu(T0, ZERO, 1),
            i_type(0x06, T0, ZERO, 2), // blez t0, +8
            addiu(T1, ZERO, 2),        // delay slot, not taken
            i_type(0x07, T0, ZERO, 2), // bgtz t0, +8
            addiu(T2, ZERO, 3),        // delay slot
            addiu(T3, ZERO, 4),        // skipped
            addiu(T3, T3, 5),          // target
        ]);
        run(&mut cpu, 6);

        assert_eq!(cpu.registers.register_at(9), 2);
        assert_eq!(cpu.registers.register_at(10), 3);
        assert_eq!(cpu.registers.register_at(11), 5);
        assert_eq!(cpu.pc, PROGRAM_BASE + 28);
    }

    #[test]
    fn add_overflow_traps_without_commit() {
        let mut cpu = cpu_with_program(&[
            i_type(0x0F, ZERO, T0, 0x7FFF), // lui t0, 0x7FFF
            i_type(0x0D, T0, T0, 0xFFFF),   // ori t0, t0, 0xFFFF
            i_type(0x08, T0, T1, 1),        // addi t1, t0, 1
        ]);
        run(&mut cpu, 2);

        let result = cpu.step();

        assert_eq!(result.fault, Some(Fault::ArithmeticOverflow));
        assert!(result.faulted());
        assert_eq!(cpu.registers.register_at(9), 0);
        assert_eq!(cpu.pc, EXCEPTION_VECTOR);
        assert_eq!(cpu.cop0.read(COP0_EPC), PROGRAM_BASE + 8);
        assert_eq!((cpu.cop0.cause() >> 2) & 0x1F, 12);
    }

    #[test]
    fn addu_wraps_without_trap() {
        let mut cpu = cpu_with_program(&[
            i_type(0x0F, ZERO, T0, 0x7FFF),
            i_type(0x0D, T0, T0, 0xFFFF),
            r_type(T0, T0, T1, 0, 0x21), // addu t1, t0, t0
        ]);
        run(&mut cpu, 3);

        assert_eq!(cpu.registers.register_at(9), 0xFFFF_FFFF_FFFF_FFFE);
        assert_eq!(cpu.pc, PROGRAM_BASE + 12);
    }

    #[test]
    fn fault_in_delay_slot_reports_branch() {
        let mut cpu = cpu_with_program(&[
            i_type(0x0F, ZERO, T0, 0x7FFF),
            i_type(0x0D, T0, T0, 0xFFFF),
            i_type(0x04, ZERO, ZERO, 4), // beq zero, zero
            i_type(0x08, T0, T1, 1),     // addi overflows in the delay slot
        ]);
        run(&mut cpu, 3);
        let result = cpu.step();

        assert_eq!(result.fault, Some(Fault::ArithmeticOverflow));
        assert_eq!(cpu.cop0.read(COP0_EPC), PROGRAM_BASE + 8);
        assert_eq!(cpu.cop0.cause() >> 31, 1);
    }

    #[test]
    fn signed_and_unsigned_byte_loads() {
        let mut cpu = cpu_with_program(&[
            addiu(T0, ZERO, -1),
            LUI_A0_KSEG0,
            i_type(0x28, A0, T0, 0x100), // sb t0, 0x100(a0)
            i_type(0x20, A0, T1, 0x100), // lb t1
            i_type(0x24, A0, T2, 0x100), // lbu t2
            i_type(0x21, A0, T3, 0x100), // lh t3
        ]);
        run(&mut cpu, 6);

        assert_eq!(cpu.registers.register_at(9), u64::MAX);
        assert_eq!(cpu.registers.register_at(10), 0xFF);
        assert_eq!(cpu.registers.register_at(11), 0xFFFF_FFFF_FFFF_FF00);
    }

    #[test]
    fn unaligned_word_load_pair() {
        let mut cpu = cpu_with_program(&[
            LUI_A0_KSEG0,
            i_type(0x22, A0, T0, 0x201), // lwl t0, 0x201(a0)
            i_type(0x26, A0, T0, 0x204), // lwr t0, 0x204(a0)
        ]);
        cpu.bus
            .write(0x200, AccessWidth::DoubleWord, 0x1122_3344_5566_7788);
        run(&mut cpu, 3);

        assert_eq!(cpu.registers.register_at(8), 0x2233_4455);
    }

    #[test]
    fn unaligned_word_store_pair() {
        let mut cpu = cpu_with_program(&[
            LUI_A0_KSEG0,
            i_type(0x0F, ZERO, T0, 0xAABB),
            i_type(0x0D, T0, T0, 0xCCDD),
            i_type(0x2A, A0, T0, 0x301), // swl t0, 0x301(a0)
            i_type(0x2E, A0, T0, 0x304), // swr t0, 0x304(a0)
        ]);
        run(&mut cpu, 5);

        assert_eq!(cpu.bus.read_word(0x300), 0x00AA_BBCC);
        assert_eq!(cpu.bus.read_word(0x304), 0xDD00_0000);
    }

    #[test]
    fn unaligned_doubleword_load_pair() {
        let mut cpu = cpu_with_program(&[
            LUI_A0_KSEG0,
            i_type(0x1A, A0, T0, 0x203), // ldl t0, 0x203(a0)
            i_type(0x1B, A0, T0, 0x20A), // ldr t0, 0x20A(a0)
        ]);
        cpu.bus
            .write(0x200, AccessWidth::DoubleWord, 0x0001_0203_0405_0607);
        cpu.bus
            .write(0x208, AccessWidth::DoubleWord, 0x0809_0A0B_0C0D_0E0F);
        run(&mut cpu, 3);

        assert_eq!(cpu.registers.register_at(8), 0x0304_0506_0708_090A);
    }

    #[test]
    fn load_linked_store_conditional() {
        let mut cpu = cpu_with_program(&[
            LUI_A0_KSEG0,
            addiu(T1, ZERO, 7),
            i_type(0x38, A0, T1, 0x400), // sc t1 without a link fails
            addiu(T1, ZERO, 7),
            i_type(0x30, A0, T0, 0x400), // ll t0
            i_type(0x38, A0, T1, 0x400), // sc t1
        ]);
        run(&mut cpu, 3);
        assert_eq!(cpu.registers.register_at(9), 0);
        assert_eq!(cpu.bus.read_word(0x400), 0);

        run(&mut cpu, 3);
        assert_eq!(cpu.registers.register_at(9), 1);
        assert_eq!(cpu.bus.read_word(0x400), 7);
    }

    #[test]
    fn divide_by_zero_results() {
        let mut cpu = cpu_with_program(&[
            addiu(T0, ZERO, -5),
            r_type(T0, ZERO, 0, 0, 0x1A), // div t0, zero
            r_type(0, 0, T1, 0, 0x12),    // mflo t1
            r_type(0, 0, T2, 0, 0x10),    // mfhi t2
            r_type(T0, ZERO, 0, 0, 0x1B), // divu t0, zero
            r_type(0, 0, T3, 0, 0x12),    // mflo t3
        ]);
        cpu.step();
        assert_eq!(cpu.step().cycles_consumed, 37);
        run(&mut cpu, 4);

        assert_eq!(cpu.registers.register_at(9), 1);
        assert_eq!(cpu.registers.register_at(10), (-5_i64) as u64);
        assert_eq!(cpu.registers.register_at(11), u64::MAX);
        assert_eq!(cpu.registers.hi, (-5_i64) as u64);
    }

    #[test]
    fn multiply_results_and_cycles() {
        let mut cpu = cpu_with_program(&[
            addiu(T0, ZERO, -2),
            addiu(T1, ZERO, 3),
            r_type(T0, T1, 0, 0, 0x18), // mult t0, t1
            addiu(T0, ZERO, -1),
            r_type(T0, T1, 0, 0, 0x1D), // dmultu t0, t1
        ]);
        run(&mut cpu, 2);

        assert_eq!(cpu.step().cycles_consumed, 5);
        assert_eq!(cpu.registers.lo, (-6_i64) as u64);
        assert_eq!(cpu.registers.hi, u64::MAX);

        cpu.step();
        assert_eq!(cpu.step().cycles_consumed, 8);
        assert_eq!(cpu.registers.lo, 0xFFFF_FFFF_FFFF_FFFD);
        assert_eq!(cpu.registers.hi, 2);
    }

    #[test]
    fn shifts_sign_extend_word_results() {
        let mut cpu = cpu_with_program(&[
            addiu(T0, ZERO, 1),
            r_type(0, T0, T1, 31, 0x00), // sll t1, t0, 31
            r_type(0, T1, T2, 4, 0x03),  // sra t2, t1, 4
            r_type(0, T1, T3, 4, 0x02),  // srl t3, t1, 4
            r_type(0, T0, T0, 4, 0x3C),  // dsll32 t0, t0, 4
        ]);
        run(&mut cpu, 5);

        assert_eq!(cpu.registers.register_at(9), 0xFFFF_FFFF_8000_0000);
        assert_eq!(cpu.registers.register_at(10), 0xFFFF_FFFF_F800_0000);
        assert_eq!(cpu.registers.register_at(11), 0x0800_0000);
        assert_eq!(cpu.registers.register_at(8), 1 << 36);
    }

    #[test]
    fn syscall_then_eret() {
        let mut cpu = cpu_with_program(&[r_type(0, 0, 0, 0, 0x0C)]);
        // Handler at the general exception vector.
        cpu.bus.write_word(0x180, 0x4200_0018);

        let result = cpu.step();
        assert_eq!(result.fault, Some(Fault::Syscall));
        assert_eq!(cpu.pc, EXCEPTION_VECTOR);
        assert!(cpu.cop0.exl());

        cpu.step();
        assert_eq!(cpu.pc, PROGRAM_BASE);
        assert!(!cpu.cop0.exl());
    }

    #[test]
    fn trap_instruction() {
        let mut cpu = cpu_with_program(&[
            r_type(0, 0, 0, 0, 0x36), // tne zero, zero
            r_type(0, 0, 0, 0, 0x34), // teq zero, zero
        ]);
        assert_eq!(cpu.step().fault, None);
        assert_eq!(cpu.step().fault, Some(Fault::Trap));
    }

    #[test]
    fn count_and_compare_route_to_timer() {
        let mut cpu = cpu_with_program(&[
            addiu(T0, ZERO, 100),
            0x4088_5800, // mtc0 t0, $11
            0x4009_5800, // mfc0 t1, $11
        ]);
        run(&mut cpu, 3);

        assert_eq!(cpu.bus.devices.timer.compare, 100);
        assert_eq!(cpu.registers.register_at(9), 100);
    }

    #[test]
    fn fpu_instruction_without_cu1_is_unusable() {
        let mut cpu = cpu_with_program(&[
            0x4080_6000, // mtc0 zero, $12
            0x4400_0000, // cop1
        ]);
        cpu.step();

        let result = cpu.step();

        assert_eq!(result.fault, Some(Fault::CoprocessorUnusable(1)));
        assert_eq!((cpu.cop0.cause() >> 28) & 3, 1);
        assert_eq!((cpu.cop0.cause() >> 2) & 0x1F, 11);
    }
}
