//! # VR4300 interpreter core
//!
//! One [`R4300::step`] executes exactly one instruction. Branch delay slots
//! are modeled with a `pc`/`next_pc` pair:
//!
//! ```text
//!           before step           after a taken branch at 0x100
//!   pc      0x100 (branch)        0x104 (delay slot, runs next)
//!   next_pc 0x104                 target
//! ```
//!
//! Faults raised by an instruction never escape: they are turned into an
//! exception (EPC, Cause, Status.EXL) and a jump to the exception vector,
//! and reported through [`StepResult`].

use serde::{Deserialize, Serialize};

use crate::bus::{Bus, BusError};
use crate::config::EmuConfig;

use super::cop0::{Cop0, COP0_CAUSE};
use super::exception::{ExceptionCode, Fault};
use super::mips::instructions::Instruction;
use super::registers::RegisterFile;

/// Entry point of the boot code once the PIF has copied it to SP DMEM.
pub const RESET_VECTOR: u64 = 0xFFFF_FFFF_A400_0040;

pub const SIZE_OF_INSTRUCTION: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    Idle,
    Running,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    pub cycles_consumed: u64,
    pub fault: Option<Fault>,
}

impl StepResult {
    #[must_use]
    pub const fn faulted(&self) -> bool {
        self.fault.is_some()
    }
}

/// Maps a virtual address to the physical bus address.
///
/// Only the unmapped kernel segments are meaningful without a TLB; every
/// segment is folded onto the low 512 MiB the same way.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn translate(address: u64) -> u32 {
    (address as u32) & 0x1FFF_FFFF
}

#[derive(Debug)]
pub struct R4300 {
    pub registers: RegisterFile,
    pub cop0: Cop0,
    pub pc: u64,
    pub next_pc: u64,
    pub bus: Bus,
    state: CpuState,
    /// Cycles executed since reset.
    pub cycles: u64,
    /// The instruction at `pc` sits in a branch delay slot.
    pub(crate) pc_in_delay_slot: bool,
}

impl R4300 {
    /// # Errors
    ///
    /// Propagates a [`BusError`] from building the memory map.
    pub fn new(config: &EmuConfig) -> Result<Self, BusError> {
        let mut cpu = Self {
            registers: RegisterFile::default(),
            cop0: Cop0::default(),
            pc: 0,
            next_pc: 0,
            bus: Bus::new(config)?,
            state: CpuState::Idle,
            cycles: 0,
            pc_in_delay_slot: false,
        };
        cpu.reset();

        Ok(cpu)
    }

    #[must_use]
    pub const fn state(&self) -> CpuState {
        self.state
    }

    /// Idle → Running. A halted core only runs again after a reset.
    pub fn start(&mut self) {
        match self.state {
            CpuState::Idle => self.state = CpuState::Running,
            CpuState::Running => {}
            CpuState::Halted => tracing::debug!("start ignored, the core is halted until reset"),
        }
    }

    /// Running → Halted.
    pub fn stop(&mut self) {
        if self.state == CpuState::Running {
            self.state = CpuState::Halted;
        }
    }

    /// Reinitializes the register file and the cycle counter.
    ///
    /// A halted core becomes runnable again; an idle one stays idle until started.
    pub fn reset(&mut self) {
        self.registers = RegisterFile::default();
        self.cop0.reset();
        self.pc = RESET_VECTOR;
        self.next_pc = RESET_VECTOR + SIZE_OF_INSTRUCTION;
        self.pc_in_delay_slot = false;
        self.cycles = 0;

        if self.state == CpuState::Halted {
            self.state = CpuState::Running;
        }
    }

    /// Restores the run state from a snapshot.
    pub(crate) const fn set_state(&mut self, state: CpuState) {
        self.state = state;
    }

    /// Fetches, decodes and executes the instruction at `pc`.
    pub fn step(&mut self) -> StepResult {
        if self.state != CpuState::Running {
            return StepResult {
                cycles_consumed: 0,
                fault: None,
            };
        }

        let pc = self.pc;
        let in_delay_slot = self.pc_in_delay_slot;

        let outcome = if pc % SIZE_OF_INSTRUCTION == 0 {
            let word = self.bus.read_word(translate(pc));
            let instruction = Instruction::from(word);

            #[cfg(feature = "disassembler")]
            tracing::trace!("{pc:016X}: {word:08X}  {instruction}");

            self.pc = self.next_pc;
            self.next_pc = self.next_pc.wrapping_add(SIZE_OF_INSTRUCTION);
            self.pc_in_delay_slot = false;

            self.execute(instruction)
        } else {
            Err(Fault::AlignmentFault { address: pc })
        };

        let (cycles_consumed, fault) = match outcome {
            Ok(cycles) => (cycles, None),
            Err(fault) => {
                self.raise_exception(fault, pc, in_delay_slot);
                (1, Some(fault))
            }
        };

        self.cycles += cycles_consumed;

        StepResult {
            cycles_consumed,
            fault,
        }
    }

    /// Sets up the delay slot of a taken branch or jump.
    pub(crate) const fn branch_to(&mut self, target: u64) {
        self.next_pc = target;
        self.pc_in_delay_slot = true;
    }

    /// A not-taken branch: the delay slot still runs.
    pub(crate) const fn branch_not_taken(&mut self) {
        self.pc_in_delay_slot = true;
    }

    /// A not-taken branch-likely: the delay slot is nullified.
    pub(crate) const fn skip_delay_slot(&mut self) {
        self.pc = self.next_pc;
        self.next_pc = self.next_pc.wrapping_add(SIZE_OF_INSTRUCTION);
    }

    /// Redirects execution without a delay slot (exception entry, ERET).
    pub(crate) const fn jump_immediately(&mut self, target: u64) {
        self.pc = target;
        self.next_pc = target.wrapping_add(SIZE_OF_INSTRUCTION);
        self.pc_in_delay_slot = false;
    }

    fn raise_exception(&mut self, fault: Fault, pc: u64, in_delay_slot: bool) {
        tracing::debug!("{fault:?} at 0x{pc:016X}");

        let vector = self.cop0.enter_exception(
            fault.code(),
            pc,
            in_delay_slot,
            fault.bad_address(),
            fault.coprocessor(),
        );
        self.jump_immediately(vector);
    }

    /// Copies the device interrupt lines into `Cause` and takes the
    /// interrupt exception if it is enabled. Returns whether it was taken.
    pub fn check_interrupts(&mut self) -> bool {
        self.cop0.set_interrupt_lines(self.bus.devices.interrupt_lines());

        if self.state != CpuState::Running || !self.cop0.interrupt_pending() {
            return false;
        }

        tracing::trace!(
            "interrupt taken, Cause = 0x{:08X}",
            self.cop0.read(COP0_CAUSE)
        );

        let vector = self.cop0.enter_exception(
            ExceptionCode::Interrupt,
            self.pc,
            self.pc_in_delay_slot,
            None,
            0,
        );
        self.jump_immediately(vector);

        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::cpu::cop0::{COP0_EPC, COP0_STATUS, EXCEPTION_VECTOR};

    /// Start of RDRAM seen through kseg0.
    pub const PROGRAM_BASE: u64 = 0xFFFF_FFFF_8000_1000;

    /// 1 MiB of RDRAM and 100 cycles per line.
    pub fn small_config() -> EmuConfig {
        EmuConfig {
            cpu_clock_hz: 262 * 100 * 60,
            rdram_size: 0x10_0000,
            rom_window_size: 0x10_0000,
            ..EmuConfig::default()
        }
    }

    /// A running core with `program` at `PROGRAM_BASE`.
    pub fn cpu_with_program(program: &[u32]) -> R4300 {
        let mut cpu = R4300::new(&small_config()).unwrap();
        for (i, &word) in (0..).zip(program) {
            cpu.bus.write_word(translate(PROGRAM_BASE) + i * 4, word);
        }
        cpu.jump_immediately(PROGRAM_BASE);
        cpu.start();
        cpu
    }

    #[test]
    fn state_machine() {
        let mut cpu = R4300::new(&small_config()).unwrap();
        assert_eq!(cpu.state(), CpuState::Idle);
        assert_eq!(cpu.step().cycles_consumed, 0);

        cpu.start();
        assert_eq!(cpu.state(), CpuState::Running);

        cpu.stop();
        assert_eq!(cpu.state(), CpuState::Halted);
        assert_eq!(cpu.step().cycles_consumed, 0);

        cpu.start();
        assert_eq!(cpu.state(), CpuState::Halted);

        cpu.reset();
        assert_eq!(cpu.state(), CpuState::Running);
        assert_eq!(cpu.pc, RESET_VECTOR);
        assert_eq!(cpu.cycles, 0);
    }

    #[test]
    fn reset_keeps_idle_core_idle() {
        let mut cpu = R4300::new(&small_config()).unwrap();
        cpu.reset();

        assert_eq!(cpu.state(), CpuState::Idle);
    }

    #[test]
    fn misaligned_fetch_raises_address_error() {
        let mut cpu = cpu_with_program(&[]);
        cpu.jump_immediately(PROGRAM_BASE + 2);

        let result = cpu.step();

        assert_eq!(
            result.fault,
            Some(Fault::AlignmentFault {
                address: PROGRAM_BASE + 2
            })
        );
        assert_eq!(cpu.pc, EXCEPTION_VECTOR);
        assert_eq!(cpu.cop0.read(COP0_EPC), PROGRAM_BASE + 2);
        assert_eq!(cpu.cop0.read(8), PROGRAM_BASE + 2);
    }

    #[test]
    fn reserved_instruction_is_recoverable() {
        // A reserved word followed by a nop.
        let mut cpu = cpu_with_program(&[0x0000_0001, 0x0000_0000]);

        let result = cpu.step();

        assert_eq!(result.fault, Some(Fault::IllegalInstruction));
        assert_eq!(cpu.pc, EXCEPTION_VECTOR);
        assert_eq!(cpu.state(), CpuState::Running);
        assert_eq!((cpu.cop0.cause() >> 2) & 0x1F, 10);
    }

    #[test]
    fn interrupt_is_taken_when_enabled() {
        let mut cpu = cpu_with_program(&[0; 4]);
        // Raise VI and unmask it in MI, then enable IP2 and IE.
        cpu.bus
            .devices
            .mi
            .raise(crate::cpu::hardware::interrupt_control::MiInterrupt::Vi);
        cpu.bus.devices.mi.interrupt_mask = 1 << 3;

        assert!(!cpu.check_interrupts());
        assert_eq!(cpu.cop0.cause() & (1 << 10), 1 << 10);

        cpu.cop0.write(COP0_STATUS, cpu.cop0.status() | (1 << 10) | 1);
        assert!(cpu.check_interrupts());
        assert_eq!(cpu.pc, EXCEPTION_VECTOR);
        assert_eq!(cpu.cop0.read(COP0_EPC), PROGRAM_BASE);

        // EXL now masks further interrupts.
        assert!(!cpu.check_interrupts());
    }
}
