use serde::{Deserialize, Serialize};

/// `Cause.ExcCode` values raised by the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionCode {
    Interrupt = 0,
    AddressErrorLoad = 4,
    AddressErrorStore = 5,
    Syscall = 8,
    Breakpoint = 9,
    ReservedInstruction = 10,
    CoprocessorUnusable = 11,
    Overflow = 12,
    Trap = 13,
}

/// Architectural fault raised by one instruction.
///
/// Faults never leave the core: `step` turns them into a jump to the
/// exception vector and reports them in the `StepResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fault {
    /// Misaligned instruction fetch.
    AlignmentFault { address: u64 },
    IllegalInstruction,
    ArithmeticOverflow,
    CoprocessorUnusable(u8),
    Syscall,
    Breakpoint,
    Trap,
}

impl Fault {
    #[must_use]
    pub const fn code(self) -> ExceptionCode {
        match self {
            Self::AlignmentFault { .. } => ExceptionCode::AddressErrorLoad,
            Self::IllegalInstruction => ExceptionCode::ReservedInstruction,
            Self::ArithmeticOverflow => ExceptionCode::Overflow,
            Self::CoprocessorUnusable(_) => ExceptionCode::CoprocessorUnusable,
            Self::Syscall => ExceptionCode::Syscall,
            Self::Breakpoint => ExceptionCode::Breakpoint,
            Self::Trap => ExceptionCode::Trap,
        }
    }

    /// Value latched into `BadVAddr`, for address errors.
    #[must_use]
    pub const fn bad_address(self) -> Option<u64> {
        match self {
            Self::AlignmentFault { address } => Some(address),
            _ => None,
        }
    }

    /// Coprocessor number reported in `Cause.CE`.
    #[must_use]
    pub const fn coprocessor(self) -> u8 {
        match self {
            Self::CoprocessorUnusable(cop) => cop,
            _ => 0,
        }
    }
}
