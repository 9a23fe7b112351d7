//! The emulator/debugger module for the LS-8.

use std::{io, sync::Arc};

use thiserror::Error;

use self::alu::AluError;

pub mod alu;
pub mod clock;
pub mod debugger;
pub mod emulator;
pub mod ram;
pub mod registers;

/// A fault raised while loading or running a program. Any fault ends the current run.
#[derive(Debug, Clone, Error)]
pub enum EmuError {
    #[error("program is {len} bytes but memory only holds {capacity}")]
    ProgramTooLarge { len: usize, capacity: usize },
    #[error("arithmetic fault at pc {pc:#04x}: {source}")]
    Arithmetic {
        pc: u8,
        #[source]
        source: AluError,
    },
    #[error("stack overflow at pc {pc:#04x}: push with sp={sp:#04x}")]
    StackOverflow { pc: u8, sp: u8 },
    #[error("stack underflow at pc {pc:#04x}: pop with sp={sp:#04x}")]
    StackUnderflow { pc: u8, sp: u8 },
    #[error("pc ran past the end of memory: instruction at {pc:#04x} is {width} bytes wide")]
    PcOutOfBounds { pc: u8, width: u8 },
    #[error("invalid register {reg} at pc {pc:#04x}")]
    InvalidRegister { reg: u8, pc: u8 },
    #[error("unimplemented instruction {opcode:#010b} at pc {pc:#04x} (interrupts are not supported)")]
    Unimplemented { opcode: u8, pc: u8 },
    #[error("step limit of {0} instructions exceeded")]
    StepLimitExceeded(u64),
    #[error("invalid clock rate {0} Hz")]
    InvalidClockRate(f64),
    #[error("failed to start the clock runtime")]
    ClockInit(#[source] Arc<io::Error>),
    #[error("failed to write program output")]
    Output(#[source] Arc<io::Error>),
}

impl EmuError {
    pub(crate) fn output(err: io::Error) -> Self {
        Self::Output(Arc::new(err))
    }
}

/// Type alias for Result<T, [EmuError]>.
pub type EResult<T> = Result<T, EmuError>;
