use std::cmp::Ordering;

use crate::plat::{Register, SP_INIT};

bitflags::bitflags! {
    /// The CPU status flags register.
    ///
    /// Only [CMP][crate::plat::Opcode::Cmp] writes it, and it always leaves exactly one bit set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Fl: u8 {
        /// Set if the last comparison found `regA == regB`.
        const EQUAL = 1 << 0;
        /// Set if the last comparison found `regA > regB`.
        const GREATER = 1 << 1;
        /// Set if the last comparison found `regA < regB`.
        const LESS = 1 << 2;
    }
}

impl Fl {
    pub fn from_ordering(ord: Ordering) -> Self {
        match ord {
            Ordering::Equal => Self::EQUAL,
            Ordering::Greater => Self::GREATER,
            Ordering::Less => Self::LESS,
        }
    }
}

/// The full set of registers in the emulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmuRegisters {
    gp: [u8; 8],
    pub pc: u8,
    pub fl: Fl,
}

impl EmuRegisters {
    pub fn get(&self, reg: Register) -> u8 {
        self.gp[reg as usize]
    }

    pub fn set(&mut self, reg: Register, value: u8) {
        self.gp[reg as usize] = value;
    }

    pub fn sp(&self) -> u8 {
        self.get(Register::SP)
    }

    pub fn set_sp(&mut self, value: u8) {
        self.set(Register::SP, value);
    }

    /// All eight general purpose registers, `R0` first.
    pub fn gp(&self) -> &[u8; 8] {
        &self.gp
    }
}

impl Default for EmuRegisters {
    fn default() -> Self {
        let mut gp = [0u8; 8];
        gp[Register::SP as usize] = SP_INIT;
        Self {
            gp,
            pc: 0,
            fl: Fl::empty(),
        }
    }
}
