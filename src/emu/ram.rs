use crate::plat::RAM_SIZE;

use super::{EResult, EmuError};

/// The LS-8's 256 bytes of memory. Program and stack share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ram {
    pub memory: [u8; RAM_SIZE],
}

impl Ram {
    /// Creates a new [`Ram`] instance with every cell zeroed.
    pub fn new() -> Self {
        Self {
            memory: [0u8; RAM_SIZE],
        }
    }

    /// Copies a program image into memory, starting at address 0.
    ///
    /// # Errors
    ///
    /// This function will return an error if the program doesn't fit in memory. Memory is left untouched in that case.
    pub fn load(&mut self, program: &[u8]) -> EResult<()> {
        if program.len() > RAM_SIZE {
            return Err(EmuError::ProgramTooLarge {
                len: program.len(),
                capacity: RAM_SIZE,
            });
        }
        self.memory[..program.len()].copy_from_slice(program);
        Ok(())
    }

    pub fn read(&self, addr: u8) -> u8 {
        self.memory[addr as usize]
    }

    pub fn write(&mut self, addr: u8, value: u8) {
        self.memory[addr as usize] = value;
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}
