//! Common platform code between the LS-8's other modules.

use std::{fmt, num::ParseIntError};

use thiserror::Error;

/// Size of the LS-8's address space, in bytes.
pub const RAM_SIZE: usize = 256;

/// The value [SP][Register::SP] holds when the machine powers on.
/// The stack grows downwards from just below this address.
pub const SP_INIT: u8 = 0xF4;

/// An error for the core platform of the LS-8.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    #[error("invalid opcode {0:#010b}")]
    InvalidOpcode(u8),
    #[error("invalid register {0}")]
    InvalidRegister(u8),
    #[error("invalid instruction")]
    InvalidInstruction,
}

/// Type alias for Result<T, [PlatformError]>.
pub type PResult<T> = Result<T, PlatformError>;

/// The eight general purpose registers of the LS-8.
///
/// By convention, `R7` holds the stack pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl Register {
    /// Stack pointer
    pub const SP: Self = Self::R7;

    pub const ALL: [Self; 8] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
    ];
}

impl TryFrom<u8> for Register {
    type Error = PlatformError;

    fn try_from(value: u8) -> Result<Self, PlatformError> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(PlatformError::InvalidRegister(value))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", *self as u8)
    }
}

/// The LS-8 opcodes.
///
/// The byte layout is `AABCDDDD`:
///
/// - `AA` is the number of operand bytes following the opcode (0-2).
/// - `B` is set for ALU operations.
/// - `C` is set for instructions that write PC themselves.
/// - `DDDD` identifies the instruction.
///
/// ALU opcode notes ([ADD][Opcode::Add] through [SHR][Opcode::Shr]):
///
/// - Results are truncated to 8 bits and written back into `regA`.
/// - [CMP][Opcode::Cmp] writes FL instead of `regA`.
///
/// [`Int`][Opcode::Int] and [`Iret`][Opcode::Iret] are decoded but interrupts are not implemented;
/// executing either raises a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /* Control */
    /// Does nothing
    Nop = 0b0000_0000,
    /// Stops the machine
    Hlt = 0b0000_0001,

    /* Memory */
    /// `regA <- (immediate value)`
    Ldi = 0b1000_0010,
    /// `regA <- mem[regB]`
    Ld = 0b1000_0011,
    /// `mem[regA] <- regB`
    St = 0b1000_0100,
    /// `SP <- SP - 1; mem[SP] <- regA`
    Push = 0b0100_0101,
    /// `regA <- mem[SP]; SP <- SP + 1`
    Pop = 0b0100_0110,

    /* I/O */
    /// Prints `regA` as a decimal number followed by a newline
    Prn = 0b0100_0111,
    /// Prints `regA` as a single ASCII character
    Pra = 0b0100_1000,

    /* ALU */
    /// `regA <- regA + regB`
    Add = 0b1010_0000,
    /// `regA <- regA - regB`
    Sub = 0b1010_0001,
    /// `regA <- regA * regB`
    Mul = 0b1010_0010,
    /// `regA <- regA / regB`
    Div = 0b1010_0011,
    /// `regA <- regA % regB`
    Mod = 0b1010_0100,
    /// `regA <- regA + 1`
    Inc = 0b0110_0101,
    /// `regA <- regA - 1`
    Dec = 0b0110_0110,
    /// `FL <- compare(regA, regB)`
    Cmp = 0b1010_0111,
    /// `regA <- regA & regB`
    And = 0b1010_1000,
    /// `regA <- ~regA`
    Not = 0b0110_1001,
    /// `regA <- regA | regB`
    Or = 0b1010_1010,
    /// `regA <- regA ^ regB`
    Xor = 0b1010_1011,
    /// `regA <- regA << regB`
    Shl = 0b1010_1100,
    /// `regA <- regA >> regB`
    Shr = 0b1010_1101,

    /* Subroutines */
    /// `SP <- SP - 1; mem[SP] <- PC + 2; PC <- regA`
    Call = 0b0101_0000,
    /// `PC <- mem[SP]; SP <- SP + 1`
    Ret = 0b0001_0001,
    /// Raises the interrupt numbered by `regA`
    Int = 0b0101_0010,
    /// Returns from an interrupt handler
    Iret = 0b0001_0011,

    /* Branching */
    /// `PC <- regA`
    Jmp = 0b0101_0100,
    /// "Jump if Equal"
    /// ```text
    /// if FL.Equal == 1 {
    ///     PC <- regA
    /// }
    /// ```
    Jeq = 0b0101_0101,
    /// "Jump if Not Equal"
    Jne = 0b0101_0110,
    /// "Jump if Greater Than"
    Jgt = 0b0101_0111,
    /// "Jump if Less Than"
    Jlt = 0b0101_1000,
    /// "Jump if Less Than or Equal"
    Jle = 0b0101_1001,
    /// "Jump if Greater Than or Equal"
    Jge = 0b0101_1010,
}

impl Opcode {
    /// Number of operand bytes following the opcode.
    pub const fn operand_count(self) -> u8 {
        self as u8 >> 6
    }

    /// Encoded width of the instruction in bytes, opcode included.
    pub const fn width(self) -> u8 {
        1 + self.operand_count()
    }

    pub const fn is_alu(self) -> bool {
        self as u8 & 0b0010_0000 != 0
    }

    /// Whether the instruction may write PC itself.
    pub const fn sets_pc(self) -> bool {
        self as u8 & 0b0001_0000 != 0
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Hlt => "hlt",
            Self::Ldi => "ldi",
            Self::Ld => "ld",
            Self::St => "st",
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Prn => "prn",
            Self::Pra => "pra",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Mod => "mod",
            Self::Inc => "inc",
            Self::Dec => "dec",
            Self::Cmp => "cmp",
            Self::And => "and",
            Self::Not => "not",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Call => "call",
            Self::Ret => "ret",
            Self::Int => "int",
            Self::Iret => "iret",
            Self::Jmp => "jmp",
            Self::Jeq => "jeq",
            Self::Jne => "jne",
            Self::Jgt => "jgt",
            Self::Jlt => "jlt",
            Self::Jle => "jle",
            Self::Jge => "jge",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = PlatformError;

    fn try_from(value: u8) -> Result<Self, PlatformError> {
        match value {
            0b0000_0000 => Ok(Self::Nop),
            0b0000_0001 => Ok(Self::Hlt),
            0b1000_0010 => Ok(Self::Ldi),
            0b1000_0011 => Ok(Self::Ld),
            0b1000_0100 => Ok(Self::St),
            0b0100_0101 => Ok(Self::Push),
            0b0100_0110 => Ok(Self::Pop),
            0b0100_0111 => Ok(Self::Prn),
            0b0100_1000 => Ok(Self::Pra),
            0b1010_0000 => Ok(Self::Add),
            0b1010_0001 => Ok(Self::Sub),
            0b1010_0010 => Ok(Self::Mul),
            0b1010_0011 => Ok(Self::Div),
            0b1010_0100 => Ok(Self::Mod),
            0b0110_0101 => Ok(Self::Inc),
            0b0110_0110 => Ok(Self::Dec),
            0b1010_0111 => Ok(Self::Cmp),
            0b1010_1000 => Ok(Self::And),
            0b0110_1001 => Ok(Self::Not),
            0b1010_1010 => Ok(Self::Or),
            0b1010_1011 => Ok(Self::Xor),
            0b1010_1100 => Ok(Self::Shl),
            0b1010_1101 => Ok(Self::Shr),
            0b0101_0000 => Ok(Self::Call),
            0b0001_0001 => Ok(Self::Ret),
            0b0101_0010 => Ok(Self::Int),
            0b0001_0011 => Ok(Self::Iret),
            0b0101_0100 => Ok(Self::Jmp),
            0b0101_0101 => Ok(Self::Jeq),
            0b0101_0110 => Ok(Self::Jne),
            0b0101_0111 => Ok(Self::Jgt),
            0b0101_1000 => Ok(Self::Jlt),
            0b0101_1001 => Ok(Self::Jle),
            0b0101_1010 => Ok(Self::Jge),
            _ => Err(PlatformError::InvalidOpcode(value)),
        }
    }
}

/// Operand layouts of LS-8 instructions.
///
/// The opcode byte is always first; the variant determines how many bytes follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrFormat {
    /// `<Opcode, Register, Immediate>`
    RI(Register, u8),
    /// `<Opcode, Register, Register>`
    RR(Register, Register),
    /// `<Opcode, Register>`
    R(Register),
    /// `<Opcode>`
    OpOnly,
}

/// A decoded LS-8 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub op: Opcode,
    pub format: InstrFormat,
}

impl Instruction {
    /// Checks if this instruction has a valid format for its opcode.
    ///
    /// # Errors
    ///
    /// This function will return an error if the instruction's format is invalid for its opcode.
    pub fn validate(self) -> PResult<()> {
        #[doc(hidden)]
        macro_rules! assert_format {
            ($fmt:pat) => {
                if matches!(self.format, $fmt) {
                    Ok(())
                } else {
                    Err(PlatformError::InvalidInstruction)
                }
            };
        }
        match self.op {
            Opcode::Nop | Opcode::Hlt | Opcode::Ret | Opcode::Iret => {
                assert_format!(InstrFormat::OpOnly)
            }
            Opcode::Ldi => assert_format!(InstrFormat::RI(_, _)),
            Opcode::Ld
            | Opcode::St
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Cmp
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Shr => assert_format!(InstrFormat::RR(_, _)),
            Opcode::Push
            | Opcode::Pop
            | Opcode::Prn
            | Opcode::Pra
            | Opcode::Inc
            | Opcode::Dec
            | Opcode::Not
            | Opcode::Call
            | Opcode::Int
            | Opcode::Jmp
            | Opcode::Jeq
            | Opcode::Jne
            | Opcode::Jgt
            | Opcode::Jlt
            | Opcode::Jle
            | Opcode::Jge => assert_format!(InstrFormat::R(_)),
        }
    }

    /// Generates the machine code for this instruction. The result is [`Opcode::width`] bytes long.
    ///
    /// # Errors
    ///
    /// This function will return an error if the instruction's format is invalid for its opcode.
    pub fn to_bytes(self) -> PResult<Vec<u8>> {
        self.validate()?;
        let op = self.op as u8;
        Ok(match self.format {
            InstrFormat::RI(a, imm) => vec![op, a as u8, imm],
            InstrFormat::RR(a, b) => vec![op, a as u8, b as u8],
            InstrFormat::R(a) => vec![op, a as u8],
            InstrFormat::OpOnly => vec![op],
        })
    }

    /// Decodes an instruction from the opcode byte and the two bytes following it.
    /// Operand bytes past the opcode's width are ignored.
    ///
    /// # Errors
    ///
    /// This function will return an error if the opcode is unknown or a register operand is out of range.
    pub fn from_bytes(bytes: [u8; 3]) -> PResult<Self> {
        let op: Opcode = bytes[0].try_into()?;
        let format = match op {
            Opcode::Nop | Opcode::Hlt | Opcode::Ret | Opcode::Iret => InstrFormat::OpOnly,
            Opcode::Ldi => InstrFormat::RI(bytes[1].try_into()?, bytes[2]),
            _ if op.operand_count() == 2 => {
                InstrFormat::RR(bytes[1].try_into()?, bytes[2].try_into()?)
            }
            _ => InstrFormat::R(bytes[1].try_into()?),
        };

        let this = Self { op, format };
        this.validate()?;
        Ok(this)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.op.mnemonic();
        match self.format {
            InstrFormat::RI(a, imm) => write!(f, "{op:<5} {a} ${imm}"),
            InstrFormat::RR(a, b) => write!(f, "{op:<5} {a} {b}"),
            InstrFormat::R(a) => write!(f, "{op:<5} {a}"),
            InstrFormat::OpOnly => write!(f, "{op}"),
        }
    }
}

/// Parses a memory address written either in decimal or as `0x`-prefixed hex.
pub fn parse_addr(s: &str) -> Result<u8, ParseIntError> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    }
}
