use thiserror::Error;

use crate::plat::Opcode;

use super::registers::Fl;

/// The operations the ALU can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AluOp {
    Add = 0,
    Sub,
    Mul,
    Div,
    Mod,
    Inc,
    Dec,
    Cmp,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
}

impl AluOp {
    /// Maps an ALU opcode to its operation. Returns `None` for opcodes outside the ALU.
    pub fn from_opcode(op: Opcode) -> Option<Self> {
        Some(match op {
            Opcode::Add => Self::Add,
            Opcode::Sub => Self::Sub,
            Opcode::Mul => Self::Mul,
            Opcode::Div => Self::Div,
            Opcode::Mod => Self::Mod,
            Opcode::Inc => Self::Inc,
            Opcode::Dec => Self::Dec,
            Opcode::Cmp => Self::Cmp,
            Opcode::And => Self::And,
            Opcode::Or => Self::Or,
            Opcode::Xor => Self::Xor,
            Opcode::Not => Self::Not,
            Opcode::Shl => Self::Shl,
            Opcode::Shr => Self::Shr,
            _ => return None,
        })
    }
}

/// What an ALU operation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOutput {
    /// A value to be written back into the left operand register.
    Value(u8),
    /// New contents for FL. Only produced by [`AluOp::Cmp`].
    Flags(Fl),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AluError {
    #[error("division by zero")]
    DivideByZero,
}

/// The ALU (Arithmetic and Logic Unit) of the LS-8.
///
/// Every result is truncated to 8 bits. Division truncates toward zero.
pub struct Alu;

impl Alu {
    /// Performs `op` on the two operands.
    ///
    /// # Errors
    ///
    /// This function will return an error if `op` is [`AluOp::Div`] or [`AluOp::Mod`] and `right` is zero.
    pub fn execute(op: AluOp, left: u8, right: u8) -> Result<AluOutput, AluError> {
        let result = match op {
            AluOp::Add => left.wrapping_add(right),
            AluOp::Sub => left.wrapping_sub(right),
            AluOp::Mul => left.wrapping_mul(right),
            AluOp::Div => left.checked_div(right).ok_or(AluError::DivideByZero)?,
            AluOp::Mod => left.checked_rem(right).ok_or(AluError::DivideByZero)?,
            AluOp::Inc => left.wrapping_add(1),
            AluOp::Dec => left.wrapping_sub(1),
            AluOp::Cmp => return Ok(AluOutput::Flags(Fl::from_ordering(left.cmp(&right)))),
            AluOp::And => left & right,
            AluOp::Or => left | right,
            AluOp::Xor => left ^ right,
            AluOp::Not => !left,
            // shifting out every bit leaves zero
            AluOp::Shl => left.checked_shl(right as u32).unwrap_or(0),
            AluOp::Shr => left.checked_shr(right as u32).unwrap_or(0),
        };
        Ok(AluOutput::Value(result))
    }
}
