//! Program image loading for the LS-8.
//!
//! An image is a text file with one byte per line, written as exactly eight binary digits.
//! Anything after a `#` is a comment. Blank and comment-only lines are skipped.
//!
//! ```text
//! 10000010 # LDI R0,8
//! 00000000
//! 00001000
//! 00000001 # HLT
//! ```

use std::{fs, path::Path};

use anyhow::{Context, Result};
use nom_locate::LocatedSpan;
use thiserror::Error;

use crate::plat::RAM_SIZE;

pub mod lexer;

pub type Span<'a> = LocatedSpan<&'a str>;

/// An error for the loader module of the LS-8.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("syntax error at ({line}:{column}): {text:?}")]
    Syntax {
        line: u32,
        column: usize,
        text: String,
    },
    #[error("program too large at line {line} (memory holds {capacity} bytes)")]
    TooLarge { line: u32, capacity: usize },
}

/// Parses a program image into the bytes to load at address 0.
///
/// # Errors
///
/// This function will return an error if a line is malformed or the program doesn't fit in memory.
pub fn parse_program(src: &str) -> Result<Vec<u8>, LoadError> {
    let mut inp = Span::new(src);
    let mut program = Vec::new();
    while !inp.fragment().is_empty() {
        let (rest, byte) = lexer::lex_line(inp).map_err(|err| {
            let at = match err {
                nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
                nom::Err::Incomplete(_) => inp,
            };
            LoadError::Syntax {
                line: at.location_line(),
                column: at.get_utf8_column(),
                text: inp.fragment().lines().next().unwrap_or_default().to_owned(),
            }
        })?;
        if let Some(byte) = byte {
            if program.len() == RAM_SIZE {
                return Err(LoadError::TooLarge {
                    line: inp.location_line(),
                    capacity: RAM_SIZE,
                });
            }
            program.push(byte);
        }
        inp = rest;
    }
    Ok(program)
}

/// Reads and parses the program image at `path`.
///
/// # Errors
///
/// This function will return an error if the file can't be read or doesn't parse.
pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let src = fs::read_to_string(path)
        .with_context(|| format!("failed to read program {}", path.display()))?;
    let program = parse_program(&src)
        .with_context(|| format!("failed to load program {}", path.display()))?;
    log::debug!("loaded {} bytes from {}", program.len(), path.display());
    Ok(program)
}
