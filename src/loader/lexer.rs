use nom::{
    branch::alt,
    bytes::complete::take_while_m_n,
    character::complete::{char, line_ending, not_line_ending, space0},
    combinator::{eof, map, map_res, opt},
    sequence::{preceded, terminated, tuple},
    IResult,
};

use super::Span;

/// Exactly eight binary digits.
pub fn lex_byte(inp: Span) -> IResult<Span, u8> {
    map_res(
        take_while_m_n(8, 8, |c: char| c == '0' || c == '1'),
        |s: Span| u8::from_str_radix(s.fragment(), 2),
    )(inp)
}

pub fn lex_comment(inp: Span) -> IResult<Span, Span> {
    preceded(char('#'), not_line_ending)(inp)
}

/// One full line, including its line ending. Yields the byte on the line, if there is one.
pub fn lex_line(inp: Span) -> IResult<Span, Option<u8>> {
    map(
        terminated(
            tuple((space0, opt(lex_byte), space0, opt(lex_comment))),
            alt((line_ending, eof)),
        ),
        |(_, byte, _, _)| byte,
    )(inp)
}
