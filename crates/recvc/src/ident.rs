//! Stable identifiers the router compares against: message opcodes and comment pseudo-opcodes.

use serde::Serialize;

use crate::cell::{Cell, CellBuilder};
use crate::compile::{CompileErrorKind, CompilerError};
use crate::diagnostics::Span;
use crate::language::protocol::{MAX_COMMENT_BYTES, OPCODE_BITS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NumBase {
    Bin,
    Oct,
    Dec,
    Hex,
}

impl NumBase {
    pub fn radix(self) -> u32 {
        match self {
            NumBase::Bin => 2,
            NumBase::Oct => 8,
            NumBase::Dec => 10,
            NumBase::Hex => 16,
        }
    }
}

/// A 32-bit header literal as written in the source, numeral base included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NumLit {
    pub value: u32,
    pub base: NumBase,
}

impl NumLit {
    pub fn parse(src: &str) -> Result<Self, String> {
        let src = src.trim();
        let (base, digits) = if let Some(rest) = strip_prefix_ci(src, "0x") {
            (NumBase::Hex, rest)
        } else if let Some(rest) = strip_prefix_ci(src, "0b") {
            (NumBase::Bin, rest)
        } else if let Some(rest) = strip_prefix_ci(src, "0o") {
            (NumBase::Oct, rest)
        } else {
            (NumBase::Dec, src)
        };
        let digits: String = digits.chars().filter(|c| *c != '_').collect();
        if digits.is_empty() {
            return Err(format!("numeric literal has no digits: {src:?}"));
        }
        let value = u32::from_str_radix(&digits, base.radix())
            .map_err(|e| format!("invalid 32-bit opcode literal {src:?}: {e}"))?;
        Ok(Self { value, base })
    }
}

fn strip_prefix_ci<'a>(src: &'a str, prefix: &str) -> Option<&'a str> {
    let head = src.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        src.get(prefix.len()..)
    } else {
        None
    }
}

/// Renders a header literal for an equality test in generated code.
///
/// The target has no binary or octal numerals, so every non-decimal literal becomes hex.
pub fn message_opcode(n: &NumLit) -> String {
    match n.base {
        NumBase::Dec => n.value.to_string(),
        NumBase::Bin | NumBase::Oct | NumBase::Hex => format!("0x{:x}", n.value),
    }
}

/// The cell a text comment travels in: a zero opcode followed by the raw UTF-8 bytes.
pub fn comment_cell(comment: &str) -> Result<Cell, CompilerError> {
    let mut b = CellBuilder::new();
    b.store_uint(0, OPCODE_BITS)
        .and_then(|b| b.store_bytes(comment.as_bytes()))
        .map_err(|e| {
            CompilerError::new(
                CompileErrorKind::Internal,
                format!("internal error: building comment cell: {e}"),
            )
        })?;
    Ok(b.end_cell())
}

/// Content-hash identifier of a comment receiver, hex encoded.
///
/// The router compares this against the hash of the live payload, so the hashed block must be
/// shaped exactly like an incoming comment message.
pub fn comment_pseudo_opcode(comment: &str, loc: Option<&Span>) -> Result<String, CompilerError> {
    let len = comment.len();
    if len > MAX_COMMENT_BYTES {
        let at = loc.map(|l| format!(" at {l}")).unwrap_or_default();
        return Err(CompilerError::new(
            CompileErrorKind::OversizedComment,
            format!(
                "receiver message is too long, max length is {MAX_COMMENT_BYTES} bytes, but given {len}{at}"
            ),
        )
        .with_span(loc.cloned()));
    }
    Ok(comment_cell(comment)?.hash_hex())
}
