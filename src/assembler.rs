//! Assembly language parser and two-pass bytecode compiler.
//!
//! Converts human-readable assembly source into an executable [`Program`].
//!
//! # Syntax
//!
//! ```text
//! label: MNEMONIC operand  ; comment
//! ```
//!
//! - One instruction per line, with at most one operand
//! - Mnemonics are uppercase (e.g., `PUSH`, `LOAD_LOCAL`)
//! - Integer literals are decimal (`42`, `-1`), hex (`0x2A`), or octal (`052`)
//! - Jump and call operands may name a label instead of a literal address
//! - String literals are double-quoted with `\n \t \r \\ \"` escapes
//! - Labels are alphanumeric/underscore names followed by `:`
//! - Comments run from `;` to end of line (quotes protect `;`)
//!
//! # Two-pass translation
//!
//! Pass 1 tokenizes every line, records label positions against a running
//! byte-offset counter, and sizes each instruction from the opcode table.
//! Pass 2 re-walks the recorded instruction lines and emits bytecode with
//! every label reference resolved, so forward and backward references work
//! alike. The label table is complete and immutable before pass 2 starts,
//! and pass 2 must emit exactly the byte count pass 1 computed.

use crate::errors::AssemblyError;
use crate::isa::{Opcode, OperandKind};
use crate::program::{CODE_CAPACITY, Program};
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';

/// Return the line/column/message triple for located assembly errors.
fn source_location(err: &AssemblyError) -> Option<(usize, usize, String)> {
    match err {
        AssemblyError::Source { line, col, message } => Some((*line, *col, message.clone())),
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for assembly failures.
fn render_diagnostic(file: &str, source: &str, err: &AssemblyError) -> String {
    let mut diag = String::new();
    let Some((line, col, message)) = source_location(err) else {
        let _ = writeln!(diag, "error: {err}");
        return diag;
    };

    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{col}");
    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(col.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{line:>4} | {text}");
        let _ = writeln!(diag, "  | {underline}^");
    }
    diag
}

/// Label table built during pass 1.
///
/// Created fresh per assembly run and discarded afterwards; labels never
/// survive into the emitted bytecode.
struct AsmContext {
    labels: HashMap<String, usize>,
}

impl AsmContext {
    fn new() -> Self {
        Self {
            labels: HashMap::new(),
        }
    }

    /// Registers a label at the given byte offset.
    fn define_label(&mut self, name: String, offset: usize) -> Result<(), AssemblyError> {
        if self.labels.contains_key(&name) {
            return Err(AssemblyError::DuplicateLabel(name));
        }
        self.labels.insert(name, offset);
        Ok(())
    }

    /// Resolves a label to its byte offset.
    fn resolve_label(&self, name: &str) -> Result<usize, AssemblyError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| AssemblyError::UndefinedLabel(name.to_string()))
    }
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column in the line.
    col: usize,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `;` starts a comment unless inside a quoted string
/// - whitespace separates tokens
/// - a quoted string is one token, including its quotes; `\` escapes the
///   next character so `\"` does not close the string
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, AssemblyError> {
    let mut out = Vec::new();

    let mut start: Option<usize> = None;
    let mut start_col: usize = 0;
    let mut in_str = false;

    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == COMMENT_CHAR as u8 && !in_str {
            break;
        }

        match b {
            b'"' => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
                in_str = !in_str;
                i += 1;
            }

            b'\\' if in_str => {
                // skip the escaped character so \" stays inside the string
                i += 2;
            }

            b' ' | b'\t' if !in_str => {
                if let Some(s) = start {
                    out.push(Token {
                        text: &line[s..i],
                        col: start_col,
                    });
                    start = None;
                }
                i += 1;
            }

            _ => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
                i += 1;
            }
        }
    }

    if in_str {
        return Err(located(
            line_no,
            start_col,
            AssemblyError::UnterminatedString,
        ));
    }

    if let Some(s) = start {
        let end = i.min(line.len());
        out.push(Token {
            text: &line[s..end],
            col: start_col,
        });
    }

    Ok(out)
}

/// Wraps a bare error kind with its source position.
fn located(line: usize, col: usize, err: AssemblyError) -> AssemblyError {
    AssemblyError::Source {
        line,
        col,
        message: err.to_string(),
    }
}

/// Checks whether a token is a label definition (`name:`).
///
/// A quoted string can never introduce a label, so anything starting with
/// `"` is left for operand parsing.
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && tok.len() > 1 && !tok.starts_with('"')
}

fn is_valid_label_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses an integer literal: decimal, hex (`0x` prefix), or octal
/// (leading `0`), with an optional leading minus.
fn parse_int(tok: &str) -> Option<i64> {
    let (neg, digits) = match tok.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, tok),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if neg { -magnitude } else { magnitude })
}

/// Parses a 4-byte integer operand: a literal, or a label resolved against
/// the pass-1 table. Returns the operand's little-endian bit pattern.
fn parse_int_or_label(
    ctx: &AsmContext,
    op: Opcode,
    tok: &str,
) -> Result<u32, AssemblyError> {
    if tok.starts_with('"') {
        return Err(AssemblyError::InvalidOperand {
            mnemonic: op.mnemonic(),
            token: tok.to_string(),
        });
    }
    if let Some(v) = parse_int(tok) {
        if !(-(1i64 << 31)..(1i64 << 32)).contains(&v) {
            return Err(AssemblyError::InvalidOperand {
                mnemonic: op.mnemonic(),
                token: tok.to_string(),
            });
        }
        // i64 -> u32 keeps the low 32 bits, so negatives stay two's-complement
        return Ok(v as u32);
    }
    Ok(ctx.resolve_label(tok)? as u32)
}

/// Parses a 1-byte operand (local slot index).
fn parse_byte(op: Opcode, tok: &str) -> Result<u8, AssemblyError> {
    match parse_int(tok) {
        Some(v) if (0..=255).contains(&v) => Ok(v as u8),
        _ => Err(AssemblyError::InvalidOperand {
            mnemonic: op.mnemonic(),
            token: tok.to_string(),
        }),
    }
}

/// Parses a quoted string operand into its raw payload bytes (no terminator).
///
/// Recognized escapes: `\n \t \r \\ \"`; any other escaped character is
/// emitted literally.
fn parse_string(op: Opcode, tok: &str) -> Result<Vec<u8>, AssemblyError> {
    let invalid = || AssemblyError::InvalidOperand {
        mnemonic: op.mnemonic(),
        token: tok.to_string(),
    };
    if tok.len() < 2 {
        return Err(invalid());
    }
    let inner = tok
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .ok_or_else(invalid)?;

    let bytes = inner.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            out.push(match bytes[i + 1] {
                b'n' => b'\n',
                b't' => b'\t',
                b'r' => b'\r',
                other => other,
            });
            i += 2;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

/// An instruction line recorded by pass 1 for pass 2 to emit.
struct InstrLine<'a> {
    line_no: usize,
    op: Opcode,
    tokens: Vec<Token<'a>>,
    /// Byte offset pass 1 assigned to this instruction.
    offset: usize,
}

/// Size of the instruction in bytes: opcode plus its encoded operand.
///
/// String operands must be parsed here so escape processing settles the
/// payload length; the terminating null byte is included.
fn instruction_size(op: Opcode, operand: Option<&Token>) -> Result<usize, AssemblyError> {
    match op.operand_kind() {
        kind @ (OperandKind::None | OperandKind::Byte | OperandKind::Int) => {
            Ok(1 + kind.fixed_size().unwrap_or(0))
        }
        OperandKind::Str => {
            let tok = operand.ok_or(AssemblyError::MissingOperand(op.mnemonic()))?;
            Ok(1 + parse_string(op, tok.text)?.len() + 1)
        }
    }
}

/// Checks the operand token count against what the opcode expects.
fn check_arity(op: Opcode, tokens: &[Token]) -> Result<(), AssemblyError> {
    let has_operand = op.operand_kind() != OperandKind::None;
    match (has_operand, tokens.len()) {
        (false, 1) | (true, 2) => Ok(()),
        (true, 1) => Err(AssemblyError::MissingOperand(op.mnemonic())),
        _ => Err(AssemblyError::UnexpectedOperand {
            mnemonic: op.mnemonic(),
            token: tokens.last().map(|t| t.text.to_string()).unwrap_or_default(),
        }),
    }
}

/// Pass 1: tokenize all lines, record labels, and size every instruction.
fn pass_1<'a>(
    ctx: &mut AsmContext,
    source: &'a str,
) -> Result<(Vec<InstrLine<'a>>, usize), AssemblyError> {
    let mut lines = Vec::new();
    let mut offset = 0usize;

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let mut tokens = tokenize(line_no, line)?;
        if tokens.is_empty() {
            continue;
        }

        if is_label_def(tokens[0].text) {
            let def = tokens.remove(0);
            let name = &def.text[..def.text.len() - 1];
            if !is_valid_label_name(name) {
                return Err(located(
                    line_no,
                    def.col,
                    AssemblyError::InvalidLabel(name.to_string()),
                ));
            }
            ctx.define_label(name.to_string(), offset)
                .map_err(|e| located(line_no, def.col, e))?;
            if tokens.is_empty() {
                continue;
            }
        }

        let mnemonic = &tokens[0];
        let op = Opcode::from_mnemonic(mnemonic.text).ok_or_else(|| {
            located(
                line_no,
                mnemonic.col,
                AssemblyError::UnknownMnemonic(mnemonic.text.to_string()),
            )
        })?;
        check_arity(op, &tokens).map_err(|e| located(line_no, mnemonic.col, e))?;
        let size = instruction_size(op, tokens.get(1))
            .map_err(|e| located(line_no, mnemonic.col, e))?;

        lines.push(InstrLine {
            line_no,
            op,
            tokens,
            offset,
        });
        offset += size;
    }

    if offset > CODE_CAPACITY {
        return Err(AssemblyError::CapacityExceeded {
            size: offset,
            capacity: CODE_CAPACITY,
        });
    }

    Ok((lines, offset))
}

/// Pass 2: emit bytecode for every recorded line, resolving labels against
/// the now-complete pass-1 table.
fn pass_2(ctx: &AsmContext, lines: &[InstrLine], total: usize) -> Result<Program, AssemblyError> {
    let mut code: Vec<u8> = Vec::with_capacity(total);

    for line in lines {
        debug_assert_eq!(code.len(), line.offset);
        code.push(line.op as u8);

        let operand = line.tokens.get(1);
        let emit = |e| located(line.line_no, line.tokens[0].col, e);
        match line.op.operand_kind() {
            OperandKind::None => {}
            OperandKind::Byte => {
                let tok = operand.ok_or(AssemblyError::MissingOperand(line.op.mnemonic()))?;
                code.push(parse_byte(line.op, tok.text).map_err(emit)?);
            }
            OperandKind::Int => {
                let tok = operand.ok_or(AssemblyError::MissingOperand(line.op.mnemonic()))?;
                let bits = parse_int_or_label(ctx, line.op, tok.text).map_err(emit)?;
                code.extend_from_slice(&bits.to_le_bytes());
            }
            OperandKind::Str => {
                let tok = operand.ok_or(AssemblyError::MissingOperand(line.op.mnemonic()))?;
                code.extend_from_slice(&parse_string(line.op, tok.text).map_err(emit)?);
                code.push(0);
            }
        }
    }

    // pass symmetry: pass 2 must emit exactly what pass 1 measured
    if code.len() != total {
        return Err(AssemblyError::SizeMismatch {
            expected: total,
            actual: code.len(),
        });
    }

    Program::new(code)
}

/// Assembles a full source string into a [`Program`].
///
/// Runs both passes against a fresh [`AsmContext`]; on any error no bytecode
/// is produced.
pub fn assemble_source(source: &str) -> Result<Program, AssemblyError> {
    let mut ctx = AsmContext::new();
    let (lines, total) = pass_1(&mut ctx, source)?;
    pass_2(&ctx, &lines, total)
}

/// Convenience: assemble directly from a file path.
///
/// On failure a compiler-style diagnostic naming the file, line, and column
/// is written to stderr before the error is returned.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Program, AssemblyError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|e| AssemblyError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let result = assemble_source(&source);
    if let Err(err) = &result {
        eprint!(
            "{}",
            render_diagnostic(&path.display().to_string(), &source, err)
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_empty_source() {
        assert!(assemble_source("").unwrap().is_empty());
    }

    #[test]
    fn assemble_comments_and_blank_lines() {
        let source = "\n; a comment\n\n   ; another\n";
        assert!(assemble_source(source).unwrap().is_empty());
    }

    #[test]
    fn assemble_single_instruction() {
        let program = assemble_source("PUSH 42").unwrap();
        assert_eq!(program.as_bytes(), [Opcode::Push as u8, 42, 0, 0, 0]);
    }

    #[test]
    fn assemble_inline_comment() {
        let program = assemble_source("PUSH 42 ; load value").unwrap();
        assert_eq!(program.len(), 5);
    }

    #[test]
    fn comment_char_inside_string_is_payload() {
        let program = assemble_source(r#"PRINT_STR "a;b""#).unwrap();
        assert_eq!(
            program.as_bytes(),
            [&[Opcode::PrintStr as u8], b"a;b\0".as_slice()].concat()
        );
    }

    #[test]
    fn assemble_negative_operand() {
        let program = assemble_source("PUSH -1").unwrap();
        assert_eq!(
            i32::from_le_bytes(program.as_bytes()[1..5].try_into().unwrap()),
            -1
        );
    }

    #[test]
    fn integer_radix_autodetect() {
        for src in ["PUSH 42", "PUSH 0x2A", "PUSH 052"] {
            let program = assemble_source(src).unwrap();
            assert_eq!(
                i32::from_le_bytes(program.as_bytes()[1..5].try_into().unwrap()),
                42,
                "{src}"
            );
        }
    }

    #[test]
    fn parse_int_rejects_garbage() {
        assert_eq!(parse_int("abc"), None);
        assert_eq!(parse_int("1x"), None);
        assert_eq!(parse_int("0x"), None);
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("09"), None); // 9 is not an octal digit
    }

    #[test]
    fn assemble_unknown_mnemonic() {
        let err = assemble_source("NOP\nBOGUS 1").unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Source { line: 2, ref message, .. }
                if message.contains("unknown mnemonic")
        ));
    }

    #[test]
    fn assemble_missing_operand() {
        let err = assemble_source("PUSH").unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Source { line: 1, ref message, .. }
                if message.contains("requires an operand")
        ));
    }

    #[test]
    fn assemble_unexpected_operand() {
        let err = assemble_source("ADD 5").unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Source { line: 1, ref message, .. }
                if message.contains("takes no operand")
        ));
    }

    #[test]
    fn assemble_unterminated_string() {
        let err = assemble_source(r#"PRINT_STR "oops"#).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Source { line: 1, ref message, .. }
                if message.contains("unterminated string")
        ));
    }

    #[test]
    fn assemble_unquoted_string_operand() {
        let err = assemble_source("PRINT_STR oops").unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Source { ref message, .. } if message.contains("invalid operand")
        ));
    }

    #[test]
    fn assemble_quoted_int_operand() {
        let err = assemble_source(r#"PUSH "5""#).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Source { ref message, .. } if message.contains("invalid operand")
        ));
    }

    #[test]
    fn string_escapes() {
        let program = assemble_source(r#"PRINT_STR "a\tb\n\\\"\q""#).unwrap();
        let mut expected = vec![Opcode::PrintStr as u8];
        expected.extend_from_slice(b"a\tb\n\\\"q\0");
        assert_eq!(program.as_bytes(), expected);
    }

    // ==================== Labels ====================

    #[test]
    fn forward_reference_resolves() {
        // JMP is 5 bytes, NOP is 1: `target` sits at offset 6
        let program = assemble_source("JMP target\nNOP\ntarget: HALT").unwrap();
        assert_eq!(
            u32::from_le_bytes(program.as_bytes()[1..5].try_into().unwrap()),
            6
        );
    }

    #[test]
    fn backward_reference_resolves() {
        let program = assemble_source("target: NOP\nJMP target").unwrap();
        assert_eq!(
            u32::from_le_bytes(program.as_bytes()[2..6].try_into().unwrap()),
            0
        );
    }

    #[test]
    fn forward_and_backward_references_agree() {
        let program = assemble_source("JMP lab\nlab: NOP\nJMP lab").unwrap();
        let bytes = program.as_bytes();
        let forward = u32::from_le_bytes(bytes[1..5].try_into().unwrap());
        let backward = u32::from_le_bytes(bytes[7..11].try_into().unwrap());
        assert_eq!(forward, 5);
        assert_eq!(forward, backward);
    }

    #[test]
    fn label_with_instruction_on_same_line() {
        let program = assemble_source("start: PUSH 1\nJMP start").unwrap();
        assert_eq!(
            u32::from_le_bytes(program.as_bytes()[6..10].try_into().unwrap()),
            0
        );
    }

    #[test]
    fn duplicate_label_error() {
        let err = assemble_source("dup: NOP\ndup: NOP").unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Source { line: 2, ref message, .. }
                if message.contains("duplicate label")
        ));
    }

    #[test]
    fn undefined_label_error() {
        let err = assemble_source("JMP missing").unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Source { line: 1, ref message, .. }
                if message.contains("undefined label")
        ));
    }

    #[test]
    fn invalid_label_name_error() {
        let err = assemble_source("my-label: NOP").unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Source { line: 1, ref message, .. }
                if message.contains("invalid label")
        ));
    }

    #[test]
    fn is_label_def_rules() {
        assert!(is_label_def("start:"));
        assert!(is_label_def("_loop1:"));
        assert!(!is_label_def(":"));
        assert!(!is_label_def("start"));
        assert!(!is_label_def("\"text:\""));
    }

    // ==================== Operand ranges ====================

    #[test]
    fn byte_operand_range() {
        assert!(assemble_source("STORE_LOCAL 255").is_ok());
        let err = assemble_source("STORE_LOCAL 256").unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Source { ref message, .. } if message.contains("invalid operand")
        ));
        assert!(assemble_source("STORE_LOCAL -1").is_err());
    }

    #[test]
    fn int_operand_range() {
        assert!(assemble_source("PUSH 2147483647").is_ok());
        assert!(assemble_source("PUSH -2147483648").is_ok());
        // addresses up to u32::MAX are representable too
        assert!(assemble_source("PUSH 4294967295").is_ok());
        assert!(assemble_source("PUSH 4294967296").is_err());
    }

    // ==================== Capacity and symmetry ====================

    #[test]
    fn capacity_exceeded() {
        // 13200 PUSH instructions = 66000 bytes, past the 65536-byte buffer
        let source = "PUSH 0\n".repeat(13200);
        let err = assemble_source(&source).unwrap_err();
        assert!(matches!(err, AssemblyError::CapacityExceeded { size: 66000, .. }));
    }

    #[test]
    fn pass_sizes_agree_on_string_operands() {
        // escape processing shrinks the payload; pass 1 must size the
        // processed bytes, not the source text
        let program = assemble_source(r#"PRINT_STR "a\nb""#).unwrap();
        assert_eq!(program.len(), 1 + 3 + 1);
    }

    // ==================== Diagnostics ====================

    #[test]
    fn diagnostic_points_at_the_offending_line() {
        let source = "NOP\nBOGUS";
        let err = assemble_source(source).unwrap_err();
        let diag = render_diagnostic("test.asm", source, &err);
        assert!(diag.contains("error: unknown mnemonic `BOGUS`"));
        assert!(diag.contains("--> test.asm:2:1"));
        assert!(diag.contains("   2 | BOGUS"));
        assert!(diag.contains("^"));
    }

    #[test]
    fn assemble_file_missing_path() {
        let err = assemble_file("/nonexistent/input.asm").unwrap_err();
        assert!(matches!(err, AssemblyError::Io { .. }));
    }
}
