//! Read-only bytecode listing tool.
//!
//! A single linear pass over a bytecode buffer: read one opcode byte, look it
//! up in the opcode table, decode its operand, advance, repeat. Bytes outside
//! the opcode space are reported and scanning resumes at the next byte; this
//! is a diagnostic tool and never fails hard or mutates the buffer.

use crate::isa::{Opcode, OperandKind};
use std::fmt;

/// Decoded operand value of a single instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    Byte(u8),
    Int(i32),
    Str(String),
}

/// One entry of a disassembly listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstr {
    /// Byte address of the opcode.
    pub addr: usize,
    pub body: DecodedBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedBody {
    /// A recognized instruction and its operand.
    Instr { op: Opcode, operand: Operand },
    /// A byte outside the opcode space; scanning resumed after it.
    Invalid(u8),
    /// An instruction whose operand runs past the end of the buffer.
    Truncated(Opcode),
}

/// Decodes the single instruction at `addr`.
///
/// Returns the decoded entry and the address of the next instruction, or
/// `None` when `addr` is past the end of the buffer. Shared with the VM's
/// instruction tracer.
pub fn decode_at(code: &[u8], addr: usize) -> Option<(DecodedInstr, usize)> {
    let byte = *code.get(addr)?;
    let op = match Opcode::try_from(byte) {
        Ok(op) => op,
        Err(_) => {
            return Some((
                DecodedInstr {
                    addr,
                    body: DecodedBody::Invalid(byte),
                },
                addr + 1,
            ));
        }
    };

    let start = addr + 1;
    let truncated = |op| {
        (
            DecodedInstr {
                addr,
                body: DecodedBody::Truncated(op),
            },
            code.len(),
        )
    };

    let (operand, next) = match op.operand_kind() {
        OperandKind::None => (Operand::None, start),
        OperandKind::Byte => match code.get(start) {
            Some(&b) => (Operand::Byte(b), start + 1),
            None => return Some(truncated(op)),
        },
        OperandKind::Int => match code.get(start..start + 4) {
            Some(bytes) => (
                Operand::Int(i32::from_le_bytes(bytes.try_into().unwrap())),
                start + 4,
            ),
            None => return Some(truncated(op)),
        },
        OperandKind::Str => match code[start..].iter().position(|&b| b == 0) {
            Some(nul) => (
                Operand::Str(String::from_utf8_lossy(&code[start..start + nul]).into_owned()),
                start + nul + 1,
            ),
            None => return Some(truncated(op)),
        },
    };

    Some((
        DecodedInstr {
            addr,
            body: DecodedBody::Instr { op, operand },
        },
        next,
    ))
}

/// Disassembles the whole buffer into a listing, best-effort.
pub fn disassemble(code: &[u8]) -> Vec<DecodedInstr> {
    let mut out = Vec::new();
    let mut addr = 0;
    while let Some((instr, next)) = decode_at(code, addr) {
        let stop = matches!(instr.body, DecodedBody::Truncated(_));
        out.push(instr);
        if stop {
            break;
        }
        addr = next;
    }
    out
}

/// Renders the listing one instruction per line.
pub fn disassemble_to_string(code: &[u8]) -> String {
    let mut out = String::new();
    for instr in disassemble(code) {
        out.push_str(&instr.to_string());
        out.push('\n');
    }
    out
}

/// Re-applies source escapes so the listing round-trips through the assembler.
fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for DecodedInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            DecodedBody::Instr { op, operand } => match operand {
                Operand::None => write!(f, "{:04X}:  {}", self.addr, op.mnemonic()),
                Operand::Byte(b) => write!(f, "{:04X}:  {} {}", self.addr, op.mnemonic(), b),
                Operand::Int(v) => write!(f, "{:04X}:  {} {}", self.addr, op.mnemonic(), v),
                Operand::Str(s) => {
                    write!(f, "{:04X}:  {} \"{}\"", self.addr, op.mnemonic(), escape_str(s))
                }
            },
            DecodedBody::Invalid(b) => {
                write!(f, "{:04X}:  .byte 0x{:02X} ; invalid opcode", self.addr, b)
            }
            DecodedBody::Truncated(op) => {
                write!(f, "{:04X}:  {} ; truncated operand", self.addr, op.mnemonic())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble_source;

    #[test]
    fn decode_simple_instructions() {
        let code = vec![
            Opcode::Push as u8,
            10,
            0,
            0,
            0,
            Opcode::Add as u8,
            Opcode::Halt as u8,
        ];
        let listing = disassemble(&code);
        assert_eq!(listing.len(), 3);
        assert_eq!(
            listing[0].body,
            DecodedBody::Instr {
                op: Opcode::Push,
                operand: Operand::Int(10)
            }
        );
        assert_eq!(listing[1].addr, 5);
        assert_eq!(listing[2].addr, 6);
    }

    #[test]
    fn decode_negative_int_operand() {
        let mut code = vec![Opcode::Push as u8];
        code.extend_from_slice(&(-7i32).to_le_bytes());
        let listing = disassemble(&code);
        assert_eq!(
            listing[0].body,
            DecodedBody::Instr {
                op: Opcode::Push,
                operand: Operand::Int(-7)
            }
        );
    }

    #[test]
    fn decode_string_operand() {
        let mut code = vec![Opcode::PrintStr as u8];
        code.extend_from_slice(b"hi\n\0");
        code.push(Opcode::Halt as u8);
        let listing = disassemble(&code);
        assert_eq!(
            listing[0].body,
            DecodedBody::Instr {
                op: Opcode::PrintStr,
                operand: Operand::Str("hi\n".to_string())
            }
        );
        // the second instruction starts right after the null terminator
        assert_eq!(listing[1].addr, 5);
    }

    #[test]
    fn invalid_opcode_is_reported_and_skipped() {
        let code = vec![0xFF, Opcode::Nop as u8];
        let listing = disassemble(&code);
        assert_eq!(listing[0].body, DecodedBody::Invalid(0xFF));
        assert_eq!(
            listing[1].body,
            DecodedBody::Instr {
                op: Opcode::Nop,
                operand: Operand::None
            }
        );
    }

    #[test]
    fn truncated_operand_ends_the_scan() {
        let code = vec![Opcode::Push as u8, 1, 2];
        let listing = disassemble(&code);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].body, DecodedBody::Truncated(Opcode::Push));
    }

    #[test]
    fn unterminated_string_is_truncated() {
        let code = vec![Opcode::PrintStr as u8, b'h', b'i'];
        let listing = disassemble(&code);
        assert_eq!(listing[0].body, DecodedBody::Truncated(Opcode::PrintStr));
    }

    #[test]
    fn listing_rendering() {
        let mut code = vec![Opcode::Push as u8];
        code.extend_from_slice(&42i32.to_le_bytes());
        code.push(Opcode::Halt as u8);
        code.push(0xEE);
        let text = disassemble_to_string(&code);
        assert_eq!(
            text,
            "0000:  PUSH 42\n0005:  HALT\n0006:  .byte 0xEE ; invalid opcode\n"
        );
    }

    #[test]
    fn string_rendering_escapes() {
        let mut code = vec![Opcode::PrintStr as u8];
        code.extend_from_slice(b"a\tb\n\0");
        let text = disassemble_to_string(&code);
        assert_eq!(text, "0000:  PRINT_STR \"a\\tb\\n\"\n");
    }

    #[test]
    fn round_trip_assembled_program() {
        let source = r#"
            PUSH 10
            PUSH 0x20
        loop:
            DUP
            JNZ loop
            STORE_LOCAL 3
            PRINT_STR "done\n"
            HALT
        "#;
        let program = assemble_source(source).unwrap();
        let listing = disassemble(program.as_bytes());

        let expected = [
            (Opcode::Push, Operand::Int(10)),
            (Opcode::Push, Operand::Int(32)),
            (Opcode::Dup, Operand::None),
            (Opcode::Jnz, Operand::Int(10)),
            (Opcode::StoreLocal, Operand::Byte(3)),
            (Opcode::PrintStr, Operand::Str("done\n".to_string())),
            (Opcode::Halt, Operand::None),
        ];
        assert_eq!(listing.len(), expected.len());
        for (entry, (op, operand)) in listing.iter().zip(expected) {
            assert_eq!(entry.body, DecodedBody::Instr { op, operand });
        }
    }
}
