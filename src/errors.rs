//! Assembly and execution error types.
//!
//! The two taxonomies are disjoint: [`AssemblyError`] covers translation
//! failures (no bytecode is produced), [`VmFault`] covers run-time faults
//! (the machine stops but its state stays inspectable).

use thiserror::Error;

/// Errors detected while translating assembly source to bytecode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Unrecognized instruction mnemonic.
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    /// Instruction requires an operand but none was given.
    #[error("`{0}` requires an operand")]
    MissingOperand(&'static str),
    /// Instruction takes no operand but one was given.
    #[error("`{mnemonic}` takes no operand, found `{token}`")]
    UnexpectedOperand {
        mnemonic: &'static str,
        token: String,
    },
    /// Operand token could not be parsed for the instruction.
    #[error("invalid operand `{token}` for `{mnemonic}`")]
    InvalidOperand {
        mnemonic: &'static str,
        token: String,
    },
    /// Missing closing quote on a string literal.
    #[error("unterminated string literal (missing closing quote)")]
    UnterminatedString,
    /// Label names may only contain alphanumerics and underscores.
    #[error("invalid label name `{0}`")]
    InvalidLabel(String),
    /// Label defined more than once.
    #[error("duplicate label `{0}`")]
    DuplicateLabel(String),
    /// Reference to a label never defined.
    #[error("undefined label `{0}`")]
    UndefinedLabel(String),
    /// Assembled program does not fit the code buffer.
    #[error("program is {size} bytes, exceeding the {capacity}-byte code buffer")]
    CapacityExceeded { size: usize, capacity: usize },
    /// Pass symmetry violation; indicates an assembler bug, not a source bug.
    #[error("pass 1 sized the program at {expected} bytes but pass 2 emitted {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    /// Source error with line and column context.
    #[error("line {line}: {message}")]
    Source {
        line: usize,
        col: usize,
        message: String,
    },
    /// File I/O failure during assembly.
    #[error("{path}: {message}")]
    Io { path: String, message: String },
}

/// Run-time fault classification.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Byte outside the opcode space fetched for execution.
    #[error("invalid opcode 0x{0:02X}")]
    InvalidOpcode(u8),
    /// Push onto a full operand stack.
    #[error("operand stack overflow")]
    StackOverflow,
    /// Pop from an empty operand stack.
    #[error("operand stack underflow")]
    StackUnderflow,
    /// CALL past the maximum call depth.
    #[error("call stack overflow")]
    CallStackOverflow,
    /// Reserved: RET with no active frame halts normally instead of faulting.
    #[error("call stack underflow")]
    CallStackUnderflow,
    /// DIV or MOD with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,
    /// Local slot index past the frame's locals array.
    #[error("local index {0} out of range")]
    LocalOutOfRange(u8),
    /// Global variable index past the global array.
    #[error("global index {0} out of range")]
    GlobalOutOfRange(u32),
    /// Jump target, call target, or operand bytes past the end of the code.
    #[error("code address {0} out of range")]
    CodeOutOfRange(usize),
}

/// A fault together with the machine registers at the time it was raised.
///
/// Returned by [`VM::run`](crate::vm::VM::run); the machine is left stopped
/// (`running == false`) but fully inspectable.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{kind} (pc={pc}, sp={sp}, fp={fp})")]
pub struct VmFault {
    /// What went wrong.
    pub kind: FaultKind,
    /// Byte address of the faulting instruction.
    pub pc: usize,
    /// Operand stack depth when the fault was raised.
    pub sp: usize,
    /// Call stack depth when the fault was raised.
    pub fp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_display_includes_registers() {
        let fault = VmFault {
            kind: FaultKind::DivisionByZero,
            pc: 10,
            sp: 0,
            fp: 1,
        };
        assert_eq!(fault.to_string(), "division by zero (pc=10, sp=0, fp=1)");
    }

    #[test]
    fn assembly_error_display() {
        let err = AssemblyError::Source {
            line: 3,
            col: 5,
            message: "unknown mnemonic `FOO`".to_string(),
        };
        assert_eq!(err.to_string(), "line 3: unknown mnemonic `FOO`");
    }

    #[test]
    fn invalid_opcode_display_is_hex() {
        assert_eq!(
            FaultKind::InvalidOpcode(0x0F).to_string(),
            "invalid opcode 0x0F"
        );
    }
}
