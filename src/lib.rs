//! Stack-based bytecode virtual machine.
//!
//! Provides an execution engine, a two-pass assembler, and a disassembler
//! for a small stack-oriented instruction set.

pub mod assembler;
pub mod console;
pub mod disassembler;
pub mod errors;
pub mod isa;
pub mod program;
pub mod utils;
pub mod vm;
