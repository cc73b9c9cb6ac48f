//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the VM's opcode table. The [`for_each_opcode!`](crate::for_each_opcode)
//! macro holds the canonical opcode definitions and invokes a callback macro
//! for code generation, so several modules can generate opcode-related code
//! without duplicating the table.
//!
//! This module generates:
//! - The [`Opcode`] enum with byte values
//! - `TryFrom<u8>` for decoding opcode bytes
//! - Mnemonic and operand-kind lookups
//!
//! # Bytecode Format
//!
//! Each instruction is one opcode byte followed by its operand:
//! - `None`: no operand bytes
//! - `Byte`: 1 byte (local slot index)
//! - `Int`: 4 bytes (little-endian, 32-bit signed; jump targets are
//!   absolute byte addresses)
//! - `Str`: raw bytes terminated by a zero byte; the payload itself may not
//!   contain a zero byte

use crate::errors::FaultKind;

/// Invokes a callback macro with the complete opcode definition list.
///
/// This macro enables code generation for opcodes in multiple modules
/// without duplicating the opcode definitions.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Stack manipulation
            // =========================
            /// NOP ; do nothing
            Nop = 0x00, "NOP" => None,
            /// PUSH imm ; push a 32-bit immediate
            Push = 0x01, "PUSH" => Int,
            /// POP ; discard the top of the stack
            Pop = 0x02, "POP" => None,
            /// DUP ; duplicate the top of the stack
            Dup = 0x03, "DUP" => None,
            /// SWAP ; exchange the two topmost values
            Swap = 0x04, "SWAP" => None,
            /// OVER ; copy the second value onto the top
            Over = 0x05, "OVER" => None,
            // =========================
            // Arithmetic
            // =========================
            /// ADD ; pop b, a; push a + b (wrapping)
            Add = 0x10, "ADD" => None,
            /// SUB ; pop b, a; push a - b (wrapping)
            Sub = 0x11, "SUB" => None,
            /// MUL ; pop b, a; push a * b (wrapping)
            Mul = 0x12, "MUL" => None,
            /// DIV ; pop b, a; push a / b (fault on zero divisor)
            Div = 0x13, "DIV" => None,
            /// MOD ; pop b, a; push a % b (fault on zero divisor)
            Mod = 0x14, "MOD" => None,
            /// NEG ; pop a; push -a (wrapping)
            Neg = 0x15, "NEG" => None,
            // =========================
            // Bitwise
            // =========================
            /// AND ; pop b, a; push a & b
            And = 0x18, "AND" => None,
            /// OR ; pop b, a; push a | b
            Or = 0x19, "OR" => None,
            /// XOR ; pop b, a; push a ^ b
            Xor = 0x1A, "XOR" => None,
            /// NOT ; pop a; push !a (bitwise complement)
            Not = 0x1B, "NOT" => None,
            /// SHL ; pop b, a; push a << (b mod 32)
            Shl = 0x1C, "SHL" => None,
            /// SHR ; pop b, a; push a >> (b mod 32), arithmetic shift
            Shr = 0x1D, "SHR" => None,
            // =========================
            // Comparison (push 1 for true, 0 for false)
            // =========================
            /// EQ ; pop b, a; push a == b
            Eq = 0x20, "EQ" => None,
            /// NE ; pop b, a; push a != b
            Ne = 0x21, "NE" => None,
            /// LT ; pop b, a; push a < b (signed)
            Lt = 0x22, "LT" => None,
            /// GT ; pop b, a; push a > b (signed)
            Gt = 0x23, "GT" => None,
            /// LE ; pop b, a; push a <= b (signed)
            Le = 0x24, "LE" => None,
            /// GE ; pop b, a; push a >= b (signed)
            Ge = 0x25, "GE" => None,
            // =========================
            // Control flow
            // =========================
            /// JMP addr ; set the program counter to addr
            Jmp = 0x30, "JMP" => Int,
            /// JZ addr ; pop a; jump to addr if a == 0
            Jz = 0x31, "JZ" => Int,
            /// JNZ addr ; pop a; jump to addr if a != 0
            Jnz = 0x32, "JNZ" => Int,
            /// CALL addr ; push a call frame and jump to addr
            Call = 0x33, "CALL" => Int,
            /// RET ; pop the call frame and resume at its return address;
            /// with no active frame this is a normal halt
            Ret = 0x34, "RET" => None,
            // =========================
            // Variable access
            // =========================
            /// LOAD_LOCAL slot ; push the current frame's local
            LoadLocal = 0x40, "LOAD_LOCAL" => Byte,
            /// STORE_LOCAL slot ; pop into the current frame's local
            StoreLocal = 0x41, "STORE_LOCAL" => Byte,
            /// LOAD_GLOBAL index ; push the global variable
            LoadGlobal = 0x42, "LOAD_GLOBAL" => Int,
            /// STORE_GLOBAL index ; pop into the global variable
            StoreGlobal = 0x43, "STORE_GLOBAL" => Int,
            // =========================
            // I/O
            // =========================
            /// PRINT ; pop a; write it to the output sink with a newline
            Print = 0x50, "PRINT" => None,
            /// PRINT_CHAR ; pop a; write its low byte as a character
            PrintChar = 0x51, "PRINT_CHAR" => None,
            /// PRINT_STR "text" ; write the inline string operand
            PrintStr = 0x52, "PRINT_STR" => Str,
            /// READ ; read one integer from the input source (0 on failure)
            Read = 0x53, "READ" => None,
            // =========================
            // Control
            // =========================
            /// HALT ; stop the machine
            Halt = 0x60, "HALT" => None,
            /// DEBUG ; dump the operand stack to the trace sink
            Debug = 0x61, "DEBUG" => None,
        }
    };
}

/// Operand encoding attached to an opcode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// No operand bytes.
    None,
    /// One unsigned byte.
    Byte,
    /// Four bytes, little-endian, 32-bit signed.
    Int,
    /// Raw bytes terminated by a zero byte.
    Str,
}

impl OperandKind {
    /// Encoded operand size in bytes, or `None` for variable-length strings.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            OperandKind::None => Some(0),
            OperandKind::Byte => Some(1),
            OperandKind::Int => Some(4),
            OperandKind::Str => None,
        }
    }
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $byte:expr, $mnemonic:literal => $kind:ident
        ),* $(,)?
    ) => {
        /// One byte of the instruction stream's opcode space.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $byte,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = FaultKind;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $byte => Ok(Opcode::$name), )*
                    _ => Err(FaultKind::InvalidOpcode(value)),
                }
            }
        }

        impl Opcode {
            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the operand encoding this opcode expects.
            pub const fn operand_kind(self) -> $crate::isa::OperandKind {
                match self {
                    $( Opcode::$name => $crate::isa::OperandKind::$kind, )*
                }
            }

            /// Looks up an opcode by its assembly mnemonic (case-sensitive).
            pub fn from_mnemonic(name: &str) -> Option<Opcode> {
                match name {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);
