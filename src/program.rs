//! Immutable bytecode program buffer.

use crate::errors::AssemblyError;

/// Maximum size of an assembled program in bytes.
pub const CODE_CAPACITY: usize = 65536;

/// An assembled instruction stream.
///
/// Produced once by the assembler (or from hand-constructed bytes) and never
/// mutated afterwards; consumed sequentially by the execution engine or the
/// disassembler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    code: Vec<u8>,
}

impl Program {
    /// Wraps raw bytecode, rejecting buffers past [`CODE_CAPACITY`].
    pub fn new(code: Vec<u8>) -> Result<Self, AssemblyError> {
        if code.len() > CODE_CAPACITY {
            return Err(AssemblyError::CapacityExceeded {
                size: code.len(),
                capacity: CODE_CAPACITY,
            });
        }
        Ok(Self { code })
    }

    /// The raw instruction stream.
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    /// Program size in bytes.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}
