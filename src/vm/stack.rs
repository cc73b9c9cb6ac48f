//! Fixed-capacity operand stack.

use crate::errors::FaultKind;

/// Maximum operand stack depth.
pub const STACK_CAPACITY: usize = 256;

/// LIFO stack of 32-bit integers, the machine's working storage.
///
/// Capacity is fixed at [`STACK_CAPACITY`]; pushing past it or popping an
/// empty stack raises a fault instead of growing or panicking.
#[derive(Debug, Clone)]
pub struct OperandStack {
    values: Vec<i32>,
}

impl OperandStack {
    pub fn new() -> Self {
        Self {
            values: Vec::with_capacity(STACK_CAPACITY),
        }
    }

    /// Pushes a value, faulting with [`FaultKind::StackOverflow`] when full.
    pub fn push(&mut self, value: i32) -> Result<(), FaultKind> {
        if self.values.len() >= STACK_CAPACITY {
            return Err(FaultKind::StackOverflow);
        }
        self.values.push(value);
        Ok(())
    }

    /// Pops the top value, faulting with [`FaultKind::StackUnderflow`] when empty.
    pub fn pop(&mut self) -> Result<i32, FaultKind> {
        self.values.pop().ok_or(FaultKind::StackUnderflow)
    }

    /// Reads the value `depth` slots below the top without popping
    /// (`depth == 0` is the top itself).
    pub fn peek(&self, depth: usize) -> Result<i32, FaultKind> {
        let len = self.values.len();
        if depth >= len {
            return Err(FaultKind::StackUnderflow);
        }
        Ok(self.values[len - 1 - depth])
    }

    /// Current number of values on the stack.
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    /// The stack contents, bottom first.
    pub fn as_slice(&self) -> &[i32] {
        &self.values
    }
}

impl Default for OperandStack {
    fn default() -> Self {
        Self::new()
    }
}
