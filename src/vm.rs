//! Bytecode execution engine.
//!
//! A stack machine: instructions pop their inputs off the operand stack and
//! push their results back. All arithmetic uses wrapping semantics so
//! overflow can never panic; run-time errors surface as [`VmFault`] values
//! and leave the machine stopped but inspectable.

use crate::console::Console;
use crate::disassembler;
use crate::errors::{FaultKind, VmFault};
use crate::isa::Opcode;
use crate::program::Program;
use crate::vm::stack::OperandStack;

pub mod stack;

/// Local variable slots per call frame.
pub const LOCALS_PER_FRAME: usize = 16;
/// Maximum call nesting depth.
pub const CALL_STACK_CAPACITY: usize = 64;
/// Number of global variable slots.
pub const GLOBAL_CAPACITY: usize = 256;

/// One activation record of a `CALL`.
#[derive(Debug, Clone)]
struct CallFrame {
    /// Bytecode address to resume at on `RET`.
    return_addr: usize,
    /// Frame-private variable slots, zeroed on entry.
    locals: [i32; LOCALS_PER_FRAME],
    /// Operand stack depth when the frame was pushed.
    stack_base: usize,
}

/// The virtual machine.
///
/// Owns every piece of run-time state: the code buffer, program counter,
/// operand stack, call stack, and global variables. Host I/O goes through
/// the [`Console`] passed to [`run`](VM::run).
pub struct VM {
    /// Bytecode to execute.
    code: Vec<u8>,
    /// Byte address of the next instruction.
    pc: usize,
    stack: OperandStack,
    frames: Vec<CallFrame>,
    globals: Vec<i32>,
    /// Cleared by `HALT`, a bare `RET`, or any fault.
    running: bool,
    /// Instructions retired so far.
    executed: u64,
    /// When set, every instruction is written to the trace sink before it runs.
    trace: bool,
}

impl VM {
    /// Creates a machine with fresh state, ready to run `program` from
    /// address zero.
    pub fn new(program: Program) -> Self {
        Self {
            code: program.as_bytes().to_vec(),
            pc: 0,
            stack: OperandStack::new(),
            frames: Vec::new(),
            globals: vec![0; GLOBAL_CAPACITY],
            running: false,
            executed: 0,
            trace: false,
        }
    }

    /// Enables or disables instruction tracing.
    pub fn set_trace(&mut self, on: bool) {
        self.trace = on;
    }

    /// Executes until the machine halts, runs off the end of the code, or
    /// faults.
    ///
    /// On a fault the returned [`VmFault`] carries the machine registers at
    /// the faulting instruction; the machine stays inspectable but `running`
    /// is cleared and execution does not resume.
    pub fn run<C: Console>(&mut self, console: &mut C) -> Result<(), VmFault> {
        self.running = true;
        while self.running && self.pc < self.code.len() {
            let at = self.pc;
            let traced = if self.trace {
                disassembler::decode_at(&self.code, at).map(|(instr, _)| instr)
            } else {
                None
            };
            self.step(console).map_err(|kind| {
                self.running = false;
                VmFault {
                    kind,
                    pc: at,
                    sp: self.stack.depth(),
                    fp: self.frames.len(),
                }
            })?;
            self.executed += 1;
            if let Some(instr) = traced {
                console.trace(&format!("{instr}  stack={:?}", self.stack.as_slice()));
            }
        }
        self.running = false;
        Ok(())
    }

    /// The operand stack, bottom first.
    pub fn stack(&self) -> &[i32] {
        self.stack.as_slice()
    }

    /// Reads a global variable slot.
    pub fn global(&self, index: usize) -> Option<i32> {
        self.globals.get(index).copied()
    }

    /// Current program counter.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Current call nesting depth.
    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    /// Number of instructions retired so far.
    pub fn instructions_executed(&self) -> u64 {
        self.executed
    }

    /// Fetches, decodes, and executes one instruction.
    fn step<C: Console>(&mut self, console: &mut C) -> Result<(), FaultKind> {
        let byte = self.code[self.pc];
        self.pc += 1;
        let op = Opcode::try_from(byte)?;

        match op {
            Opcode::Nop => Ok(()),
            Opcode::Push => {
                let value = self.fetch_int()?;
                self.stack.push(value)
            }
            Opcode::Pop => self.stack.pop().map(|_| ()),
            Opcode::Dup => {
                let top = self.stack.peek(0)?;
                self.stack.push(top)
            }
            Opcode::Swap => {
                let b = self.stack.pop()?;
                let a = self.stack.pop()?;
                self.stack.push(b)?;
                self.stack.push(a)
            }
            Opcode::Over => {
                let second = self.stack.peek(1)?;
                self.stack.push(second)
            }

            Opcode::Add => self.op_binary(|a, b| Ok(a.wrapping_add(b))),
            Opcode::Sub => self.op_binary(|a, b| Ok(a.wrapping_sub(b))),
            Opcode::Mul => self.op_binary(|a, b| Ok(a.wrapping_mul(b))),
            Opcode::Div => self.op_binary(|a, b| {
                if b == 0 {
                    return Err(FaultKind::DivisionByZero);
                }
                Ok(a.wrapping_div(b))
            }),
            Opcode::Mod => self.op_binary(|a, b| {
                if b == 0 {
                    return Err(FaultKind::DivisionByZero);
                }
                Ok(a.wrapping_rem(b))
            }),
            Opcode::Neg => {
                let a = self.stack.pop()?;
                self.stack.push(a.wrapping_neg())
            }

            Opcode::And => self.op_binary(|a, b| Ok(a & b)),
            Opcode::Or => self.op_binary(|a, b| Ok(a | b)),
            Opcode::Xor => self.op_binary(|a, b| Ok(a ^ b)),
            Opcode::Not => {
                let a = self.stack.pop()?;
                self.stack.push(!a)
            }
            // wrapping_shl/shr mask the count to 0..32
            Opcode::Shl => self.op_binary(|a, b| Ok(a.wrapping_shl(b as u32))),
            Opcode::Shr => self.op_binary(|a, b| Ok(a.wrapping_shr(b as u32))),

            Opcode::Eq => self.op_binary(|a, b| Ok((a == b) as i32)),
            Opcode::Ne => self.op_binary(|a, b| Ok((a != b) as i32)),
            Opcode::Lt => self.op_binary(|a, b| Ok((a < b) as i32)),
            Opcode::Gt => self.op_binary(|a, b| Ok((a > b) as i32)),
            Opcode::Le => self.op_binary(|a, b| Ok((a <= b) as i32)),
            Opcode::Ge => self.op_binary(|a, b| Ok((a >= b) as i32)),

            Opcode::Jmp => {
                let target = self.fetch_addr()?;
                self.jump(target)
            }
            Opcode::Jz => {
                let target = self.fetch_addr()?;
                if self.stack.pop()? == 0 {
                    self.jump(target)?;
                }
                Ok(())
            }
            Opcode::Jnz => {
                let target = self.fetch_addr()?;
                if self.stack.pop()? != 0 {
                    self.jump(target)?;
                }
                Ok(())
            }
            Opcode::Call => self.op_call(),
            Opcode::Ret => self.op_ret(),

            Opcode::LoadLocal => {
                let slot = self.fetch_byte()?;
                self.op_load_local(slot)
            }
            Opcode::StoreLocal => {
                let slot = self.fetch_byte()?;
                self.op_store_local(slot)
            }
            Opcode::LoadGlobal => {
                let index = self.fetch_int()? as u32;
                let value = self.read_global(index)?;
                self.stack.push(value)
            }
            Opcode::StoreGlobal => {
                let index = self.fetch_int()? as u32;
                let value = self.stack.pop()?;
                self.write_global(index, value)
            }

            Opcode::Print => {
                let a = self.stack.pop()?;
                console.print(&format!("{a}\n"));
                Ok(())
            }
            Opcode::PrintChar => {
                let a = self.stack.pop()?;
                console.print(&((a as u8) as char).to_string());
                Ok(())
            }
            Opcode::PrintStr => {
                let text = self.fetch_str()?;
                console.print(&text);
                Ok(())
            }
            Opcode::Read => {
                let value = console.read_int().unwrap_or(0);
                self.stack.push(value)
            }

            Opcode::Halt => {
                self.running = false;
                Ok(())
            }
            Opcode::Debug => {
                let base = self.frames.last().map_or(0, |f| f.stack_base);
                console.trace(&format!(
                    "debug: pc={:04X} frames={} base={} stack={:?}",
                    self.pc,
                    self.frames.len(),
                    base,
                    self.stack.as_slice()
                ));
                Ok(())
            }
        }
    }

    /// Reads the 1-byte operand at the program counter.
    fn fetch_byte(&mut self) -> Result<u8, FaultKind> {
        let byte = *self
            .code
            .get(self.pc)
            .ok_or(FaultKind::CodeOutOfRange(self.pc))?;
        self.pc += 1;
        Ok(byte)
    }

    /// Reads the 4-byte little-endian operand at the program counter.
    fn fetch_int(&mut self) -> Result<i32, FaultKind> {
        let bytes = self
            .code
            .get(self.pc..self.pc + 4)
            .ok_or(FaultKind::CodeOutOfRange(self.pc))?;
        self.pc += 4;
        Ok(i32::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Reads the null-terminated string operand at the program counter.
    fn fetch_str(&mut self) -> Result<String, FaultKind> {
        let rest = &self.code[self.pc..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(FaultKind::CodeOutOfRange(self.code.len()))?;
        let text = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pc += nul + 1;
        Ok(text)
    }

    /// Reads a 4-byte operand and reinterprets it as a code address.
    fn fetch_addr(&mut self) -> Result<usize, FaultKind> {
        Ok(self.fetch_int()? as u32 as usize)
    }

    /// Sets the program counter to `target`.
    ///
    /// A target equal to the code length is a normal end of execution;
    /// anything past it faults.
    fn jump(&mut self, target: usize) -> Result<(), FaultKind> {
        if target > self.code.len() {
            return Err(FaultKind::CodeOutOfRange(target));
        }
        self.pc = target;
        Ok(())
    }

    /// Pops `b` then `a` and pushes `f(a, b)`.
    fn op_binary(&mut self, f: impl FnOnce(i32, i32) -> Result<i32, FaultKind>) -> Result<(), FaultKind> {
        let b = self.stack.pop()?;
        let a = self.stack.pop()?;
        self.stack.push(f(a, b)?)
    }

    fn op_call(&mut self) -> Result<(), FaultKind> {
        let target = self.fetch_addr()?;
        if self.frames.len() >= CALL_STACK_CAPACITY {
            return Err(FaultKind::CallStackOverflow);
        }
        if target > self.code.len() {
            return Err(FaultKind::CodeOutOfRange(target));
        }
        self.frames.push(CallFrame {
            return_addr: self.pc,
            locals: [0; LOCALS_PER_FRAME],
            stack_base: self.stack.depth(),
        });
        self.pc = target;
        Ok(())
    }

    /// `RET` with no active frame is a normal halt, not a fault.
    fn op_ret(&mut self) -> Result<(), FaultKind> {
        match self.frames.pop() {
            Some(frame) => {
                self.pc = frame.return_addr;
                Ok(())
            }
            None => {
                self.running = false;
                Ok(())
            }
        }
    }

    /// Outside any frame, local slots alias the globals at the same index.
    fn op_load_local(&mut self, slot: u8) -> Result<(), FaultKind> {
        if slot as usize >= LOCALS_PER_FRAME {
            return Err(FaultKind::LocalOutOfRange(slot));
        }
        let value = match self.frames.last() {
            Some(frame) => frame.locals[slot as usize],
            None => self.read_global(slot as u32)?,
        };
        self.stack.push(value)
    }

    fn op_store_local(&mut self, slot: u8) -> Result<(), FaultKind> {
        if slot as usize >= LOCALS_PER_FRAME {
            return Err(FaultKind::LocalOutOfRange(slot));
        }
        let value = self.stack.pop()?;
        if let Some(frame) = self.frames.last_mut() {
            frame.locals[slot as usize] = value;
            return Ok(());
        }
        self.write_global(slot as u32, value)
    }

    fn read_global(&self, index: u32) -> Result<i32, FaultKind> {
        self.globals
            .get(index as usize)
            .copied()
            .ok_or(FaultKind::GlobalOutOfRange(index))
    }

    fn write_global(&mut self, index: u32, value: i32) -> Result<(), FaultKind> {
        let slot = self
            .globals
            .get_mut(index as usize)
            .ok_or(FaultKind::GlobalOutOfRange(index))?;
        *slot = value;
        Ok(())
    }
}
