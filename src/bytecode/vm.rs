//! Reference stack machine for module instruction streams.
//!
//! The VM keeps an operand stack of [`STACK_CAPACITY`] unsigned 64-bit words.
//! `PUSH` stores the two's-complement bit pattern of its operand, so
//! `PUSH -1` and `PUSH 5 B_NOT` both leave large unsigned values behind.
//! Arithmetic wraps. Division, remainder and comparisons read the words as
//! signed. Jump operands are absolute byte offsets into the instruction stream.

use crate::bytecode::errors::VMError;
use crate::bytecode::isa::{OPERAND_WIDTH, Opcode, Operand};
use crate::bytecode::program::LoadedModule;
use crate::types::encoding::Decode;
use std::io::Write;

/// Maximum number of words on the operand stack.
pub const STACK_CAPACITY: usize = 256;

/// Bounded operand stack.
struct Stack {
    words: Vec<u64>,
}

impl Stack {
    fn new() -> Self {
        Self {
            words: Vec::with_capacity(STACK_CAPACITY),
        }
    }

    fn push(&mut self, value: u64, offset: usize) -> Result<(), VMError> {
        if self.words.len() == STACK_CAPACITY {
            return Err(VMError::StackOverflow {
                offset,
                capacity: STACK_CAPACITY,
            });
        }
        self.words.push(value);
        Ok(())
    }

    fn pop(&mut self, instr: &'static str, offset: usize) -> Result<u64, VMError> {
        self.words
            .pop()
            .ok_or(VMError::StackUnderflow { instr, offset })
    }

    /// Checks that at least `n` words are present without removing any.
    fn require(&self, n: usize, instr: &'static str, offset: usize) -> Result<(), VMError> {
        if self.words.len() < n {
            return Err(VMError::StackUnderflow { instr, offset });
        }
        Ok(())
    }
}

macro_rules! exec_vm {
    (
        vm = $vm:ident,
        out = $out:ident,
        opcode = $opcode:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $opcode {
            $(
                Opcode::$variant => {
                    let instr_name = $opcode.mnemonic();
                    exec_vm!(@call $vm, $out, instr_name, $handler, $args)
                }
            ),*
        }
    }};

    // Handler that writes program output
    (@call $vm:ident, $out:ident, $instr_name:expr, $handler:ident, (out;)) => {{
        $vm.$handler($instr_name, $out)
    }};

    // Handler taking decoded operands
    (@call $vm:ident, $out:ident, $instr_name:expr, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $vm, $kind)?; )*
        $vm.$handler($instr_name, $( $field ),*)
    }};

    // Decode an operand (little-endian, OPERAND_WIDTH bytes)
    (@read $vm:ident, Operand) => {{
        $vm.read_operand()
    }};
}

/// Executes one instruction stream.
///
/// Output from `PRINT` and `PRINT_INT` goes to the writer passed to [`VM::run`],
/// so tests can capture it in a `Vec<u8>`.
pub struct VM {
    /// Instruction stream, without the module header.
    code: Vec<u8>,
    /// Offset of the next byte to read.
    ip: usize,
    /// Offset of the instruction being executed, for error reports.
    instr_offset: usize,
    stack: Stack,
    halted: bool,
}

impl VM {
    /// Creates a VM positioned at the start of `code`.
    pub fn new(code: Vec<u8>) -> Self {
        Self {
            code,
            ip: 0,
            instr_offset: 0,
            stack: Stack::new(),
            halted: false,
        }
    }

    /// Creates a VM for a module that already passed the version check.
    pub fn from_module(loaded: LoadedModule) -> Self {
        Self::new(loaded.module.code)
    }

    /// Current stack contents, bottom first.
    pub fn stack(&self) -> &[u64] {
        &self.stack.words
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Runs until `HALT`, the end of the stream or a fault.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<(), VMError> {
        while !self.halted && self.ip < self.code.len() {
            self.instr_offset = self.ip;
            let byte = self.code[self.ip];
            self.ip += 1;
            let opcode = Opcode::from_code(byte).ok_or(VMError::InvalidInstruction {
                opcode: byte,
                offset: self.instr_offset,
            })?;
            self.exec(opcode, out)?;
        }
        out.flush().map_err(|e| VMError::OutputError {
            source: e.to_string(),
        })
    }

    /// Reads the operand that follows the current opcode byte.
    fn read_operand(&mut self) -> Result<Operand, VMError> {
        let mut input = self.code.get(self.ip..).unwrap_or_default();
        let available = input.len();
        let value = Operand::decode(&mut input).map_err(|_| VMError::UnexpectedEndOfBytecode {
            ip: self.ip,
            requested: OPERAND_WIDTH,
            available,
        })?;
        self.ip += OPERAND_WIDTH;
        Ok(value)
    }

    fn exec<W: Write>(&mut self, opcode: Opcode, out: &mut W) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            out = out,
            opcode = opcode,
            {
                // Stack manipulation
                Push => op_push(value: Operand),
                Pop => op_pop(),
                Dup => op_dup(),
                Swap => op_swap(),
                Rot => op_rot(),
                // Arithmetic
                Add => op_add(),
                Sub => op_sub(),
                Div => op_div(),
                Mult => op_mult(),
                Mod => op_mod(),
                Pow => op_pow(),
                // Comparison
                Eq => op_eq(),
                Neq => op_neq(),
                Lt => op_lt(),
                Lte => op_lte(),
                Gt => op_gt(),
                Gte => op_gte(),
                // Logical / bitwise
                LAnd => op_l_and(),
                LOr => op_l_or(),
                LXor => op_l_xor(),
                LNot => op_l_not(),
                BAnd => op_b_and(),
                BOr => op_b_or(),
                BXor => op_b_xor(),
                BNot => op_b_not(),
                Shl => op_shl(),
                Shr => op_shr(),
                // Control flow
                Jmp => op_jmp(target: Operand),
                JmpIfTrue => op_jmp_if_true(target: Operand),
                JmpIfFalse => op_jmp_if_false(target: Operand),
                // I/O
                Print => op_print(out;),
                PrintInt => op_print_int(out;),
                Halt => op_halt(),
            }
        }
    }

    fn push(&mut self, value: u64) -> Result<(), VMError> {
        self.stack.push(value, self.instr_offset)
    }

    fn pop(&mut self, instr: &'static str) -> Result<u64, VMError> {
        self.stack.pop(instr, self.instr_offset)
    }

    /// Pops `rhs` then `lhs` and pushes `f(lhs, rhs)`.
    fn binary(
        &mut self,
        instr: &'static str,
        f: impl FnOnce(u64, u64) -> u64,
    ) -> Result<(), VMError> {
        self.stack.require(2, instr, self.instr_offset)?;
        let rhs = self.pop(instr)?;
        let lhs = self.pop(instr)?;
        self.push(f(lhs, rhs))
    }

    fn unary(&mut self, instr: &'static str, f: impl FnOnce(u64) -> u64) -> Result<(), VMError> {
        let value = self.pop(instr)?;
        self.push(f(value))
    }

    fn jump_to(&mut self, target: Operand) -> Result<(), VMError> {
        let dest = usize::try_from(target)
            .ok()
            .filter(|&dest| dest <= self.code.len())
            .ok_or(VMError::InvalidJump {
                target,
                offset: self.instr_offset,
            })?;
        self.ip = dest;
        Ok(())
    }

    fn op_push(&mut self, _instr: &'static str, value: Operand) -> Result<(), VMError> {
        self.push(value as u64)
    }

    fn op_pop(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.pop(instr).map(|_| ())
    }

    fn op_dup(&mut self, instr: &'static str) -> Result<(), VMError> {
        let top = *self
            .stack
            .words
            .last()
            .ok_or(VMError::StackUnderflow {
                instr,
                offset: self.instr_offset,
            })?;
        self.push(top)
    }

    fn op_swap(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.stack.require(2, instr, self.instr_offset)?;
        let len = self.stack.words.len();
        self.stack.words.swap(len - 1, len - 2);
        Ok(())
    }

    // a b c -- b c a
    fn op_rot(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.stack.require(3, instr, self.instr_offset)?;
        let len = self.stack.words.len();
        self.stack.words[len - 3..].rotate_left(1);
        Ok(())
    }

    fn op_add(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, u64::wrapping_add)
    }

    fn op_sub(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, u64::wrapping_sub)
    }

    fn op_mult(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, u64::wrapping_mul)
    }

    fn op_div(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.checked_signed(instr, i64::wrapping_div)
    }

    fn op_mod(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.checked_signed(instr, i64::wrapping_rem)
    }

    /// Signed division-like operation that traps on a zero divisor.
    fn checked_signed(
        &mut self,
        instr: &'static str,
        f: impl FnOnce(i64, i64) -> i64,
    ) -> Result<(), VMError> {
        self.stack.require(2, instr, self.instr_offset)?;
        let rhs = self.pop(instr)? as i64;
        let lhs = self.pop(instr)? as i64;
        if rhs == 0 {
            return Err(VMError::DivisionByZero {
                instr,
                offset: self.instr_offset,
            });
        }
        self.push(f(lhs, rhs) as u64)
    }

    fn op_pow(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.stack.require(2, instr, self.instr_offset)?;
        let exponent = self.pop(instr)? as i64;
        let base = self.pop(instr)? as i64;
        let exp = u32::try_from(exponent).map_err(|_| VMError::InvalidExponent {
            exponent,
            offset: self.instr_offset,
        })?;
        self.push(base.wrapping_pow(exp) as u64)
    }

    fn op_eq(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| u64::from(a == b))
    }

    fn op_neq(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| u64::from(a != b))
    }

    fn op_lt(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| u64::from((a as i64) < (b as i64)))
    }

    fn op_lte(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| u64::from(a as i64 <= b as i64))
    }

    fn op_gt(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| u64::from(a as i64 > b as i64))
    }

    fn op_gte(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| u64::from(a as i64 >= b as i64))
    }

    fn op_l_and(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| u64::from(a != 0 && b != 0))
    }

    fn op_l_or(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| u64::from(a != 0 || b != 0))
    }

    fn op_l_xor(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| u64::from((a != 0) != (b != 0)))
    }

    fn op_l_not(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, |a| u64::from(a == 0))
    }

    fn op_b_and(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| a & b)
    }

    fn op_b_or(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| a | b)
    }

    fn op_b_xor(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| a ^ b)
    }

    fn op_b_not(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, |a| !a)
    }

    fn op_shl(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| a << (b % 64))
    }

    fn op_shr(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |a, b| a >> (b % 64))
    }

    fn op_jmp(&mut self, _instr: &'static str, target: Operand) -> Result<(), VMError> {
        self.jump_to(target)
    }

    fn op_jmp_if_true(&mut self, instr: &'static str, target: Operand) -> Result<(), VMError> {
        if self.pop(instr)? != 0 {
            self.jump_to(target)?;
        }
        Ok(())
    }

    fn op_jmp_if_false(&mut self, instr: &'static str, target: Operand) -> Result<(), VMError> {
        if self.pop(instr)? == 0 {
            self.jump_to(target)?;
        }
        Ok(())
    }

    fn op_print<W: Write>(&mut self, instr: &'static str, out: &mut W) -> Result<(), VMError> {
        let value = self.pop(instr)?;
        out.write_all(&[value as u8])
            .map_err(|e| VMError::OutputError {
                source: e.to_string(),
            })
    }

    fn op_print_int<W: Write>(&mut self, instr: &'static str, out: &mut W) -> Result<(), VMError> {
        let value = self.pop(instr)?;
        writeln!(out, "{value}").map_err(|e| VMError::OutputError {
            source: e.to_string(),
        })
    }

    fn op_halt(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.halted = true;
        Ok(())
    }
}
