//! Bytecode toolchain for the stack virtual machine.
//!
//! Source text is assembled into an instruction stream, wrapped in a versioned
//! module, and read back either by the disassembler or by the reference VM.
//!
//! # Module layout
//!
//! - 10-byte header: version major, minor, patch (`u16` each) and program size
//!   (`u32`), all little-endian
//! - Instruction stream: one opcode byte, followed by an 8-byte operand for
//!   `PUSH` and the jump family
//!
//! # Modules
//!
//! - [`assembler`]: Tokenizer, encoder and assembly diagnostics
//! - [`disassembler`]: Instruction-stream decoder and text rendering
//! - [`errors`]: Assembly, module and execution error types
//! - [`isa`]: The opcode table shared by every other module
//! - [`program`]: Module header, writer and reader
//! - [`version`]: Format version and compatibility rules
//! - [`vm`]: Reference stack machine

pub mod assembler;
pub mod disassembler;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod program;
pub mod version;
pub mod vm;
