//! Stack VM toolchain library.
//!
//! Provides the module format, an assembler and disassembler, and a reference
//! virtual machine.

pub mod bytecode;
pub mod types;
pub mod utils;
