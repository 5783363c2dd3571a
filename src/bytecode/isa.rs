//! Instruction set definition.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! one canonical opcode table and hands it to a callback macro, so every
//! consumer (assembler, disassembler, runtime, the fingerprint test) is
//! generated from the same list instead of keeping its own copy.
//!
//! # Bytecode Format
//!
//! - Opcode: 1 byte
//! - Operand: [`OPERAND_WIDTH`] bytes, signed, little-endian two's complement.
//!   Only `PUSH` and the three jump forms carry one.
//!
//! Jump operands are absolute byte offsets into the instruction stream (the
//! module header is not counted), not instruction indices.

use crate::types::encoding::{Encode, EncodeSink};
use std::fmt;

/// Value carried by operand-bearing instructions.
pub type Operand = i64;

/// Width in bytes of every operand field.
pub const OPERAND_WIDTH: usize = std::mem::size_of::<Operand>();

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Stack manipulation
            // =========================
            /// PUSH value ; push a literal
            Push = 0x01, "PUSH" => [value: Operand],
            /// POP ; discard the top value
            Pop = 0x02, "POP" => [],
            /// DUP ; a -- a a
            Dup = 0x03, "DUP" => [],
            /// SWAP ; a b -- b a
            Swap = 0x04, "SWAP" => [],
            /// ROT ; a b c -- b c a
            Rot = 0x05, "ROT" => [],
            // =========================
            // Arithmetic
            // =========================
            /// ADD ; a b -- a+b
            Add = 0x10, "ADD" => [],
            /// SUB ; a b -- a-b
            Sub = 0x11, "SUB" => [],
            /// DIV ; a b -- a/b (traps on zero)
            Div = 0x12, "DIV" => [],
            /// MULT ; a b -- a*b
            Mult = 0x13, "MULT" => [],
            /// MOD ; a b -- a%b (traps on zero)
            Mod = 0x14, "MOD" => [],
            /// POW ; a b -- a^b
            Pow = 0x15, "POW" => [],
            // =========================
            // Comparison
            // =========================
            /// EQ ; a b -- (a == b)
            Eq = 0x20, "EQ" => [],
            /// NEQ ; a b -- (a != b)
            Neq = 0x21, "NEQ" => [],
            /// LT ; a b -- (a < b)
            Lt = 0x22, "LT" => [],
            /// LTE ; a b -- (a <= b)
            Lte = 0x23, "LTE" => [],
            /// GT ; a b -- (a > b)
            Gt = 0x24, "GT" => [],
            /// GTE ; a b -- (a >= b)
            Gte = 0x25, "GTE" => [],
            // =========================
            // Logical / bitwise
            // =========================
            /// L_AND ; a b -- (a && b)
            LAnd = 0x30, "L_AND" => [],
            /// L_OR ; a b -- (a || b)
            LOr = 0x31, "L_OR" => [],
            /// L_XOR ; a b -- (a != 0) ^ (b != 0)
            LXor = 0x32, "L_XOR" => [],
            /// L_NOT ; a -- !a
            LNot = 0x33, "L_NOT" => [],
            /// B_AND ; a b -- a & b
            BAnd = 0x34, "B_AND" => [],
            /// B_OR ; a b -- a | b
            BOr = 0x35, "B_OR" => [],
            /// B_XOR ; a b -- a ^ b
            BXor = 0x36, "B_XOR" => [],
            /// B_NOT ; a -- ~a
            BNot = 0x37, "B_NOT" => [],
            /// SHL ; a b -- a << b
            Shl = 0x38, "SHL" => [],
            /// SHR ; a b -- a >> b (logical)
            Shr = 0x39, "SHR" => [],
            // =========================
            // Control flow
            // =========================
            /// JMP target ; pc = target
            Jmp = 0xE0, "JMP" => [target: Operand],
            /// JMP_IF_TRUE target ; c -- ; if c != 0 then pc = target
            JmpIfTrue = 0xE1, "JMP_IF_TRUE" => [target: Operand],
            /// JMP_IF_FALSE target ; c -- ; if c == 0 then pc = target
            JmpIfFalse = 0xE2, "JMP_IF_FALSE" => [target: Operand],
            // =========================
            // I/O
            // =========================
            /// PRINT ; a -- ; write the low byte of a
            Print = 0xF0, "PRINT" => [],
            /// PRINT_INT ; a -- ; write a as an unsigned decimal line
            PrintInt = 0xF1, "PRINT_INT" => [],
            /// HALT ; stop execution
            Halt = 0xFF, "HALT" => [],
        }
    };
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $code:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// One VM instruction kind.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $code,
            )*
        }

        impl Opcode {
            /// Every opcode, in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Returns the numeric code written to the instruction stream.
            pub const fn code(self) -> u8 {
                self as u8
            }

            /// Looks up an opcode by its numeric code.
            pub const fn from_code(code: u8) -> Option<Opcode> {
                match code {
                    $( $code => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Looks up an opcode by its exact, case-sensitive mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Opcode> {
                match name {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Number of operand bytes that follow the opcode byte.
            pub const fn operand_width(self) -> usize {
                match self {
                    $( Opcode::$name => 0usize $( + define_opcodes!(@width $kind) )*, )*
                }
            }
        }
    };

    (@width Operand) => { OPERAND_WIDTH };
}

for_each_instruction!(define_opcodes);

impl Opcode {
    /// True exactly for `PUSH` and the jump family.
    pub const fn has_operand(self) -> bool {
        self.operand_width() != 0
    }

    /// Total encoded size of one instruction with this opcode.
    pub const fn encoded_len(self) -> usize {
        1 + self.operand_width()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Checks that codes and mnemonics are pairwise distinct and that code lookup
/// inverts [`Opcode::code`] for every entry.
const fn table_is_bijective(table: &[Opcode]) -> bool {
    let mut i = 0;
    while i < table.len() {
        match Opcode::from_code(table[i].code()) {
            Some(op) if op as u8 == table[i] as u8 => {}
            _ => return false,
        }
        let mut j = i + 1;
        while j < table.len() {
            if table[i] as u8 == table[j] as u8
                || str_eq(table[i].mnemonic(), table[j].mnemonic())
            {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    table_is_bijective(Opcode::ALL),
    "opcode table must map codes and mnemonics one-to-one"
);

/// An opcode plus its operand, if the opcode carries one.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    opcode: Opcode,
    operand: Option<Operand>,
}

impl Instruction {
    /// Builds an instruction, returning `None` if the operand presence does not
    /// match [`Opcode::has_operand`].
    pub fn new(opcode: Opcode, operand: Option<Operand>) -> Option<Instruction> {
        (opcode.has_operand() == operand.is_some()).then_some(Instruction { opcode, operand })
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn operand(&self) -> Option<Operand> {
        self.operand
    }
}

impl Encode for Instruction {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.opcode.code().encode(out);
        if let Some(value) = self.operand {
            value.encode(out);
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Some(value) => write!(f, "{} {}", self.opcode, value),
            None => write!(f, "{}", self.opcode),
        }
    }
}
