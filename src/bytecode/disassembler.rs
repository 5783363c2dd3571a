//! Module decoder and text renderer.
//!
//! Decoding never fails on the instruction stream itself: a byte that is not an
//! opcode becomes [`Decoded::Unknown`] and decoding resumes at the next byte, and
//! an operand cut short by the end of the stream becomes [`Decoded::Truncated`]
//! and ends the walk. Only the header (length and version) can make a
//! disassembly fail, and then no instruction lines are produced at all.

use crate::bytecode::errors::VMError;
use crate::bytecode::isa::{Instruction, OPERAND_WIDTH, Opcode, Operand};
use crate::bytecode::program::{Header, ModuleReader};
use crate::bytecode::version::{Compatibility, VersionPolicy};
use crate::types::encoding::Decode;
use std::fmt;
use std::path::Path;

/// What was found at one position of the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Instruction(Instruction),
    /// Byte with no entry in the opcode table.
    Unknown(u8),
    /// Operand-bearing opcode with fewer than [`OPERAND_WIDTH`] bytes left.
    Truncated { opcode: Opcode, available: usize },
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Instruction(instr) => write!(f, "{instr}"),
            Decoded::Unknown(byte) => write!(f, "Unknown opcode: 0x{byte:02X}"),
            Decoded::Truncated { opcode, available } => write!(
                f,
                "{opcode} <truncated operand: {available} of {OPERAND_WIDTH} bytes>"
            ),
        }
    }
}

/// A decoded item and the stream offset of its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedItem {
    pub offset: usize,
    pub kind: Decoded,
}

/// Walks an instruction stream to its end.
pub fn decode_stream(code: &[u8]) -> Vec<DecodedItem> {
    let mut items = Vec::new();
    let mut input = code;

    while let Some((&byte, rest)) = input.split_first() {
        let offset = code.len() - input.len();
        input = rest;

        let Some(opcode) = Opcode::from_code(byte) else {
            items.push(DecodedItem {
                offset,
                kind: Decoded::Unknown(byte),
            });
            continue;
        };

        let operand = if opcode.has_operand() {
            match Operand::decode(&mut input) {
                Ok(value) => Some(value),
                Err(_) => {
                    items.push(DecodedItem {
                        offset,
                        kind: Decoded::Truncated {
                            opcode,
                            available: input.len(),
                        },
                    });
                    break;
                }
            }
        } else {
            None
        };

        items.extend(Instruction::new(opcode, operand).map(|instr| DecodedItem {
            offset,
            kind: Decoded::Instruction(instr),
        }));
    }

    items
}

/// Result of disassembling a whole module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    pub header: Header,
    pub compatibility: Compatibility,
    pub items: Vec<DecodedItem>,
    /// Declared program size disagrees with the bytes after the header.
    pub size_mismatch: bool,
}

impl Disassembly {
    /// Successfully decoded instructions, skipping unknown and truncated items.
    pub fn instructions(&self) -> impl Iterator<Item = Instruction> + '_ {
        self.items.iter().filter_map(|item| match item.kind {
            Decoded::Instruction(instr) => Some(instr),
            _ => None,
        })
    }

    /// True if any byte failed to decode as an instruction.
    pub fn has_errors(&self) -> bool {
        self.items
            .iter()
            .any(|item| !matches!(item.kind, Decoded::Instruction(_)))
    }

    /// Summary lines followed by one line per decoded item.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.items.len() + 3);
        out.push(format!("Version: {}", self.header.version));
        out.push(format!("Program size: {}", self.header.program_size));
        out.push("Disassembled Instructions:".to_string());
        out.extend(self.items.iter().map(|item| item.kind.to_string()));
        out
    }
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

/// Disassembles modules under a fixed [`VersionPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Disassembler {
    reader: ModuleReader,
}

impl Disassembler {
    pub const fn new(policy: VersionPolicy) -> Self {
        Self {
            reader: ModuleReader::new(policy),
        }
    }

    pub fn disassemble(&self, bytes: &[u8]) -> Result<Disassembly, VMError> {
        let loaded = self.reader.read_bytes(bytes)?;
        Ok(Disassembly {
            header: loaded.module.header,
            compatibility: loaded.compatibility,
            size_mismatch: !loaded.module.size_matches(),
            items: decode_stream(&loaded.module.code),
        })
    }

    pub fn disassemble_file<P: AsRef<Path>>(&self, path: P) -> Result<Disassembly, VMError> {
        let loaded = self.reader.read_file(path)?;
        Ok(Disassembly {
            header: loaded.module.header,
            compatibility: loaded.compatibility,
            size_mismatch: !loaded.module.size_matches(),
            items: decode_stream(&loaded.module.code),
        })
    }
}

/// Disassembles `bytes` with the given policy.
pub fn disassemble(bytes: &[u8], policy: VersionPolicy) -> Result<Disassembly, VMError> {
    Disassembler::new(policy).disassemble(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::assembler::assemble_source;
    use crate::bytecode::program::ModuleWriter;
    use crate::bytecode::version::{CURRENT_VERSION, Version};

    fn module(source: &str) -> Vec<u8> {
        let code = assemble_source(source).expect("assembly failed");
        ModuleWriter::new(CURRENT_VERSION)
            .to_bytes(&code)
            .expect("module too large")
    }

    fn instruction_lines(source: &str) -> Vec<String> {
        let dis = disassemble(&module(source), VersionPolicy::default()).unwrap();
        dis.lines().split_off(3)
    }

    #[test]
    fn division_program() {
        assert_eq!(
            instruction_lines("PUSH 10\nPUSH 2\nDIV\nPRINT_INT\nHALT"),
            vec!["PUSH 10", "PUSH 2", "DIV", "PRINT_INT", "HALT"]
        );
    }

    #[test]
    fn rotate_program() {
        assert_eq!(
            instruction_lines(
                "PUSH 1\nPUSH 2\nPUSH 3\nROT\nPRINT_INT\nPRINT_INT\nPRINT_INT\nHALT"
            ),
            vec![
                "PUSH 1",
                "PUSH 2",
                "PUSH 3",
                "ROT",
                "PRINT_INT",
                "PRINT_INT",
                "PRINT_INT",
                "HALT"
            ]
        );
    }

    #[test]
    fn summary_lines() {
        let dis = disassemble(&module("HALT"), VersionPolicy::default()).unwrap();
        let lines = dis.lines();
        assert_eq!(lines[0], "Version: 0.0.1");
        assert_eq!(lines[1], "Program size: 1");
        assert_eq!(lines[2], "Disassembled Instructions:");
        assert_eq!(lines[3], "HALT");
        assert_eq!(
            dis.to_string(),
            "Version: 0.0.1\nProgram size: 1\nDisassembled Instructions:\nHALT"
        );
    }

    #[test]
    fn round_trip_preserves_every_instruction() {
        let source = "PUSH 0\nPUSH -1\nPUSH 9223372036854775807\nPUSH -9223372036854775808\n\
                      POP DUP SWAP ROT ADD SUB DIV MULT MOD POW\n\
                      EQ NEQ LT LTE GT GTE L_AND L_OR L_XOR L_NOT\n\
                      B_AND B_OR B_XOR B_NOT SHL SHR\n\
                      JMP 0 JMP_IF_TRUE 27 JMP_IF_FALSE 36 PRINT PRINT_INT HALT";
        let expected: Vec<String> = source
            .split_whitespace()
            .fold(Vec::<String>::new(), |mut acc, tok| {
                if tok.parse::<i64>().is_ok() {
                    if let Some(last) = acc.last_mut() {
                        last.push(' ');
                        last.push_str(tok);
                    }
                } else {
                    acc.push(tok.to_string());
                }
                acc
            });
        assert_eq!(instruction_lines(source), expected);
    }

    #[test]
    fn offsets_follow_encoded_lengths() {
        let dis = disassemble(&module("PUSH 1\nPOP\nJMP 0\nHALT"), VersionPolicy::default())
            .unwrap();
        let offsets: Vec<usize> = dis.items.iter().map(|item| item.offset).collect();
        assert_eq!(offsets, vec![0, 9, 10, 19]);
    }

    #[test]
    fn unknown_byte_is_skipped_one_at_a_time() {
        let items = decode_stream(&[0x0A, 0x0B, 0xFF]);
        assert_eq!(
            items,
            vec![
                DecodedItem {
                    offset: 0,
                    kind: Decoded::Unknown(0x0A)
                },
                DecodedItem {
                    offset: 1,
                    kind: Decoded::Unknown(0x0B)
                },
                DecodedItem {
                    offset: 2,
                    kind: Decoded::Instruction(Instruction::new(Opcode::Halt, None).unwrap())
                },
            ]
        );
        assert_eq!(items[0].kind.to_string(), "Unknown opcode: 0x0A");
    }

    #[test]
    fn truncated_operand_stops_decoding() {
        let items = decode_stream(&[0x03, 0x01, 0x05, 0x00, 0x00]);
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1].kind,
            Decoded::Truncated {
                opcode: Opcode::Push,
                available: 3
            }
        );
        assert_eq!(
            items[1].kind.to_string(),
            "PUSH <truncated operand: 3 of 8 bytes>"
        );
    }

    #[test]
    fn empty_stream_decodes_to_nothing() {
        assert!(decode_stream(&[]).is_empty());
        let dis = disassemble(&module(""), VersionPolicy::default()).unwrap();
        assert!(dis.items.is_empty());
        assert!(!dis.has_errors());
    }

    #[test]
    fn major_mismatch_produces_no_output() {
        let bytes = ModuleWriter::new(Version::new(1, 0, 0))
            .to_bytes(&[0xFF])
            .unwrap();
        let err = disassemble(&bytes, VersionPolicy::default()).unwrap_err();
        assert_eq!(
            err,
            VMError::UnsupportedVersion {
                expected: 0,
                found: 1
            }
        );
    }

    #[test]
    fn minor_drift_still_decodes() {
        let bytes = ModuleWriter::new(Version::new(0, 4, 0))
            .to_bytes(&assemble_source("PUSH 7\nHALT").unwrap())
            .unwrap();
        let dis = disassemble(&bytes, VersionPolicy::default()).unwrap();
        assert!(dis.compatibility.is_drift());
        assert_eq!(dis.lines()[0], "Version: 0.4.0");
        assert_eq!(
            dis.instructions().map(|i| i.to_string()).collect::<Vec<_>>(),
            vec!["PUSH 7", "HALT"]
        );
    }

    #[test]
    fn size_mismatch_is_reported() {
        let mut bytes = module("HALT");
        bytes.push(0xFF);
        let dis = disassemble(&bytes, VersionPolicy::default()).unwrap();
        assert!(dis.size_mismatch);
        assert_eq!(dis.items.len(), 2);
        assert!(!disassemble(&module("HALT"), VersionPolicy::default()).unwrap().size_mismatch);
    }

    #[test]
    fn unknown_bytes_mark_disassembly() {
        let mut bytes = module("HALT");
        bytes.push(0x42);
        let dis = disassemble(&bytes, VersionPolicy::default()).unwrap();
        assert!(dis.has_errors());
        assert_eq!(dis.instructions().count(), 1);
        assert_eq!(dis.lines().last().unwrap(), "Unknown opcode: 0x42");
    }

    #[test]
    fn disassemble_file_reads_module() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("prog.bin");
        let code = assemble_source("PUSH 3\nPRINT_INT\nHALT").unwrap();
        ModuleWriter::default().write_file(&path, &code).unwrap();

        let dis = Disassembler::default().disassemble_file(&path).unwrap();
        assert_eq!(
            dis.instructions().map(|i| i.to_string()).collect::<Vec<_>>(),
            vec!["PUSH 3", "PRINT_INT", "HALT"]
        );
    }
}
