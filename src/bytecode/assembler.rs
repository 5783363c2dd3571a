//! Assembly source tokenizer and bytecode encoder.
//!
//! # Syntax
//!
//! ```text
//! PUSH 10      ; push a literal
//! PUSH -3
//! JMP 27       ; jump to byte offset 27 of the instruction stream
//! HALT
//! ```
//!
//! - Mnemonics are exact, case-sensitive tokens from [`Opcode`]
//! - `PUSH` and the jump forms take one base-10 operand (may be negative)
//! - `;` starts a comment that runs to the end of the line
//! - Tokens are separated by any whitespace, line breaks included

use crate::bytecode::errors::VMError;
use crate::bytecode::isa::{Instruction, Opcode, Operand};
use crate::types::encoding::Encode;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = ';';

/// A whitespace-delimited source token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    /// 0-based position in the token sequence.
    pub index: usize,
    /// 1-based source line.
    pub line: usize,
    /// 1-based byte column in the line.
    pub column: usize,
}

/// Returns the part of `line` before the first comment marker.
fn strip_comment(line: &str) -> &str {
    match line.find(COMMENT_CHAR) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Splits source text into tokens after removing comments.
///
/// Pure function of `source`; calling it again yields the same sequence.
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut out = Vec::new();

    for (line_no, raw_line) in source.lines().enumerate() {
        let line = strip_comment(raw_line);
        let mut start: Option<usize> = None;

        for (i, ch) in line.char_indices() {
            if ch.is_whitespace() {
                if let Some(s) = start.take() {
                    push_token(&mut out, line, line_no + 1, s, i);
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }

        if let Some(s) = start {
            push_token(&mut out, line, line_no + 1, s, line.len());
        }
    }

    out
}

fn push_token<'a>(out: &mut Vec<Token<'a>>, line: &'a str, line_no: usize, start: usize, end: usize) {
    out.push(Token {
        text: &line[start..end],
        index: out.len(),
        line: line_no,
        column: start + 1,
    });
}

/// Parses an operand token as a signed base-10 integer of the operand width.
pub(crate) fn parse_operand(tok: &str) -> Option<Operand> {
    tok.parse::<Operand>().ok()
}

/// Resolves tokens into instructions, consuming an operand after `PUSH` and jumps.
pub fn parse_instructions(tokens: &[Token<'_>]) -> Result<Vec<Instruction>, VMError> {
    let mut instructions = Vec::with_capacity(tokens.len());
    let mut it = tokens.iter();

    while let Some(tok) = it.next() {
        let opcode = Opcode::from_mnemonic(tok.text).ok_or_else(|| VMError::UnknownOpcode {
            token: tok.text.to_string(),
            index: tok.index,
            line: tok.line,
            column: tok.column,
        })?;

        let operand = if opcode.has_operand() {
            let arg = it.next().ok_or(VMError::MissingOperand {
                mnemonic: opcode.mnemonic(),
                index: tok.index,
                line: tok.line,
                column: tok.column,
            })?;
            let value = parse_operand(arg.text).ok_or_else(|| VMError::InvalidOperand {
                mnemonic: opcode.mnemonic(),
                token: arg.text.to_string(),
                index: arg.index,
                line: arg.line,
                column: arg.column,
            })?;
            Some(value)
        } else {
            None
        };

        instructions.extend(Instruction::new(opcode, operand));
    }

    Ok(instructions)
}

/// Encodes a token sequence into an instruction stream.
///
/// The stream length is the module's program size.
pub fn encode(tokens: &[Token<'_>]) -> Result<Vec<u8>, VMError> {
    let instructions = parse_instructions(tokens)?;
    let mut code = Vec::with_capacity(instructions.iter().map(Encode::encoded_len).sum());
    for instr in &instructions {
        instr.encode(&mut code);
    }
    Ok(code)
}

/// Assembles source text into an instruction stream.
pub fn assemble_source(source: &str) -> Result<Vec<u8>, VMError> {
    encode(&tokenize(source))
}

/// Returns the source position carried by an assembly error, if any.
fn assembly_error_location(err: &VMError) -> Option<(usize, usize)> {
    match err {
        VMError::UnknownOpcode { line, column, .. }
        | VMError::MissingOperand { line, column, .. }
        | VMError::InvalidOperand { line, column, .. } => Some((*line, *column)),
        _ => None,
    }
}

/// Formats a compiler-style diagnostic pointing at the offending token.
pub fn render_diagnostic(file: &str, source: &str, err: &VMError) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {err}");

    let Some((line, column)) = assembly_error_location(err) else {
        return diag;
    };

    let _ = writeln!(diag, " --> {file}:{line}:{column}");
    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let underline = " ".repeat(column.saturating_sub(1));
        let _ = writeln!(diag, "     |");
        let _ = writeln!(diag, "{:>4} | {}", line, raw_line.trim_end_matches('\r'));
        let _ = writeln!(diag, "     | {}^", underline);
    }

    diag
}

/// Reads and assembles a source file.
///
/// Assembly errors are logged with a diagnostic before being returned.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| VMError::IoError {
        path: path_ref.display().to_string(),
        source: e.to_string(),
    })?;

    assemble_source(&source).inspect_err(|err| {
        crate::error!(
            "{}",
            render_diagnostic(&path_ref.display().to_string(), &source, err).trim_end()
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(tokens: &[Token<'a>]) -> Vec<&'a str> {
        tokens.iter().map(|t| t.text).collect()
    }

    #[test]
    fn tokenize_splits_on_any_whitespace() {
        let tokens = tokenize("PUSH 10\n\tPUSH   2\r\nDIV\n");
        assert_eq!(texts(&tokens), vec!["PUSH", "10", "PUSH", "2", "DIV"]);
    }

    #[test]
    fn tokenize_strips_comments() {
        let tokens = tokenize("; header comment\nPUSH 1 ; trailing\n;PUSH 2\nHALT;x");
        assert_eq!(texts(&tokens), vec!["PUSH", "1", "HALT"]);
    }

    #[test]
    fn tokenize_records_positions() {
        let tokens = tokenize("PUSH 7\n  HALT");
        assert_eq!(
            tokens[1],
            Token {
                text: "7",
                index: 1,
                line: 1,
                column: 6
            }
        );
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens[2].column, 3);
        assert_eq!(tokens[2].index, 2);
    }

    #[test]
    fn tokenize_is_restartable() {
        let source = "PUSH 1\nPUSH 2 ; c\nADD\n";
        assert_eq!(tokenize(source), tokenize(source));
    }

    #[test]
    fn tokenize_empty_and_comment_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \n; only a comment\n\n").is_empty());
    }

    #[test]
    fn assemble_empty_source() {
        assert!(assemble_source("").unwrap().is_empty());
    }

    #[test]
    fn comment_line_then_halt_is_one_byte() {
        let code = assemble_source("; this program does nothing\nHALT\n").unwrap();
        assert_eq!(code, vec![Opcode::Halt.code()]);
    }

    #[test]
    fn encode_division_program() {
        let code = assemble_source("PUSH 10\nPUSH 2\nDIV\nPRINT_INT\nHALT").unwrap();
        let mut expected = vec![Opcode::Push.code()];
        expected.extend_from_slice(&10i64.to_le_bytes());
        expected.push(Opcode::Push.code());
        expected.extend_from_slice(&2i64.to_le_bytes());
        expected.extend_from_slice(&[
            Opcode::Div.code(),
            Opcode::PrintInt.code(),
            Opcode::Halt.code(),
        ]);
        assert_eq!(code, expected);
        assert_eq!(code.len(), 21);
    }

    #[test]
    fn encode_negative_operand() {
        let code = assemble_source("PUSH -1").unwrap();
        assert_eq!(code[0], Opcode::Push.code());
        assert_eq!(&code[1..], &[0xFF; 8]);
    }

    #[test]
    fn jump_offsets_count_bytes() {
        // PUSH 9 (9 bytes) + JMP 27 (9 bytes) + PUSH 0 (9 bytes) puts PRINT_INT at 27
        let code = assemble_source("PUSH 9\nJMP 27\nPUSH 0\nPRINT_INT\nHALT").unwrap();
        assert_eq!(code[27], Opcode::PrintInt.code());
        assert_eq!(code[9], Opcode::Jmp.code());
        assert_eq!(&code[10..18], &27i64.to_le_bytes());
    }

    #[test]
    fn operand_boundaries() {
        let code = assemble_source(&format!("PUSH {}\nPUSH {}", i64::MAX, i64::MIN)).unwrap();
        assert_eq!(&code[1..9], &i64::MAX.to_le_bytes());
        assert_eq!(&code[10..18], &i64::MIN.to_le_bytes());
    }

    #[test]
    fn operand_overflow_is_invalid() {
        let err = assemble_source("PUSH 9223372036854775808").unwrap_err();
        assert_eq!(
            err,
            VMError::InvalidOperand {
                mnemonic: "PUSH",
                token: "9223372036854775808".to_string(),
                index: 1,
                line: 1,
                column: 6,
            }
        );
        assert!(matches!(
            assemble_source("PUSH -9223372036854775809"),
            Err(VMError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn unknown_mnemonic_is_rejected() {
        let err = assemble_source("PUSH 1\nFOO\nHALT").unwrap_err();
        assert_eq!(
            err,
            VMError::UnknownOpcode {
                token: "FOO".to_string(),
                index: 2,
                line: 2,
                column: 1,
            }
        );
    }

    #[test]
    fn lowercase_mnemonic_is_unknown() {
        assert!(matches!(
            assemble_source("halt"),
            Err(VMError::UnknownOpcode { ref token, index: 0, .. }) if token == "halt"
        ));
    }

    #[test]
    fn missing_operand_at_end_of_input() {
        let err = assemble_source("PUSH 1\nJMP_IF_TRUE").unwrap_err();
        assert_eq!(
            err,
            VMError::MissingOperand {
                mnemonic: "JMP_IF_TRUE",
                index: 2,
                line: 2,
                column: 1,
            }
        );
    }

    #[test]
    fn comment_does_not_supply_operand() {
        assert!(matches!(
            assemble_source("PUSH ; 5\n"),
            Err(VMError::MissingOperand { mnemonic: "PUSH", .. })
        ));
    }

    #[test]
    fn non_numeric_operand_is_invalid() {
        for bad in ["PUSH x", "JMP 1.5", "PUSH 0x10", "JMP_IF_FALSE HALT"] {
            assert!(
                matches!(assemble_source(bad), Err(VMError::InvalidOperand { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn operand_free_opcodes_never_consume_numbers() {
        // "5" after ADD is its own token and is not a mnemonic
        let err = assemble_source("ADD 5").unwrap_err();
        assert!(matches!(err, VMError::UnknownOpcode { ref token, index: 1, .. } if token == "5"));
    }

    #[test]
    fn every_operand_bearing_opcode_consumes_one_token() {
        for op in Opcode::ALL.iter().filter(|op| op.has_operand()) {
            let code = assemble_source(&format!("{} -7 HALT", op.mnemonic())).unwrap();
            assert_eq!(code.len(), op.encoded_len() + 1, "{op}");
            assert_eq!(code.last(), Some(&Opcode::Halt.code()));
        }
    }

    #[test]
    fn every_plain_opcode_is_one_byte() {
        for op in Opcode::ALL.iter().filter(|op| !op.has_operand()) {
            assert_eq!(assemble_source(op.mnemonic()).unwrap(), vec![op.code()]);
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let source = "PUSH 1 PUSH 2 PUSH 3 ROT PRINT_INT PRINT_INT PRINT_INT HALT";
        assert_eq!(
            assemble_source(source).unwrap(),
            assemble_source(source).unwrap()
        );
    }

    #[test]
    fn diagnostic_points_at_token() {
        let source = "PUSH 1\n  BOGUS\n";
        let err = assemble_source(source).unwrap_err();
        let diag = render_diagnostic("prog.asm", source, &err);
        assert!(diag.starts_with("error: unknown opcode 'BOGUS'"));
        assert!(diag.contains(" --> prog.asm:2:3"));
        assert!(diag.contains("   2 |   BOGUS"));
        assert!(diag.contains("\n     |   ^"));
    }

    #[test]
    fn diagnostic_without_location() {
        let err = VMError::IoError {
            path: "x.asm".to_string(),
            source: "not found".to_string(),
        };
        assert_eq!(
            render_diagnostic("x.asm", "", &err),
            "error: io error on x.asm: not found\n"
        );
    }

    #[test]
    fn assemble_file_reads_source() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("prog.asm");
        fs::write(&path, "PUSH 5\nB_NOT\nPRINT_INT\nHALT\n").unwrap();
        let code = assemble_file(&path).unwrap();
        assert_eq!(code.len(), 12);
    }

    #[test]
    fn assemble_file_missing() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let err = assemble_file(dir.path().join("missing.asm")).unwrap_err();
        assert!(matches!(err, VMError::IoError { .. }));
    }
}
