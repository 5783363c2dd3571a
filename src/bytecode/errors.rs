use stackvm_derive::Error;

/// Errors produced while assembling, loading, decoding or running a module.
///
/// Non-fatal conditions (minor version drift, a program-size field that
/// disagrees with the stream, unknown bytes met by the disassembler) are not
/// errors; they are reported as values by the component that detects them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VMError {
    /// Source token is not a known mnemonic.
    #[error("unknown opcode '{token}' at token {index} (line {line}, column {column})")]
    UnknownOpcode {
        token: String,
        index: usize,
        line: usize,
        column: usize,
    },
    /// Operand-bearing mnemonic is the last token of the source.
    #[error("missing operand after '{mnemonic}' at token {index} (line {line}, column {column})")]
    MissingOperand {
        mnemonic: &'static str,
        index: usize,
        line: usize,
        column: usize,
    },
    /// Operand token is not a base-10 integer that fits the operand field.
    #[error(
        "invalid operand '{token}' for '{mnemonic}' at token {index} (line {line}, column {column})"
    )]
    InvalidOperand {
        mnemonic: &'static str,
        token: String,
        index: usize,
        line: usize,
        column: usize,
    },
    /// Module major version differs from the supported major version.
    #[error("unsupported module version: expected major {expected}, found {found}")]
    UnsupportedVersion { expected: u16, found: u16 },
    /// Module is shorter than its fixed header.
    #[error("truncated module header: expected {expected} bytes, found {actual}")]
    TruncatedHeader { expected: usize, actual: usize },
    /// Instruction stream does not fit the program-size field.
    #[error("program of {size} bytes exceeds the maximum of {max}")]
    ProgramTooLarge { size: usize, max: usize },
    /// File could not be read or written.
    #[error("io error on {path}: {source}")]
    IoError { path: String, source: String },
    /// Runtime met a byte that is not an opcode.
    #[error("invalid instruction 0x{opcode:02X} at offset {offset}")]
    InvalidInstruction { opcode: u8, offset: usize },
    /// Operand runs past the end of the instruction stream.
    #[error(
        "unexpected end of bytecode at {ip}: needed {requested} bytes, {available} available"
    )]
    UnexpectedEndOfBytecode {
        ip: usize,
        requested: usize,
        available: usize,
    },
    /// Instruction needs more values than the stack holds.
    #[error("stack underflow in {instr} at offset {offset}")]
    StackUnderflow { instr: &'static str, offset: usize },
    /// Push beyond the stack capacity.
    #[error("stack overflow at offset {offset} (capacity {capacity})")]
    StackOverflow { offset: usize, capacity: usize },
    /// DIV or MOD with a zero divisor.
    #[error("division by zero in {instr} at offset {offset}")]
    DivisionByZero { instr: &'static str, offset: usize },
    /// Jump target outside the instruction stream.
    #[error("jump target {target} out of range at offset {offset}")]
    InvalidJump { target: i64, offset: usize },
    /// POW exponent is negative or too large.
    #[error("invalid exponent {exponent} at offset {offset}")]
    InvalidExponent { exponent: i64, offset: usize },
    /// Program output could not be written.
    #[error("failed to write program output: {source}")]
    OutputError { source: String },
}
