use crate::bytecode::operand::OperandKind;
use rbc_derive::Error;

/// Errors raised by the opcode table, the encoder/decoder and the listing assembler.
#[derive(Debug, Error)]
pub enum BytecodeError {
    /// Opcode id with no table entry.
    #[error("invalid opcode {opcode}")]
    InvalidOpcode { opcode: u64 },
    /// Mnemonic with no table entry.
    #[error("unknown instruction: {name}")]
    InvalidMnemonic { name: String },
    /// Operand count does not match the opcode's operand-kind list.
    #[error("operand count mismatch for {mnemonic}: expected {expected}, got {actual}")]
    EncodingArityError {
        mnemonic: String,
        expected: usize,
        actual: usize,
    },
    /// Replacement instruction is wider than the instruction it replaces.
    #[error(
        "cannot replace instruction at {offset}: new width {new_width} exceeds old width {old_width}"
    )]
    EncodingOverflowError {
        offset: usize,
        old_width: usize,
        new_width: usize,
    },
    /// Corrupt or truncated instruction stream.
    #[error("decode error at word {offset}: {reason}")]
    DecodeError { offset: usize, reason: String },
    /// Stack effect depends on the execution engine's argument register.
    #[error("stack effect of {mnemonic} depends on the argument register")]
    UnresolvedStackEffect { mnemonic: &'static str },
    /// Stack effect formula overflowed.
    #[error("stack effect of {mnemonic} overflows")]
    StackOverflow { mnemonic: String },
    /// Listing error with line and column context.
    #[error("line {line}:{offset}: {source}")]
    AssemblyError {
        line: usize,
        offset: usize,
        source: String,
    },
    /// Malformed listing token.
    #[error("line {line}:{offset}: {message}")]
    ParseError {
        line: usize,
        offset: usize,
        message: &'static str,
    },
    /// Label defined more than once.
    #[error("duplicate label: {label}")]
    DuplicateLabel { label: String },
    /// Reference to an undefined label.
    #[error("undefined label: {label}")]
    UndefinedLabel { label: String },
    /// Operand token that cannot be read as the expected kind.
    #[error("invalid {kind} operand: {token}")]
    InvalidOperand { token: String, kind: OperandKind },
    /// File I/O error while reading a listing.
    #[error("io error on {path}: {source}")]
    IoError { path: String, source: String },
}
