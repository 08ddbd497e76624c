use crate::bytecode::errors::BytecodeError;
use rbc_derive::Error;

/// Errors raised while reading or writing compiled files.
#[derive(Debug, Error)]
pub enum CompiledFileError {
    /// File header or compiled-method record carries a version this reader does not support.
    #[error("unsupported {what} version: {found}")]
    UnsupportedVersion { what: &'static str, found: String },
    /// Unknown marshal tag byte.
    #[error("unsupported marshal tag {tag:#04x} at byte {offset}")]
    UnsupportedTag { tag: u8, offset: usize },
    /// File could not be opened, read or written.
    #[error("io error on {path}: {source}")]
    IoError { path: String, source: String },
    /// Input ended in the middle of a value.
    #[error("unexpected end of input at byte {offset}")]
    UnexpectedEof { offset: usize },
    /// Overlong varint, or one wider than 64 bits where a length or word is expected.
    #[error("invalid varint at byte {offset}")]
    InvalidVarint { offset: usize },
    /// Integer does not fit the target type.
    #[error("integer out of range at byte {offset}")]
    IntegerOutOfRange { offset: usize },
    /// Float line that is neither a mantissa/exponent pair nor a non-finite spelling.
    #[error("invalid float encoding {text:?}")]
    InvalidFloat { text: String },
    /// Header lines are missing or malformed.
    #[error("bad compiled file header: {reason}")]
    BadHeader { reason: String },
    /// Value nesting exceeds the configured limit.
    #[error("value nesting exceeds maximum depth {limit}")]
    NestingTooDeep { limit: usize },
    /// Body digest does not match the header checksum.
    #[error("checksum mismatch: header {expected}, body {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    /// A value has the wrong kind for where it was found.
    #[error("expected a {expected}, found {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },
    /// A record node holds the wrong number of fields.
    #[error("{record} record expects {expected} fields, found {found}")]
    RecordArity {
        record: &'static str,
        expected: usize,
        found: usize,
    },
    /// Bytes remain after the top-level value.
    #[error("{count} trailing bytes after body")]
    TrailingBytes { count: usize },
    #[error("{0}")]
    Bytecode(#[from] BytecodeError),
}
