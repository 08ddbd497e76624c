//! Textual listing parser and instruction-sequence assembler.
//!
//! Turns a human-readable listing into symbolic [`Instruction`]s, a literal
//! table, and an encoded [`InstructionSequence`].
//!
//! # Syntax
//!
//! ```text
//! label:  mnemonic operand1, operand2, ...  # optional comment
//! ```
//!
//! - Mnemonics are lowercase table names (e.g., `push_int`, `send_stack`)
//! - Integer operands are unsigned decimal (`42`)
//! - `ip` operands accept a label name, resolved to its word offset
//! - `literal` operands accept `"string"`, `:symbol`, or a raw table index
//! - Comments start with `#`
//! - Commas between operands are optional

use crate::bytecode::encoder::{Instruction, InstructionSequence, encode};
use crate::bytecode::errors::BytecodeError;
use crate::bytecode::isa::Opcode;
use crate::bytecode::operand::OperandKind;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';
const SYMBOL_PREFIX: char = ':';

/// Return the line/column/message triple for assembly-related errors.
fn assembly_error_location(err: &BytecodeError) -> Option<(usize, usize, String)> {
    match err {
        BytecodeError::AssemblyError {
            line,
            offset,
            source,
        } => Some((*line, *offset, source.clone())),
        BytecodeError::ParseError {
            line,
            offset,
            message,
        } => Some((*line, *offset, message.to_string())),
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for assembly failures.
pub fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    offset: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Emit a diagnostic to stderr for assembly errors.
fn log_assembly_error(file: &str, source: &str, err: &BytecodeError) {
    if let Some((line, offset, message)) = assembly_error_location(err) {
        eprintln!(
            "{}",
            render_assembly_diagnostic(file, source, line, offset, &message)
        );
    } else {
        eprintln!("error: {err}");
    }
}

/// Literal referenced from a listing by `"string"` or `:symbol`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ListingLiteral {
    String(Vec<u8>),
    Symbol(Vec<u8>),
}

/// Result of assembling a listing.
#[derive(Debug, Clone)]
pub struct Listing {
    /// Instructions in listing order.
    pub instructions: Vec<Instruction>,
    /// Encoded form of `instructions`, with its stack high-water mark.
    pub iseq: InstructionSequence,
    /// Interned literals in first-use order; `literal` operands index into this.
    pub literals: Vec<ListingLiteral>,
    /// Label definitions mapping names to word offsets.
    pub labels: HashMap<String, usize>,
}

/// Assembly context for literal interning and label tracking.
#[derive(Default)]
pub struct AsmContext {
    /// Accumulated literals.
    pub literals: Vec<ListingLiteral>,
    literal_index: HashMap<ListingLiteral, u64>,
    /// Label definitions mapping names to word offsets.
    pub(crate) labels: HashMap<String, usize>,
}

impl AsmContext {
    /// Creates an empty assembly context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `literal`, adding it to the table on first use.
    pub fn intern(&mut self, literal: ListingLiteral) -> u64 {
        if let Some(&index) = self.literal_index.get(&literal) {
            return index;
        }
        let index = self.literals.len() as u64;
        self.literals.push(literal.clone());
        self.literal_index.insert(literal, index);
        index
    }

    /// Registers a label at the given word offset.
    pub(crate) fn define_label(&mut self, name: String, offset: usize) -> Result<(), BytecodeError> {
        if self.labels.contains_key(&name) {
            return Err(BytecodeError::DuplicateLabel { label: name });
        }
        self.labels.insert(name, offset);
        Ok(())
    }

    /// Resolves a label to its word offset.
    pub(crate) fn resolve_label(&self, name: &str) -> Result<usize, BytecodeError> {
        self.labels
            .get(name)
            .copied()
            .ok_or(BytecodeError::UndefinedLabel {
                label: name.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line of a listing.
///
/// Rules:
/// - `#` starts a comment
/// - commas are ignored
/// - whitespace-separated tokens
/// - double-quoted strings may contain spaces, `#`, commas and `\"`
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, BytecodeError> {
    let mut out = Vec::with_capacity(4);

    let mut start: Option<usize> = None;
    let mut start_col: usize = 0;
    let mut in_str = false;
    let mut escaped = false;

    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if in_str {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_str = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        if b == COMMENT_CHAR as u8 {
            break;
        }

        match b {
            b'"' => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
                in_str = true;
            }
            b',' | b' ' | b'\t' => {
                if let Some(s) = start.take() {
                    out.push(Token {
                        text: &line[s..i],
                        offset: start_col,
                    });
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
            }
        }
        i += 1;
    }

    if in_str {
        return Err(BytecodeError::ParseError {
            line: line_no,
            offset: start_col,
            message: "unterminated string literal (missing closing quote)",
        });
    }

    if let Some(s) = start {
        let text = line[s..i].trim_end();
        if !text.is_empty() {
            out.push(Token {
                text,
                offset: start_col,
            });
        }
    }

    Ok(out)
}

/// Parse an unsigned integer operand.
pub(crate) fn parse_u64(tok: &str, kind: OperandKind) -> Result<u64, BytecodeError> {
    tok.parse::<u64>().map_err(|_| BytecodeError::InvalidOperand {
        token: tok.to_string(),
        kind,
    })
}

/// Parse the body of a double-quoted string token, resolving escapes.
pub(crate) fn parse_string(tok: &str) -> Option<Vec<u8>> {
    let body = tok.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        let c = if c == '\\' {
            match chars.next()? {
                'n' => '\n',
                't' => '\t',
                '0' => '\0',
                '\\' => '\\',
                '"' => '"',
                _ => return None,
            }
        } else {
            c
        };
        let mut buf = [0u8; 4];
        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }
    Some(out)
}

/// Parse a `literal` operand: a string, a symbol, or a raw index.
fn parse_literal(tok: &str, ctx: &mut AsmContext) -> Result<u64, BytecodeError> {
    if tok.starts_with('"') {
        let bytes = parse_string(tok).ok_or_else(|| BytecodeError::InvalidOperand {
            token: tok.to_string(),
            kind: OperandKind::Literal,
        })?;
        return Ok(ctx.intern(ListingLiteral::String(bytes)));
    }
    if let Some(name) = tok.strip_prefix(SYMBOL_PREFIX)
        && !name.is_empty()
    {
        return Ok(ctx.intern(ListingLiteral::Symbol(name.as_bytes().to_vec())));
    }
    parse_u64(tok, OperandKind::Literal)
}

/// Parse an `ip` operand: a word offset or a label name.
fn parse_ip_or_label(tok: &str, ctx: &AsmContext) -> Result<u64, BytecodeError> {
    if let Ok(v) = tok.parse::<u64>() {
        return Ok(v);
    }
    Ok(ctx.resolve_label(tok)? as u64)
}

/// Checks if a token is a label definition (ends with `:`)
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && !tok.starts_with(SYMBOL_PREFIX) && tok.len() > 1
}

/// Extracts the label name from a label definition token.
fn label_name(tok: &str) -> &str {
    &tok[..tok.len() - 1]
}

/// Parse one instruction from tokens.
fn parse_instruction(ctx: &mut AsmContext, tokens: &[Token]) -> Result<Instruction, BytecodeError> {
    let Some((head, args)) = tokens.split_first() else {
        return Err(BytecodeError::EncodingArityError {
            mnemonic: "<missing opcode>".to_string(),
            expected: 1,
            actual: 0,
        });
    };

    let opcode = Opcode::from_mnemonic(head.text)?;
    let kinds = opcode.descriptor().operands();
    if args.len() != kinds.len() {
        return Err(BytecodeError::EncodingArityError {
            mnemonic: head.text.to_string(),
            expected: kinds.len(),
            actual: args.len(),
        });
    }

    let mut operands = Vec::with_capacity(kinds.len());
    for (tok, kind) in args.iter().zip(kinds) {
        let value = match kind {
            OperandKind::Ip => parse_ip_or_label(tok.text, ctx),
            OperandKind::Literal => parse_literal(tok.text, ctx),
            other => parse_u64(tok.text, *other),
        }
        .map_err(|e| located(e, tok))?;
        operands.push(value);
    }

    Instruction::new(opcode, operands)
}

/// Pins an operand error to its token column; the caller fills in the line.
fn located(err: BytecodeError, tok: &Token) -> BytecodeError {
    BytecodeError::AssemblyError {
        line: 0,
        offset: tok.offset,
        source: err.to_string(),
    }
}

/// Performs two-pass assembly.
///
/// Pass 1: Tokenizes all lines, computes instruction widths, and records label
/// positions as word offsets.
///
/// Pass 2: Parses operands with label resolution and encodes the sequence.
fn assemble_lines(source: &str) -> Result<Listing, BytecodeError> {
    let mut ctx = AsmContext::new();
    let mut parsed_lines: Vec<(usize, Vec<Token>)> = Vec::new();
    let mut offset = 0usize;

    for (line_no, line) in source.lines().enumerate() {
        let line_no = line_no + 1;
        let mut tokens = tokenize(line_no, line)?;
        if tokens.is_empty() {
            continue;
        }

        if is_label_def(tokens[0].text) {
            let label = tokens.remove(0);
            ctx.define_label(label_name(label.text).to_string(), offset)
                .map_err(|e| BytecodeError::AssemblyError {
                    line: line_no,
                    offset: label.offset,
                    source: e.to_string(),
                })?;
            if tokens.is_empty() {
                continue;
            }
        }

        let opcode = Opcode::from_mnemonic(tokens[0].text).map_err(|e| {
            BytecodeError::AssemblyError {
                line: line_no,
                offset: tokens[0].offset,
                source: e.to_string(),
            }
        })?;
        offset += opcode.descriptor().width();
        parsed_lines.push((line_no, tokens));
    }

    let mut instructions = Vec::with_capacity(parsed_lines.len());
    for (line_no, tokens) in &parsed_lines {
        let instruction = parse_instruction(&mut ctx, tokens).map_err(|e| match e {
            BytecodeError::AssemblyError { offset, source, .. } => BytecodeError::AssemblyError {
                line: *line_no,
                offset,
                source,
            },
            other => BytecodeError::AssemblyError {
                line: *line_no,
                offset: tokens.first().map(|t| t.offset).unwrap_or(1),
                source: other.to_string(),
            },
        })?;
        instructions.push(instruction);
    }

    let iseq = encode(&instructions)?;
    Ok(Listing {
        instructions,
        iseq,
        literals: ctx.literals,
        labels: ctx.labels,
    })
}

/// Assemble a full listing.
pub fn assemble_source(source: &str) -> Result<Listing, BytecodeError> {
    assemble_source_with_name(source, "<source>")
}

/// Assembles a listing with an associated filename for error diagnostics.
///
/// Logs a compiler-style diagnostic to stderr on failure.
fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Listing, BytecodeError> {
    let result = assemble_lines(source);
    if let Err(err) = &result {
        log_assembly_error(source_name, source, err);
    }
    result
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Listing, BytecodeError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| BytecodeError::IoError {
        path: path_ref.display().to_string(),
        source: e.to_string(),
    })?;
    assemble_source_with_name(&source, &path_ref.display().to_string())
}
