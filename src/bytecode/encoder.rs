//! Instruction sequences and the stream encoder/decoder.
//!
//! An [`InstructionSequence`] is a fixed-length buffer of words holding
//! interleaved `(opcode id, operand...)` tuples. [`encode`] builds one from a
//! list of symbolic [`Instruction`]s and records the operand stack high-water
//! mark; [`InstructionSequence::decode`] reverses it.
//!
//! # Padding
//!
//! Sequences may carry trailing zero words from an allocator's size rounding.
//! Once an instruction that ends control flow (`ret`, `halt`, `raise_exc`) has
//! been decoded, an undecodable remainder or a run of zero words is treated as
//! padding. Without such an instruction the same input is a [`DecodeError`].
//!
//! [`DecodeError`]: BytecodeError::DecodeError

use crate::bytecode::errors::BytecodeError;
use crate::bytecode::isa::{Opcode, OpcodeDescriptor};
use crate::debug;
use std::fmt;

/// A symbolic instruction: an opcode and its operand words.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<u64>,
}

impl Instruction {
    /// Creates an instruction, checking the operand count against the opcode table.
    pub fn new(opcode: Opcode, operands: impl Into<Vec<u64>>) -> Result<Self, BytecodeError> {
        let instruction = Self {
            opcode,
            operands: operands.into(),
        };
        instruction.check_arity()?;
        Ok(instruction)
    }

    /// Creates an instruction from its mnemonic.
    pub fn from_mnemonic(mnemonic: &str, operands: impl Into<Vec<u64>>) -> Result<Self, BytecodeError> {
        Self::new(Opcode::from_mnemonic(mnemonic)?, operands)
    }

    /// Creates an operand-less instruction.
    ///
    /// Operand-carrying opcodes are caught by [`encode`].
    pub fn bare(opcode: Opcode) -> Self {
        Self {
            opcode,
            operands: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &'static OpcodeDescriptor {
        self.opcode.descriptor()
    }

    pub fn mnemonic(&self) -> &'static str {
        self.opcode.mnemonic()
    }

    /// Words this instruction occupies once encoded.
    pub fn width(&self) -> usize {
        1 + self.operands.len()
    }

    pub fn stack_consumed(&self) -> Result<u64, BytecodeError> {
        self.descriptor().stack_consumed(&self.operands)
    }

    pub fn stack_produced(&self) -> Result<u64, BytecodeError> {
        self.descriptor().stack_produced(&self.operands)
    }

    /// Net effect on the operand stack depth.
    pub fn stack_difference(&self) -> Result<i64, BytecodeError> {
        self.descriptor().stack_difference(&self.operands)
    }

    fn check_arity(&self) -> Result<(), BytecodeError> {
        let expected = self.descriptor().arg_count();
        if self.operands.len() != expected {
            return Err(BytecodeError::EncodingArityError {
                mnemonic: self.mnemonic().to_string(),
                expected,
                actual: self.operands.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())?;
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{operand}")?;
        }
        Ok(())
    }
}

/// Encoder input that may nest groups of instructions.
///
/// Groups are flattened in order; they carry no encoding of their own.
#[derive(Clone, Debug)]
pub enum Fragment {
    Op(Instruction),
    Group(Vec<Fragment>),
}

impl Fragment {
    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a Instruction>) {
        match self {
            Fragment::Op(instruction) => out.push(instruction),
            Fragment::Group(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

impl From<Instruction> for Fragment {
    fn from(instruction: Instruction) -> Self {
        Fragment::Op(instruction)
    }
}

/// Packed instruction words plus the operand stack high-water mark.
///
/// The word count is fixed at creation. Equality compares the words only; the
/// stack depth is derived metadata.
#[derive(Clone, Debug, Default)]
pub struct InstructionSequence {
    words: Box<[u64]>,
    stack_depth: u64,
}

impl PartialEq for InstructionSequence {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
    }
}

impl Eq for InstructionSequence {}

impl InstructionSequence {
    /// Wraps raw words, e.g. read back from a compiled file. The stack depth is zero.
    pub fn from_words(words: impl Into<Box<[u64]>>) -> Self {
        Self {
            words: words.into(),
            stack_depth: 0,
        }
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Maximum operand stack depth reached by the encoded instructions.
    pub fn stack_depth(&self) -> u64 {
        self.stack_depth
    }

    pub fn set_stack_depth(&mut self, depth: u64) {
        self.stack_depth = depth;
    }

    /// Decodes the whole sequence into symbolic instructions.
    pub fn decode(&self) -> Result<Vec<Instruction>, BytecodeError> {
        Ok(self
            .decode_with_offsets()?
            .into_iter()
            .map(|(_, instruction)| instruction)
            .collect())
    }

    /// Decodes the whole sequence, pairing each instruction with its word offset.
    pub fn decode_with_offsets(&self) -> Result<Vec<(usize, Instruction)>, BytecodeError> {
        let mut out = Vec::new();
        let mut offset = 0;
        let mut last_good: Option<&'static OpcodeDescriptor> = None;

        while offset < self.words.len() {
            let ends_flow = last_good.is_some_and(OpcodeDescriptor::ends_flow);
            if ends_flow && self.words[offset..].iter().all(|w| *w == 0) {
                debug!(
                    "ignoring {} padding words at offset {offset}",
                    self.words.len() - offset
                );
                break;
            }

            match self.read_at(offset) {
                Ok(instruction) => {
                    if instruction.opcode != Opcode::Noop {
                        last_good = Some(instruction.descriptor());
                    }
                    let width = instruction.width();
                    out.push((offset, instruction));
                    offset += width;
                }
                Err(err) if ends_flow => {
                    debug!("treating words from offset {offset} as padding: {err}");
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(out)
    }

    /// Decodes the single instruction starting at `offset`.
    pub fn decode_instruction(&self, offset: usize) -> Result<Instruction, BytecodeError> {
        if offset >= self.words.len() {
            return Err(BytecodeError::DecodeError {
                offset,
                reason: format!("offset past end of sequence of {} words", self.words.len()),
            });
        }
        self.read_at(offset)
    }

    /// Overwrites the instruction at `offset` in place and returns the one it replaced.
    ///
    /// The replacement may not be wider than the instruction it replaces. Surplus words are
    /// zero-filled, so the sequence length never changes.
    pub fn replace_instruction(
        &mut self,
        offset: usize,
        replacement: &Instruction,
    ) -> Result<Instruction, BytecodeError> {
        let old = self.decode_instruction(offset)?;
        replacement.check_arity()?;

        let old_width = old.width();
        let new_width = replacement.width();
        if new_width > old_width {
            return Err(BytecodeError::EncodingOverflowError {
                offset,
                old_width,
                new_width,
            });
        }

        let slot = &mut self.words[offset..offset + old_width];
        slot[0] = replacement.opcode.id();
        slot[1..new_width].copy_from_slice(&replacement.operands);
        slot[new_width..].fill(0);

        Ok(old)
    }

    fn read_at(&self, offset: usize) -> Result<Instruction, BytecodeError> {
        let id = self.words[offset];
        let opcode = Opcode::from_id(id).map_err(|_| BytecodeError::DecodeError {
            offset,
            reason: format!("invalid opcode {id}"),
        })?;
        let width = opcode.descriptor().width();
        let operands = self
            .words
            .get(offset + 1..offset + width)
            .ok_or_else(|| BytecodeError::DecodeError {
                offset,
                reason: format!(
                    "{} needs {} operands, {} words remain",
                    opcode.mnemonic(),
                    width - 1,
                    self.words.len() - offset - 1
                ),
            })?;
        Ok(Instruction {
            opcode,
            operands: operands.to_vec(),
        })
    }
}

/// Encodes a flat instruction list.
///
/// The buffer is sized to the sum of instruction widths up front. The running
/// stack depth starts at zero; the recorded depth is the largest value it reaches.
pub fn encode(instructions: &[Instruction]) -> Result<InstructionSequence, BytecodeError> {
    encode_all(instructions.iter())
}

/// Encodes a possibly nested list of instruction groups.
pub fn encode_fragments(fragments: &[Fragment]) -> Result<InstructionSequence, BytecodeError> {
    let mut flat = Vec::new();
    for fragment in fragments {
        fragment.flatten_into(&mut flat);
    }
    encode_all(flat.into_iter())
}

fn encode_all<'a>(
    instructions: impl Iterator<Item = &'a Instruction> + Clone,
) -> Result<InstructionSequence, BytecodeError> {
    let width: usize = instructions.clone().map(Instruction::width).sum();
    let mut words = Vec::with_capacity(width);
    let mut depth: i64 = 0;
    let mut max_depth: i64 = 0;

    for (index, instruction) in instructions.enumerate() {
        let step = encode_one(instruction, &mut words).inspect_err(|err| {
            debug!("encode failed at instruction {index} ({instruction}): {err}");
        })?;
        depth = depth
            .checked_add(step)
            .ok_or_else(|| BytecodeError::StackOverflow {
                mnemonic: instruction.mnemonic().to_string(),
            })?;
        max_depth = max_depth.max(depth);
    }

    Ok(InstructionSequence {
        words: words.into_boxed_slice(),
        stack_depth: max_depth.unsigned_abs(),
    })
}

fn encode_one(instruction: &Instruction, words: &mut Vec<u64>) -> Result<i64, BytecodeError> {
    instruction.check_arity()?;
    let step = instruction.stack_difference()?;
    words.push(instruction.opcode.id());
    words.extend_from_slice(&instruction.operands);
    Ok(step)
}
