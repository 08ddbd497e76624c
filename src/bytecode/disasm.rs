//! Disassembler for instruction sequences.
//!
//! Output is one instruction per line as `offset: mnemonic operands`, with
//! offsets in words. Trailing padding is dropped under the same rule the
//! decoder applies.

use crate::bytecode::encoder::{Instruction, InstructionSequence};
use crate::bytecode::errors::BytecodeError;
use crate::bytecode::operand::OperandKind;
use std::collections::BTreeSet;
use std::fmt::{self, Write};

/// Decoded view of a sequence, ready for display.
#[derive(Debug, Clone)]
pub struct Disassembly {
    entries: Vec<(usize, Instruction)>,
    targets: BTreeSet<u64>,
}

/// Disassembles `iseq`.
pub fn disassemble(iseq: &InstructionSequence) -> Result<Disassembly, BytecodeError> {
    let entries = iseq.decode_with_offsets()?;
    let targets = entries
        .iter()
        .flat_map(|(_, instruction)| {
            instruction
                .descriptor()
                .operands()
                .iter()
                .zip(&instruction.operands)
                .filter(|(kind, _)| **kind == OperandKind::Ip)
                .map(|(_, value)| *value)
        })
        .collect();
    Ok(Disassembly { entries, targets })
}

impl Disassembly {
    /// Instructions with their word offsets.
    pub fn entries(&self) -> &[(usize, Instruction)] {
        &self.entries
    }

    /// Offsets referenced by `ip` operands.
    pub fn branch_targets(&self) -> impl Iterator<Item = u64> + '_ {
        self.targets.iter().copied()
    }

    /// Renders the listing, appending `# note` comments for literal operands.
    ///
    /// `literal` maps a literal index to a printable description; `None` leaves
    /// the operand unannotated.
    pub fn render(&self, literal: impl Fn(u64) -> Option<String>) -> String {
        let width = self
            .entries
            .last()
            .map(|(offset, _)| offset.to_string().len())
            .unwrap_or(1)
            .max(4);

        let mut out = String::new();
        for (offset, instruction) in &self.entries {
            let marker = if self.targets.contains(&(*offset as u64)) {
                '>'
            } else {
                ' '
            };
            let _ = write!(out, "{marker}{offset:0width$}: {instruction}");

            let notes: Vec<String> = instruction
                .descriptor()
                .operands()
                .iter()
                .zip(&instruction.operands)
                .filter(|(kind, _)| **kind == OperandKind::Literal)
                .filter_map(|(_, index)| literal(*index))
                .collect();
            if !notes.is_empty() {
                let _ = write!(out, "  # {}", notes.join(", "));
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(|_| None))
    }
}
