//! Operand kinds and stack-effect formulas.
//!
//! Every opcode declares the kind of each operand it carries and how many
//! operand-stack slots it consumes and produces. A stack count is either a
//! fixed number or a formula scaled by one of the instruction's operands.

use crate::bytecode::errors::BytecodeError;
use std::fmt;

/// Meaning of an operand word following an opcode.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OperandKind {
    /// Immediate integer value.
    Int,
    /// Index into the method's literal tuple.
    Literal,
    /// Local variable slot.
    Local,
    /// Local variable slot of an enclosing block scope.
    BlockLocal,
    /// Instance field index.
    Field,
    /// Primitive index.
    Primitive,
    /// Absolute instruction pointer (word offset into the sequence).
    Ip,
    /// Lexical scope depth.
    Depth,
    /// Inline cache index.
    Cache,
}

impl OperandKind {
    /// Returns the listing name of this operand kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperandKind::Int => "int",
            OperandKind::Literal => "literal",
            OperandKind::Local => "local",
            OperandKind::BlockLocal => "block_local",
            OperandKind::Field => "field",
            OperandKind::Primitive => "primitive",
            OperandKind::Ip => "ip",
            OperandKind::Depth => "depth",
            OperandKind::Cache => "cache",
        }
    }
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a scaled stack count takes its variable term from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StackSource {
    /// The instruction's first operand.
    Operand1,
    /// The instruction's second operand.
    Operand2,
    /// The execution engine's pending argument-count register.
    ///
    /// Its value is not visible in the bytecode, so formulas over it can only be
    /// resolved by a caller that owns the register.
    ArgRegister,
}

/// Number of stack slots an instruction consumes or produces.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StackEffect {
    /// Exactly this many slots.
    Fixed(u64),
    /// `multiplier * value(source) + constant` slots.
    ScaledBy {
        source: StackSource,
        multiplier: u64,
        constant: u64,
    },
}

/// Shorthand for a fixed stack count, used by the opcode table.
pub const fn fixed(n: u64) -> StackEffect {
    StackEffect::Fixed(n)
}

/// Shorthand for a scaled stack count, used by the opcode table.
pub const fn scaled(multiplier: u64, source: StackSource, constant: u64) -> StackEffect {
    StackEffect::ScaledBy {
        source,
        multiplier,
        constant,
    }
}

impl StackEffect {
    /// Returns the operand source a formula depends on, or `None` for fixed counts.
    pub const fn source(&self) -> Option<StackSource> {
        match self {
            StackEffect::Fixed(_) => None,
            StackEffect::ScaledBy { source, .. } => Some(*source),
        }
    }

    /// Whether the count can be computed from the instruction alone.
    pub const fn is_static(&self) -> bool {
        !matches!(
            self,
            StackEffect::ScaledBy {
                source: StackSource::ArgRegister,
                ..
            }
        )
    }

    /// Resolves the count against an instruction's operands.
    ///
    /// Formulas over [`StackSource::ArgRegister`] are not resolved here and
    /// return [`BytecodeError::UnresolvedStackEffect`]; use
    /// [`StackEffect::resolve_with_register`] when the register value is known.
    pub fn resolve(&self, mnemonic: &'static str, operands: &[u64]) -> Result<u64, BytecodeError> {
        match *self {
            StackEffect::Fixed(n) => Ok(n),
            StackEffect::ScaledBy {
                source,
                multiplier,
                constant,
            } => {
                let value = match source {
                    StackSource::Operand1 => operand(mnemonic, operands, 0)?,
                    StackSource::Operand2 => operand(mnemonic, operands, 1)?,
                    StackSource::ArgRegister => {
                        return Err(BytecodeError::UnresolvedStackEffect { mnemonic });
                    }
                };
                apply(mnemonic, multiplier, value, constant)
            }
        }
    }

    /// Resolves the count, reading [`StackSource::ArgRegister`] as `register`.
    pub fn resolve_with_register(
        &self,
        mnemonic: &'static str,
        operands: &[u64],
        register: u64,
    ) -> Result<u64, BytecodeError> {
        match *self {
            StackEffect::ScaledBy {
                source: StackSource::ArgRegister,
                multiplier,
                constant,
            } => apply(mnemonic, multiplier, register, constant),
            _ => self.resolve(mnemonic, operands),
        }
    }
}

fn operand(mnemonic: &'static str, operands: &[u64], index: usize) -> Result<u64, BytecodeError> {
    operands
        .get(index)
        .copied()
        .ok_or(BytecodeError::EncodingArityError {
            mnemonic: mnemonic.to_string(),
            expected: index + 1,
            actual: operands.len(),
        })
}

fn apply(mnemonic: &'static str, multiplier: u64, value: u64, constant: u64) -> Result<u64, BytecodeError> {
    multiplier
        .checked_mul(value)
        .and_then(|v| v.checked_add(constant))
        .ok_or(BytecodeError::StackOverflow {
            mnemonic: mnemonic.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_ignores_operands() {
        assert_eq!(fixed(2).resolve("pop", &[]).unwrap(), 2);
        assert_eq!(fixed(0).resolve("noop", &[9, 9]).unwrap(), 0);
    }

    #[test]
    fn scaled_by_first_operand() {
        let effect = scaled(1, StackSource::Operand1, 0);
        assert_eq!(effect.resolve("make_array", &[3]).unwrap(), 3);
        assert_eq!(effect.resolve("make_array", &[0]).unwrap(), 0);
    }

    #[test]
    fn scaled_by_second_operand_with_constant() {
        let effect = scaled(1, StackSource::Operand2, 2);
        assert_eq!(effect.resolve("send_stack_with_block", &[7, 4]).unwrap(), 6);
    }

    #[test]
    fn multiplier_applies_before_constant() {
        let effect = scaled(2, StackSource::Operand1, 1);
        assert_eq!(effect.resolve("make_hash", &[5]).unwrap(), 11);
    }

    #[test]
    fn missing_operand_is_arity_error() {
        let effect = scaled(1, StackSource::Operand2, 1);
        assert!(matches!(
            effect.resolve("send_stack", &[1]),
            Err(BytecodeError::EncodingArityError {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn arg_register_is_deferred() {
        let effect = scaled(1, StackSource::ArgRegister, 1);
        assert!(!effect.is_static());
        assert_eq!(effect.source(), Some(StackSource::ArgRegister));
        assert!(matches!(
            effect.resolve("send_with_register", &[]),
            Err(BytecodeError::UnresolvedStackEffect { .. })
        ));
        assert_eq!(
            effect
                .resolve_with_register("send_with_register", &[], 4)
                .unwrap(),
            5
        );
    }

    #[test]
    fn overflowing_formula_is_rejected() {
        let effect = scaled(2, StackSource::Operand1, 0);
        assert!(matches!(
            effect.resolve("make_hash", &[u64::MAX]),
            Err(BytecodeError::StackOverflow { .. })
        ));
    }

    #[test]
    fn operand_kind_names() {
        assert_eq!(OperandKind::BlockLocal.to_string(), "block_local");
        assert_eq!(OperandKind::Ip.as_str(), "ip");
    }
}
