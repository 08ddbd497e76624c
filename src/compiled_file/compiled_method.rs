//! Compiled method record.
//!
//! A compiled method is marshalled as exactly 14 nodes in field declaration
//! order. Fields hold plain [`Value`]s so any file that decodes is
//! representable; the typed accessors return `None` for unexpected kinds.

use crate::bytecode::disasm::{Disassembly, disassemble};
use crate::bytecode::encoder::InstructionSequence;
use crate::compiled_file::errors::CompiledFileError;
use crate::compiled_file::value::{Symbol, Value};
use rbc_derive::MarshalRecord;

/// A method body and its metadata.
#[derive(Clone, Debug, PartialEq, MarshalRecord)]
pub struct CompiledMethod {
    /// Instance-variable table.
    pub ivars: Value,
    /// Primitive name, or nil.
    pub primitive: Value,
    /// Method name (symbol).
    pub name: Value,
    /// Body (instruction sequence).
    pub iseq: Value,
    /// Operand stack slots needed by the body.
    pub stack_size: Value,
    pub local_count: Value,
    pub required_args: Value,
    pub total_args: Value,
    /// Splat argument slot, or nil.
    pub splat: Value,
    /// Literal tuple indexed by `literal` operands.
    pub literals: Value,
    /// Exception handler tuple.
    pub exceptions: Value,
    /// Line table: tuple of `(start_ip, end_ip, line)` tuples.
    pub lines: Value,
    /// Source file name (symbol), or nil.
    pub file: Value,
    /// Local variable names tuple, or nil.
    pub local_names: Value,
}

impl CompiledMethod {
    /// Number of marshalled fields.
    pub const FIELD_COUNT: usize = 14;

    /// Creates a method with no arguments or locals.
    ///
    /// The stack size is taken from the sequence's high-water mark. Literal,
    /// exception and line tables are empty tuples; the remaining optional
    /// fields are nil.
    pub fn new(name: impl Into<Symbol>, iseq: InstructionSequence) -> Self {
        let stack_size = i64::try_from(iseq.stack_depth()).unwrap_or(i64::MAX);
        Self {
            ivars: Value::Nil,
            primitive: Value::Nil,
            name: Value::Symbol(name.into()),
            iseq: Value::Iseq(iseq),
            stack_size: Value::Integer(stack_size),
            local_count: Value::Integer(0),
            required_args: Value::Integer(0),
            total_args: Value::Integer(0),
            splat: Value::Nil,
            literals: Value::Tuple(Vec::new()),
            exceptions: Value::Tuple(Vec::new()),
            lines: Value::Tuple(Vec::new()),
            file: Value::Nil,
            local_names: Value::Nil,
        }
    }

    pub fn with_literals(mut self, literals: Vec<Value>) -> Self {
        self.literals = Value::Tuple(literals);
        self
    }

    pub fn with_file(mut self, file: impl Into<Symbol>) -> Self {
        self.file = Value::Symbol(file.into());
        self
    }

    /// Sets the argument counts; `splat` is the slot of a rest argument, if any.
    pub fn with_args(mut self, required: i64, total: i64, splat: Option<i64>) -> Self {
        self.required_args = Value::Integer(required);
        self.total_args = Value::Integer(total);
        self.splat = splat.into();
        self
    }

    /// Sets the local count and names together.
    pub fn with_locals(mut self, names: impl IntoIterator<Item = Symbol>) -> Self {
        let names: Vec<Value> = names.into_iter().map(Value::Symbol).collect();
        self.local_count = Value::Integer(names.len() as i64);
        self.local_names = Value::Tuple(names);
        self
    }

    /// Sets the line table from `(start_ip, end_ip, line)` entries.
    pub fn with_lines(mut self, lines: impl IntoIterator<Item = (i64, i64, i64)>) -> Self {
        self.lines = Value::tuple(lines.into_iter().map(|(start, end, line)| {
            Value::tuple([start.into(), end.into(), line.into()])
        }));
        self
    }

    pub fn name(&self) -> Option<&Symbol> {
        self.name.as_symbol()
    }

    pub fn iseq(&self) -> Option<&InstructionSequence> {
        self.iseq.as_iseq()
    }

    pub fn stack_size(&self) -> Option<i64> {
        self.stack_size.as_integer()
    }

    pub fn local_count(&self) -> Option<i64> {
        self.local_count.as_integer()
    }

    pub fn required_args(&self) -> Option<i64> {
        self.required_args.as_integer()
    }

    pub fn total_args(&self) -> Option<i64> {
        self.total_args.as_integer()
    }

    pub fn literals(&self) -> &[Value] {
        self.literals.as_tuple().unwrap_or_default()
    }

    pub fn literal(&self, index: u64) -> Option<&Value> {
        self.literals().get(usize::try_from(index).ok()?)
    }

    pub fn file(&self) -> Option<&Symbol> {
        self.file.as_symbol()
    }

    /// Line table entries that are well-formed `(start_ip, end_ip, line)` triples.
    pub fn line_entries(&self) -> impl Iterator<Item = (i64, i64, i64)> + '_ {
        self.lines
            .as_tuple()
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| match entry.as_tuple()? {
                [start, end, line] => {
                    Some((start.as_integer()?, end.as_integer()?, line.as_integer()?))
                }
                _ => None,
            })
    }

    /// Source line of the instruction at word offset `ip`.
    pub fn line(&self, ip: u64) -> Option<i64> {
        let ip = i64::try_from(ip).ok()?;
        self.line_entries()
            .find(|(start, end, _)| *start <= ip && ip <= *end)
            .map(|(_, _, line)| line)
    }

    /// First line of the method.
    pub fn start_line(&self) -> Option<i64> {
        self.line_entries().next().map(|(_, _, line)| line)
    }

    /// Disassembles the body.
    pub fn disassemble(&self) -> Result<Disassembly, CompiledFileError> {
        let iseq = self.iseq().ok_or(CompiledFileError::UnexpectedKind {
            expected: "instruction sequence",
            found: self.iseq.kind_name(),
        })?;
        Ok(disassemble(iseq)?)
    }

    /// Restores the body's stack depth from `stack_size`, which is the only
    /// place it survives marshalling.
    pub(crate) fn restore_stack_depth(&mut self) {
        let Some(depth) = self.stack_size().and_then(|s| u64::try_from(s).ok()) else {
            return;
        };
        if let Value::Iseq(iseq) = &mut self.iseq {
            iseq.set_stack_depth(depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::encoder::{Instruction, encode};
    use crate::bytecode::isa::Opcode;
    use crate::bytecode::errors::BytecodeError;
    use crate::compiled_file::marshal::{MarshalRecord, marshal, unmarshal};

    fn sample() -> CompiledMethod {
        let iseq = encode(&[
            Instruction::new(Opcode::PushLiteral, [0]).unwrap(),
            Instruction::new(Opcode::PushLocal, [0]).unwrap(),
            Instruction::new(Opcode::MakeArray, [2]).unwrap(),
            Instruction::bare(Opcode::Ret),
        ])
        .unwrap();
        CompiledMethod::new("pair", iseq)
            .with_literals(vec![Value::string("x")])
            .with_args(1, 1, None)
            .with_locals([Symbol::from("a")])
            .with_lines([(0, 3, 10), (4, 6, 11)])
            .with_file("pair.rb")
    }

    #[test]
    fn field_order_is_wire_order() {
        assert_eq!(CompiledMethod::FIELD_NAMES.len(), CompiledMethod::FIELD_COUNT);
        assert_eq!(
            CompiledMethod::FIELD_NAMES,
            &[
                "ivars",
                "primitive",
                "name",
                "iseq",
                "stack_size",
                "local_count",
                "required_args",
                "total_args",
                "splat",
                "literals",
                "exceptions",
                "lines",
                "file",
                "local_names",
            ]
        );
    }

    #[test]
    fn new_uses_documented_defaults() {
        let method = CompiledMethod::new("m", encode(&[Instruction::bare(Opcode::Ret)]).unwrap());
        assert_eq!(method.name(), Some(&Symbol::from("m")));
        assert_eq!(method.stack_size(), Some(0));
        assert!(method.literals().is_empty());
        assert!(method.primitive.is_nil());
        assert!(method.file().is_none());
        assert_eq!(method.start_line(), None);
    }

    #[test]
    fn marshal_layout_starts_with_record_version() {
        let method = CompiledMethod::new("m", encode(&[Instruction::bare(Opcode::Ret)]).unwrap());
        let bytes = marshal(&Value::from(method));
        assert_eq!(&bytes[..5], b"M\x01nnx");
        assert_eq!(bytes[5], 1);
        assert_eq!(bytes[6], b'm');
        assert_eq!(&bytes[7..10], b"i\x01\x0c");
    }

    #[test]
    fn round_trip_restores_stack_depth() {
        let method = sample();
        assert_eq!(method.stack_size(), Some(2));
        let decoded = unmarshal(&marshal(&method.clone().into())).unwrap();
        let decoded = decoded.as_method().unwrap();
        assert_eq!(decoded, &method);
        assert_eq!(decoded.iseq().unwrap().stack_depth(), 2);
    }

    #[test]
    fn nested_methods_round_trip() {
        let body = encode(&[Instruction::bare(Opcode::PushNil), Instruction::bare(Opcode::Ret)]).unwrap();
        let block = CompiledMethod::new("__block__", body);
        let outer = sample().with_literals(vec![
            Value::from(block),
            Value::SendSite(Symbol::from("call")),
        ]);
        let value = Value::from(outer);
        assert_eq!(unmarshal(&marshal(&value)).unwrap(), value);
    }

    #[test]
    fn line_lookup() {
        let method = sample();
        assert_eq!(method.start_line(), Some(10));
        assert_eq!(method.line(0), Some(10));
        assert_eq!(method.line(3), Some(10));
        assert_eq!(method.line(5), Some(11));
        assert_eq!(method.line(7), None);
    }

    #[test]
    fn malformed_line_entries_are_skipped() {
        let mut method = sample();
        method.lines = Value::tuple([
            Value::Integer(3),
            Value::tuple([Value::Integer(0), Value::Integer(9)]),
            Value::tuple([Value::Integer(0), Value::Integer(9), Value::Integer(42)]),
        ]);
        assert_eq!(method.line(2), Some(42));
        method.lines = Value::Nil;
        assert_eq!(method.start_line(), None);
    }

    #[test]
    fn truncated_record_fails() {
        let bytes = marshal(&sample().into());
        assert!(matches!(
            unmarshal(&bytes[..bytes.len() - 1]),
            Err(CompiledFileError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn disassembles_its_body() {
        let listing = sample().disassemble().unwrap();
        assert_eq!(listing.entries().len(), 4);
    }

    #[test]
    fn disassembly_needs_an_instruction_sequence() {
        let mut method = sample();
        method.iseq = Value::Nil;
        assert!(matches!(
            method.disassemble(),
            Err(CompiledFileError::UnexpectedKind {
                expected: "instruction sequence",
                found: "nil"
            })
        ));
    }

    #[test]
    fn corrupt_body_surfaces_the_decode_error() {
        let mut method = sample();
        method.iseq = Value::Iseq(InstructionSequence::from_words(vec![7, 4000]));
        assert!(matches!(
            method.disassemble(),
            Err(CompiledFileError::Bytecode(BytecodeError::DecodeError { offset: 1, .. }))
        ));
    }

    #[test]
    fn field_count_is_checked() {
        assert!(matches!(
            CompiledMethod::from_fields(vec![Value::Nil; 3]),
            Err(CompiledFileError::RecordArity {
                record: "CompiledMethod",
                expected: 14,
                found: 3
            })
        ));
        assert!(matches!(
            CompiledMethod::from_fields(vec![Value::Nil; 15]),
            Err(CompiledFileError::RecordArity { found: 15, .. })
        ));
        let method = CompiledMethod::from_fields(vec![Value::Nil; 14]).unwrap();
        assert!(method.iseq().is_none());
    }
}
