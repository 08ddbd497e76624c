//! Marshaller for compiled-file bodies.
//!
//! Every node starts with a one-byte tag:
//!
//! | tag | node | payload |
//! |---|---|---|
//! | `t` `f` `n` | true, false, nil | none |
//! | `I` | integer >= 0 | varint value, any length |
//! | `J` | integer < 0 | varint magnitude, any length |
//! | `d` | float | text line, see [`float`](super::float) |
//! | `s` | string | varint length, bytes |
//! | `x` | symbol | varint length, bytes |
//! | `S` | send site | varint length, bytes |
//! | `A` | array | varint count, nodes |
//! | `p` | tuple | varint count, nodes |
//! | `i` | instruction sequence | varint count, untagged varint words |
//! | `M` | compiled method | varint record version, 14 nodes |

use crate::bytecode::encoder::InstructionSequence;
use crate::compiled_file::compiled_method::CompiledMethod;
use crate::compiled_file::errors::CompiledFileError;
use crate::compiled_file::float::{parse_float, write_float};
use crate::compiled_file::value::{Symbol, Value};
use crate::compiled_file::varint::{Reader, write_uleb128_big, write_uleb128_u64};
use crate::config::Config;
use num_bigint::{BigInt, Sign};

pub const TAG_TRUE: u8 = b't';
pub const TAG_FALSE: u8 = b'f';
pub const TAG_NIL: u8 = b'n';
pub const TAG_INTEGER: u8 = b'I';
pub const TAG_NEGATIVE_INTEGER: u8 = b'J';
pub const TAG_FLOAT: u8 = b'd';
pub const TAG_STRING: u8 = b's';
pub const TAG_SYMBOL: u8 = b'x';
pub const TAG_SEND_SITE: u8 = b'S';
pub const TAG_ARRAY: u8 = b'A';
pub const TAG_TUPLE: u8 = b'p';
pub const TAG_ISEQ: u8 = b'i';
pub const TAG_METHOD: u8 = b'M';

/// Record version written after the `M` tag.
pub const METHOD_RECORD_VERSION: u64 = 1;

/// Types that can be written as a marshalled node.
pub trait Marshal {
    fn marshal(&self, out: &mut Vec<u8>);
}

/// Fixed-order record of marshalled fields, derived with `#[derive(MarshalRecord)]`.
pub trait MarshalRecord: Sized {
    /// Field names in marshal order.
    const FIELD_NAMES: &'static [&'static str];

    fn marshal_fields(&self, out: &mut Vec<u8>);

    /// Builds the record from its field nodes, in marshal order.
    fn from_fields(fields: Vec<Value>) -> Result<Self, CompiledFileError>;
}

fn write_bytes(out: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
    out.push(tag);
    write_uleb128_u64(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn write_items(out: &mut Vec<u8>, tag: u8, items: &[Value]) {
    out.push(tag);
    write_uleb128_u64(out, items.len() as u64);
    for item in items {
        item.marshal(out);
    }
}

impl Marshal for Value {
    fn marshal(&self, out: &mut Vec<u8>) {
        match self {
            Value::True => out.push(TAG_TRUE),
            Value::False => out.push(TAG_FALSE),
            Value::Nil => out.push(TAG_NIL),
            Value::Integer(v) => {
                let tag = if *v < 0 { TAG_NEGATIVE_INTEGER } else { TAG_INTEGER };
                out.push(tag);
                write_uleb128_u64(out, v.unsigned_abs());
            }
            Value::BigInteger(v) => {
                let tag = if v.sign() == Sign::Minus { TAG_NEGATIVE_INTEGER } else { TAG_INTEGER };
                out.push(tag);
                write_uleb128_big(out, v.magnitude());
            }
            Value::Float(v) => {
                out.push(TAG_FLOAT);
                write_float(out, *v);
            }
            Value::String(bytes) => write_bytes(out, TAG_STRING, bytes),
            Value::Symbol(sym) => write_bytes(out, TAG_SYMBOL, sym.as_bytes()),
            Value::SendSite(sym) => write_bytes(out, TAG_SEND_SITE, sym.as_bytes()),
            Value::Array(items) => write_items(out, TAG_ARRAY, items),
            Value::Tuple(items) => write_items(out, TAG_TUPLE, items),
            Value::Iseq(iseq) => iseq.marshal(out),
            Value::Method(method) => method.marshal(out),
        }
    }
}

impl Marshal for InstructionSequence {
    fn marshal(&self, out: &mut Vec<u8>) {
        out.push(TAG_ISEQ);
        write_uleb128_u64(out, self.len() as u64);
        for word in self.words() {
            write_uleb128_u64(out, *word);
        }
    }
}

impl Marshal for CompiledMethod {
    fn marshal(&self, out: &mut Vec<u8>) {
        out.push(TAG_METHOD);
        write_uleb128_u64(out, METHOD_RECORD_VERSION);
        self.marshal_fields(out);
    }
}

#[derive(Clone, Copy, Debug)]
enum Container {
    Array,
    Tuple,
    Method,
}

/// A container whose children are still being read.
struct Open {
    container: Container,
    expected: usize,
    items: Vec<Value>,
}

impl Open {
    fn new(container: Container, expected: usize, remaining: usize) -> Self {
        // Every node takes at least one byte, which bounds the allocation.
        Self {
            container,
            expected,
            items: Vec::with_capacity(expected.min(remaining)),
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.expected
    }

    fn close(self) -> Result<Value, CompiledFileError> {
        Ok(match self.container {
            Container::Array => Value::Array(self.items),
            Container::Tuple => Value::Tuple(self.items),
            Container::Method => {
                let mut method = CompiledMethod::from_fields(self.items)?;
                method.restore_stack_depth();
                Value::from(method)
            }
        })
    }
}

enum Node {
    Leaf(Value),
    Open(Open),
}

/// Cursor over marshalled bytes with a nesting limit.
pub struct Unmarshaller<'a> {
    reader: Reader<'a>,
    max_depth: usize,
}

impl<'a> Unmarshaller<'a> {
    pub fn new(bytes: &'a [u8], config: &Config) -> Self {
        Self {
            reader: Reader::new(bytes),
            max_depth: config.max_nesting_depth,
        }
    }

    /// Byte offset of the next unread byte.
    pub fn offset(&self) -> usize {
        self.reader.offset()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    /// Reads one node and everything it contains.
    ///
    /// Unfinished containers live on a heap stack, so the call stack stays flat
    /// however deep the input nests. A node is rejected once `max_depth`
    /// containers enclose it.
    pub fn read_value(&mut self) -> Result<Value, CompiledFileError> {
        let mut open: Vec<Open> = Vec::new();
        'read: loop {
            if open.len() >= self.max_depth {
                return Err(CompiledFileError::NestingTooDeep {
                    limit: self.max_depth,
                });
            }
            let mut value = match self.read_node()? {
                Node::Leaf(value) => value,
                Node::Open(container) if container.is_full() => container.close()?,
                Node::Open(container) => {
                    open.push(container);
                    continue;
                }
            };
            while let Some(mut parent) = open.pop() {
                parent.items.push(value);
                if !parent.is_full() {
                    open.push(parent);
                    continue 'read;
                }
                value = parent.close()?;
            }
            return Ok(value);
        }
    }

    fn read_node(&mut self) -> Result<Node, CompiledFileError> {
        let offset = self.reader.offset();
        let tag = self.reader.read_u8()?;
        let value = match tag {
            TAG_TRUE => Value::True,
            TAG_FALSE => Value::False,
            TAG_NIL => Value::Nil,
            TAG_INTEGER | TAG_NEGATIVE_INTEGER => {
                let magnitude = self.reader.read_uleb128_big()?;
                let sign = if tag == TAG_NEGATIVE_INTEGER { Sign::Minus } else { Sign::Plus };
                Value::integer(BigInt::from_biguint(sign, magnitude))
            }
            TAG_FLOAT => Value::Float(parse_float(self.reader.read_line()?)?),
            TAG_STRING => Value::String(self.read_counted_bytes()?.to_vec()),
            TAG_SYMBOL => Value::Symbol(Symbol::new(self.read_counted_bytes()?)),
            TAG_SEND_SITE => Value::SendSite(Symbol::new(self.read_counted_bytes()?)),
            TAG_ARRAY => return self.open(Container::Array),
            TAG_TUPLE => return self.open(Container::Tuple),
            TAG_ISEQ => Value::Iseq(self.read_iseq()?),
            TAG_METHOD => {
                let version = self.reader.read_uleb128_u64()?;
                if version != METHOD_RECORD_VERSION {
                    return Err(CompiledFileError::UnsupportedVersion {
                        what: "compiled method",
                        found: version.to_string(),
                    });
                }
                let fields = CompiledMethod::FIELD_NAMES.len();
                return Ok(Node::Open(Open::new(Container::Method, fields, self.reader.remaining())));
            }
            _ => return Err(CompiledFileError::UnsupportedTag { tag, offset }),
        };
        Ok(Node::Leaf(value))
    }

    fn open(&mut self, container: Container) -> Result<Node, CompiledFileError> {
        let count = self.reader.read_len()?;
        Ok(Node::Open(Open::new(container, count, self.reader.remaining())))
    }

    fn read_counted_bytes(&mut self) -> Result<&'a [u8], CompiledFileError> {
        let len = self.reader.read_len()?;
        self.reader.read_bytes(len)
    }

    fn read_iseq(&mut self) -> Result<InstructionSequence, CompiledFileError> {
        let count = self.reader.read_len()?;
        let mut words = Vec::with_capacity(count.min(self.reader.remaining()));
        for _ in 0..count {
            words.push(self.reader.read_uleb128_u64()?);
        }
        Ok(InstructionSequence::from_words(words))
    }
}

/// Marshals a value into a fresh buffer.
pub fn marshal(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    value.marshal(&mut out);
    out
}

/// Unmarshals exactly one value from `bytes` with the default configuration.
pub fn unmarshal(bytes: &[u8]) -> Result<Value, CompiledFileError> {
    unmarshal_with(bytes, &Config::default())
}

/// Unmarshals exactly one value from `bytes`; trailing bytes are an error.
pub fn unmarshal_with(bytes: &[u8], config: &Config) -> Result<Value, CompiledFileError> {
    let mut input = Unmarshaller::new(bytes, config);
    let value = input.read_value()?;
    if !input.is_empty() {
        return Err(CompiledFileError::TrailingBytes {
            count: bytes.len() - input.offset(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::encoder::{Instruction, encode};
    use crate::bytecode::isa::Opcode;
    use std::thread;

    fn round_trip(value: Value) {
        let bytes = marshal(&value);
        assert_eq!(unmarshal(&bytes).unwrap(), value, "{bytes:?}");
    }

    #[test]
    fn round_trips_scalars() {
        round_trip(Value::Nil);
        round_trip(Value::True);
        round_trip(Value::False);
        round_trip(Value::Integer(0));
        round_trip(Value::Integer(-1));
        round_trip(Value::Integer(123456789012345));
        round_trip(Value::Integer(i64::MAX));
        round_trip(Value::Integer(i64::MIN));
    }

    #[test]
    fn round_trips_floats() {
        round_trip(Value::Float(0.0));
        round_trip(Value::Float(-0.0));
        round_trip(Value::Float(f64::INFINITY));
        round_trip(Value::Float(f64::NEG_INFINITY));
        round_trip(Value::Float(f64::NAN));
        round_trip(Value::Float(std::f64::consts::PI));
        round_trip(Value::Float(f64::MAX));
    }

    #[test]
    fn round_trips_bytes() {
        round_trip(Value::String(Vec::new()));
        round_trip(Value::String(b"a\0b".to_vec()));
        round_trip(Value::symbol("each_with_index"));
        round_trip(Value::SendSite(Symbol::from("+")));
    }

    #[test]
    fn round_trips_containers() {
        round_trip(Value::Array(vec![]));
        round_trip(Value::Array(vec![
            Value::Integer(1),
            Value::Array(vec![Value::Integer(2), Value::Integer(3)]),
        ]));
        round_trip(Value::tuple([
            Value::symbol("a"),
            Value::Nil,
            Value::Float(2.5),
        ]));
    }

    #[test]
    fn round_trips_instruction_sequence() {
        let iseq = encode(&[
            Instruction::new(Opcode::PushInt, [300]).unwrap(),
            Instruction::new(Opcode::PushInt, [2]).unwrap(),
            Instruction::bare(Opcode::MetaSendOpMinus),
            Instruction::new(Opcode::SetLocal, [0]).unwrap(),
            Instruction::bare(Opcode::Ret),
        ])
        .unwrap();
        let bytes = marshal(&Value::Iseq(iseq.clone()));
        assert_eq!(bytes, vec![b'i', 8, 4, 0xac, 0x02, 4, 2, 75, 17, 0, 12]);
        round_trip(Value::Iseq(iseq));
    }

    #[test]
    fn exact_byte_layouts() {
        assert_eq!(marshal(&Value::Integer(0)), b"I\0");
        assert_eq!(marshal(&Value::Integer(-1)), b"J\x01");
        assert_eq!(marshal(&Value::Integer(128)), b"I\x80\x01");
        assert_eq!(marshal(&Value::symbol("ab")), b"x\x02ab");
        assert_eq!(marshal(&Value::Float(f64::NAN)), b"dNaN\n");
        assert_eq!(
            marshal(&Value::tuple([Value::True, Value::Nil])),
            b"p\x02tn"
        );
        assert_eq!(
            marshal(&Value::Array(vec![Value::string("hi")])),
            b"A\x01s\x02hi"
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            unmarshal(b"A\x01z"),
            Err(CompiledFileError::UnsupportedTag { tag: b'z', offset: 2 })
        ));
        assert!(matches!(
            unmarshal(b"\n"),
            Err(CompiledFileError::UnsupportedTag { tag: b'\n', offset: 0 })
        ));
    }

    #[test]
    fn truncated_input_is_rejected() {
        for bytes in [&b""[..], b"I", b"I\x80", b"s\x05abc", b"p\x02t", b"d 0.5", b"i\x02\x01"] {
            assert!(
                matches!(unmarshal(bytes), Err(CompiledFileError::UnexpectedEof { .. })),
                "{bytes:?}"
            );
        }
    }

    #[test]
    fn integers_past_64_bits() {
        let two = BigInt::from(2u8);
        for big in [two.pow(63), two.pow(64), two.pow(70), -two.pow(70), -(two.pow(63) + 1u8)] {
            let value = Value::integer(big.clone());
            assert!(matches!(value, Value::BigInteger(ref n) if *n == big), "{big}");
            round_trip(value);
        }

        let mut expected = vec![b'I'];
        expected.extend([0x80; 10]);
        expected.push(0x01);
        assert_eq!(marshal(&Value::integer(two.pow(70))), expected);
        expected[0] = b'J';
        assert_eq!(marshal(&Value::integer(-two.pow(70))), expected);
    }

    #[test]
    fn integer_boundaries_stay_small() {
        let mut bytes = vec![b'I'];
        write_uleb128_u64(&mut bytes, u64::MAX);
        assert_eq!(
            unmarshal(&bytes).unwrap(),
            Value::BigInteger(BigInt::from(u64::MAX))
        );

        let mut bytes = vec![b'J'];
        write_uleb128_u64(&mut bytes, 1u64 << 63);
        assert!(matches!(unmarshal(&bytes).unwrap(), Value::Integer(i64::MIN)));

        let mut bytes = vec![b'I'];
        write_uleb128_u64(&mut bytes, i64::MAX as u64);
        assert!(matches!(unmarshal(&bytes).unwrap(), Value::Integer(i64::MAX)));

        let mut bytes = vec![b'J'];
        write_uleb128_u64(&mut bytes, (1u64 << 63) + 1);
        assert!(matches!(unmarshal(&bytes).unwrap(), Value::BigInteger(_)));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        assert!(matches!(
            unmarshal(b"tn"),
            Err(CompiledFileError::TrailingBytes { count: 1 })
        ));
    }

    #[test]
    fn nesting_limit() {
        let config = Config {
            max_nesting_depth: 4,
            ..Config::default()
        };
        let mut nested = Value::Nil;
        for _ in 0..3 {
            nested = Value::Array(vec![nested]);
        }
        let bytes = marshal(&nested);
        assert_eq!(unmarshal_with(&bytes, &config).unwrap(), nested);

        let deeper = Value::Array(vec![nested]);
        assert!(matches!(
            unmarshal_with(&marshal(&deeper), &config),
            Err(CompiledFileError::NestingTooDeep { limit: 4 })
        ));
    }

    #[test]
    fn self_nesting_input_fails_instead_of_recursing() {
        let bytes = vec![b'A', 0x01].repeat(100_000);
        assert!(matches!(
            unmarshal(&bytes),
            Err(CompiledFileError::NestingTooDeep { .. })
        ));
    }

    #[test]
    fn depth_limit_holds_on_a_small_thread_stack() {
        let handle = thread::Builder::new()
            .stack_size(2 << 20)
            .spawn(|| {
                let limit = Config::default().max_nesting_depth;

                let mut at_limit = vec![b'A', 0x01].repeat(limit - 1);
                at_limit.push(b'n');
                let accepted = unmarshal(&at_limit).is_ok();

                let mut past_limit = vec![b'A', 0x01].repeat(limit);
                past_limit.push(b'n');
                let rejected = matches!(
                    unmarshal(&past_limit),
                    Err(CompiledFileError::NestingTooDeep { .. })
                );

                let runaway = matches!(
                    unmarshal(&vec![b'A', 0x01].repeat(100_000)),
                    Err(CompiledFileError::NestingTooDeep { .. })
                );
                (accepted, rejected, runaway)
            })
            .unwrap();
        assert_eq!(handle.join().unwrap(), (true, true, true));
    }

    #[test]
    fn nested_methods_and_tuples_close_in_order() {
        let inner = CompiledMethod::new(
            "inner",
            encode(&[Instruction::bare(Opcode::PushNil), Instruction::bare(Opcode::Ret)]).unwrap(),
        );
        let outer = CompiledMethod::new("outer", encode(&[Instruction::bare(Opcode::Ret)]).unwrap())
            .with_literals(vec![
                Value::tuple([Value::from(inner.clone()), Value::Array(vec![])]),
                Value::string("tail"),
            ]);
        let decoded = unmarshal(&marshal(&Value::from(outer.clone()))).unwrap();
        assert_eq!(decoded, Value::from(outer));
        let literal = &decoded.as_method().unwrap().literals()[0];
        let nested = literal.as_tuple().unwrap()[0].as_method().unwrap();
        assert_eq!(nested.iseq().unwrap().stack_depth(), 1);
    }

    #[test]
    fn unsupported_method_version_stops_decoding() {
        let bytes = b"M\x02garbage";
        assert!(matches!(
            unmarshal(bytes),
            Err(CompiledFileError::UnsupportedVersion { what: "compiled method", ref found }) if found == "2"
        ));
    }

    #[test]
    fn invalid_float_line() {
        assert!(matches!(
            unmarshal(b"dInf\n"),
            Err(CompiledFileError::InvalidFloat { .. })
        ));
    }
}
