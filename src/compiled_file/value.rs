//! Value graph persisted in compiled files.

use crate::bytecode::encoder::InstructionSequence;
use crate::compiled_file::compiled_method::CompiledMethod;
use num_bigint::BigInt;
use std::fmt;

/// Symbol name, stored as raw bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Symbol(Vec<u8>);

impl Symbol {
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        Self(name.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", String::from_utf8_lossy(&self.0))
    }
}

/// One node of a marshalled value graph.
///
/// The tree is owned, so it cannot contain cycles.
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    True,
    False,
    Integer(i64),
    /// Integer outside the `i64` range. [`Value::integer`] keeps in-range
    /// values as [`Value::Integer`].
    BigInteger(BigInt),
    Float(f64),
    String(Vec<u8>),
    Symbol(Symbol),
    /// Inline-cache placeholder naming the method it will look up.
    SendSite(Symbol),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    Iseq(InstructionSequence),
    Method(Box<CompiledMethod>),
}

impl PartialEq for Value {
    /// Floats compare NaN-equal-to-NaN and otherwise bitwise, so `0.0 != -0.0`.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) | (Value::True, Value::True) | (Value::False, Value::False) => {
                true
            }
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::BigInteger(a), Value::BigInteger(b)) => a == b,
            (Value::Integer(a), Value::BigInteger(b)) | (Value::BigInteger(b), Value::Integer(a)) => {
                BigInt::from(*a) == *b
            }
            (Value::Float(a), Value::Float(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::SendSite(a), Value::SendSite(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Iseq(a), Value::Iseq(b)) => a == b,
            (Value::Method(a), Value::Method(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Short name of the node kind, for error messages.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::True => "true",
            Value::False => "false",
            Value::Integer(_) | Value::BigInteger(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::SendSite(_) => "send site",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
            Value::Iseq(_) => "instruction sequence",
            Value::Method(_) => "compiled method",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Builds an integer node, using [`Value::Integer`] whenever the value fits.
    pub fn integer(value: impl Into<BigInt>) -> Self {
        let value = value.into();
        match i64::try_from(&value) {
            Ok(small) => Value::Integer(small),
            Err(_) => Value::BigInteger(value),
        }
    }

    /// Builds a string node from UTF-8 text.
    pub fn string(text: &str) -> Self {
        Value::String(text.as_bytes().to_vec())
    }

    pub fn symbol(name: &str) -> Self {
        Value::Symbol(Symbol::from(name))
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::True => Some(true),
            Value::False => Some(false),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a tuple node.
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Elements of an array node.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_iseq(&self) -> Option<&InstructionSequence> {
        match self {
            Value::Iseq(iseq) => Some(iseq),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&CompiledMethod> {
        match self {
            Value::Method(method) => Some(method),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        if v { Value::True } else { Value::False }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<BigInt> for Value {
    fn from(v: BigInt) -> Self {
        Value::integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Symbol> for Value {
    fn from(v: Symbol) -> Self {
        Value::Symbol(v)
    }
}

impl From<InstructionSequence> for Value {
    fn from(v: InstructionSequence) -> Self {
        Value::Iseq(v)
    }
}

impl From<CompiledMethod> for Value {
    fn from(v: CompiledMethod) -> Self {
        Value::Method(Box::new(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_equality_rules() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(-f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_eq!(Value::Float(1.5), Value::Float(1.5));
        assert_ne!(Value::Float(1.0), Value::Integer(1));
    }

    #[test]
    fn string_and_symbol_are_distinct() {
        assert_ne!(Value::string("a"), Value::symbol("a"));
        assert_ne!(Value::symbol("a"), Value::SendSite(Symbol::from("a")));
        assert_ne!(Value::Array(vec![]), Value::Tuple(vec![]));
    }

    #[test]
    fn accessors_reject_other_kinds() {
        let v = Value::Integer(3);
        assert_eq!(v.as_integer(), Some(3));
        assert!(v.as_tuple().is_none());
        assert!(v.as_symbol().is_none());
        assert_eq!(Value::True.as_bool(), Some(true));
        assert_eq!(Value::Nil.as_bool(), None);
        assert_eq!(Value::from(None::<i64>), Value::Nil);
        assert_eq!(Value::from(Some(2i64)), Value::Integer(2));
    }

    #[test]
    fn integers_normalize_by_range() {
        assert!(matches!(Value::integer(BigInt::from(-5)), Value::Integer(-5)));
        assert!(matches!(Value::integer(i64::MIN), Value::Integer(i64::MIN)));
        let big = BigInt::from(i64::MAX) + 1u8;
        assert!(matches!(Value::from(big.clone()), Value::BigInteger(_)));
        assert_eq!(Value::BigInteger(BigInt::from(7)), Value::Integer(7));
        assert_ne!(Value::BigInteger(big.clone()), Value::Integer(i64::MAX));
        assert_eq!(Value::from(big).kind_name(), "integer");
        assert_eq!(Value::integer(BigInt::from(9)).as_integer(), Some(9));
    }

    #[test]
    fn symbol_display() {
        assert_eq!(Symbol::from("each").to_string(), ":each");
        assert_eq!(Value::tuple([1i64.into(), 2i64.into()]).kind_name(), "tuple");
    }
}
