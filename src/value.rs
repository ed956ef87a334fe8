//! Printable values for assertion output.
//!
//! Failure lines show the operands of a comparison. Rather than resolving
//! types at print time, assertion macros convert both sides into a [`Value`]
//! at the call site via [`ToValue`], so the reporter only ever deals with a
//! closed set of variants.

use std::fmt;

use crate::memory::SandboxPtr;

/// A value captured from a failed expectation, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Char(char),
    Str(String),
    /// Single byte, shown as two hex digits.
    Byte(u8),
    /// Sandbox offset, shown pointer-style.
    Ptr(usize),
    /// A `None` operand.
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Uint(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{}", x),
            Value::Char(c) => write!(f, "'{}'", c),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Byte(b) => write!(f, "{:02X}", b),
            Value::Ptr(p) => write!(f, "0x{:08X}", p),
            Value::Null => write!(f, "<NULL>"),
        }
    }
}

/// Conversion into a printable [`Value`].
///
/// Implemented for the primitives a test is likely to compare. `Option`
/// maps `None` to [`Value::Null`] so nullable results print sensibly.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

macro_rules! impl_to_value {
    ($($ty:ty => $variant:ident as $as:ty),+ $(,)?) => {
        $(impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::$variant(*self as $as)
            }
        })+
    };
}

impl_to_value! {
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    isize => Int as i64,
    u16 => Uint as u64,
    u32 => Uint as u64,
    u64 => Uint as u64,
    usize => Uint as u64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl ToValue for char {
    fn to_value(&self) -> Value {
        Value::Char(*self)
    }
}

impl ToValue for u8 {
    fn to_value(&self) -> Value {
        Value::Byte(*self)
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::Str((*self).to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl ToValue for SandboxPtr {
    fn to_value(&self) -> Value {
        Value::Ptr(self.0)
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_quoted_strings_and_chars() {
        assert_eq!(Value::Str("abc".into()).to_string(), "\"abc\"");
        assert_eq!(Value::Char('x').to_string(), "'x'");
    }

    #[test]
    fn displays_bytes_as_hex() {
        assert_eq!(b'X'.to_value().to_string(), "58");
    }

    #[test]
    fn displays_none_as_null() {
        let missing: Option<i32> = None;
        assert_eq!(missing.to_value().to_string(), "<NULL>");
        assert_eq!(Some(7).to_value().to_string(), "7");
    }

    #[test]
    fn displays_pointers_with_fixed_width() {
        assert_eq!(SandboxPtr(7).to_value().to_string(), "0x00000007");
    }
}
