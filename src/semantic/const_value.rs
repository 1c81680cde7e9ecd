//! Compile-time values produced by constant folding

use indexmap::IndexMap;
use std::fmt;

use super::types::Ty;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstValue {
    Int(i32),
    Bool(bool),
    Char(char),
    Str(String),
    Struct {
        name: String,
        fields: IndexMap<String, ConstValue>,
    },
    Enum {
        name: String,
        variant: String,
    },
}

impl ConstValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            ConstValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The type a literal of this value would synthesize.
    pub fn ty(&self) -> Ty {
        match self {
            ConstValue::Int(_) => Ty::IntegerLiteral,
            ConstValue::Bool(_) => Ty::bool(),
            ConstValue::Char(_) => Ty::named("char"),
            ConstValue::Str(_) => Ty::named("str"),
            ConstValue::Struct { name, .. } | ConstValue::Enum { name, .. } => Ty::named(name),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(n) => write!(f, "{}", n),
            ConstValue::Bool(b) => write!(f, "{}", b),
            ConstValue::Char(c) => write!(f, "'{}'", c.escape_default()),
            ConstValue::Str(s) => write!(f, "\"{}\"", s.escape_default()),
            ConstValue::Struct { name, fields } => {
                write!(f, "{} {{ ", name)?;
                for (i, (field, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field, value)?;
                }
                write!(f, " }}")
            }
            ConstValue::Enum { name, variant } => write!(f, "{}::{}", name, variant),
        }
    }
}
