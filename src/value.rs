// The runtime value domain.
//
// Values are tagged, and nothing in the evaluator coerces silently.
// `Kind` is the runtime discriminant, kept as a bitflag so a type
// error can name the whole set of kinds an operation would accept.

use std::fmt;

use enumflags2::BitFlags;

use crate::error::{Error, Result};
use crate::program::Type;


#[derive(BitFlags, Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum Kind {
    Int   = 0b0001,
    Bool  = 0b0010,
    Float = 0b0100,
    Ptr   = 0b1000,
}


pub type KindSet = BitFlags<Kind>;


// Location of a heap cell: an allocation base plus a signed index.
// Equality and hashing are structural on both fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    pub base: usize,
    pub offset: i64,
}

impl Key {
    pub fn add(&self, offset: i64) -> Key {
        Key {
            base: self.base,
            offset: self.offset.wrapping_add(offset),
        }
    }
}


// A typed pointer: where it points, and what it points at.
#[derive(Clone, Debug, PartialEq)]
pub struct Pointer {
    pub key: Key,
    pub ty: Type,
}


#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Float(f64),
    Ptr(Pointer),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Int(_) => Kind::Int,
            Value::Bool(_) => Kind::Bool,
            Value::Float(_) => Kind::Float,
            Value::Ptr(_) => Kind::Ptr,
        }
    }
}


// Construct a type error from the set of kinds an operation accepts.
pub fn expected(expect: KindSet, got: &Value) -> Error {
    Error::TypeError { expect, got: got.kind() }
}


// The runtime kind a declared type calls for.
pub fn kind_of(ty: &Type) -> Kind {
    match ty {
        Type::Int => Kind::Int,
        Type::Bool => Kind::Bool,
        Type::Float => Kind::Float,
        Type::Ptr(_) => Kind::Ptr,
    }
}


// Dynamic check of a value against a declared type. Pointee types are
// not re-checked here: a pointer satisfies any `ptr<T>`.
pub fn type_check(value: &Value, ty: &Type) -> bool {
    value.kind() == kind_of(ty)
}


// Like core::convert::TryInto, except that it returns our runtime
// Result, so a mismatched kind surfaces as an ordinary type error.
pub trait TryInto<T> {
    fn try_into(self) -> Result<T>;
}


// Factors out the boilerplate in the accessor implementations.
macro_rules! impl_try_into {
    ($variant:ident => $type:ty) => {
        impl TryInto<$type> for Value {
            fn try_into(self) -> Result<$type> {
                match self {
                    Value::$variant(value) => Ok(value),
                    v => Err(expected(BitFlags::from_flag(Kind::$variant), &v))
                }
            }
        }
    }
}

impl_try_into! { Int   => i64 }
impl_try_into! { Bool  => bool }
impl_try_into! { Float => f64 }
impl_try_into! { Ptr   => Pointer }


impl fmt::Display for Value {
    // `print` renders ints in decimal, bools as literals, floats with
    // the host's natural rendering, and pointers as ptr<BASE+OFFSET>.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Ptr(p) => write!(f, "ptr<{}+{}>", p.key.base, p.key.offset),
        }
    }
}
