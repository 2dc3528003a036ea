// The set of fatal runtime errors.
//
// All are non-recoverable: the IR has no catch construct, so every
// variant propagates straight out of the evaluator and the driver
// reports it once. Variants compare structurally so tests can assert
// on exact failures.

use thiserror::Error;

use crate::program::Type;
use crate::value::{Kind, KindSet};


// The result of any operation that can fail at run-time.
pub type Result<T> = core::result::Result<T, Error>;


#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    // Malformed instructions.
    #[error("unknown opcode '{0}'")]
    UnknownOp(String),
    #[error("'{op}' takes {want} arguments, got {got}")]
    Arity { op: String, want: usize, got: usize },
    #[error("'ret' takes 0 or 1 arguments, got {0}")]
    RetArity(usize),
    #[error("'{0}' cannot produce a value")]
    NotAValueOp(String),
    #[error("'{0}' cannot appear in effect position")]
    NotAnEffectOp(String),
    #[error("'{0}' is missing a label")]
    MissingLabel(String),
    #[error("'call' takes exactly one function reference, got {0}")]
    BadFuncRefs(usize),
    #[error("'phi' has {labels} labels but {args} arguments")]
    PhiMismatch { labels: usize, args: usize },

    // Type errors.
    #[error("type error: expected {expect:?}, got {got:?}")]
    TypeError { expect: KindSet, got: Kind },
    #[error("type of alloc must be a pointer, not {0}")]
    AllocType(Type),
    #[error("argument '{arg}' to '{func}' does not satisfy {ty}")]
    BadCallArg { func: String, arg: String, ty: Type },
    #[error("'{0}' declares no return type")]
    NoReturnType(String),
    #[error("call to '{0}' produced no return value")]
    MissingReturn(String),
    #[error("effect call to '{0}' cannot take a return value")]
    UnexpectedReturn(String),
    #[error("return type of '{0}' does not match the call site")]
    ReturnTypeMismatch(String),

    // Name errors.
    #[error("undefined variable '{0}'")]
    Undefined(String),
    #[error("no function named '{0}'")]
    UnknownFunc(String),
    #[error("duplicate function '{0}'")]
    DuplicateFunc(String),
    #[error("no main function")]
    NoMain,
    #[error("label '{0}' not found")]
    UnresolvedLabel(String),
    #[error("call to '{func}' takes {want} arguments, got {got}")]
    CallArity { func: String, want: usize, got: usize },

    // Memory errors.
    #[error("cannot allocate {0} entries")]
    CannotAlloc(i64),
    #[error("Tried to free illegal memory location base: {0}, offset: {1}. Offset must be 0.")]
    IllegalFree(usize, i64),
    #[error("Uninitialized heap location {0} and/or illegal offset {1}")]
    BadAccess(usize, i64),
    #[error("Pointer '{0}' points to uninitialized data")]
    Uninitialized(String),
    #[error("Some memory locations have not been freed by the end of execution")]
    Leak,
    #[error("division by zero")]
    DivideByZero,

    // Control errors.
    #[error("'{0}' not allowed during speculation")]
    NotDuringSpeculation(String),
    #[error("'{0}' with no speculation in progress")]
    NotSpeculating(String),
    #[error("implicit return in speculative state")]
    SpeculativeReturn,

    // Input errors.
    #[error("expected {want} arguments to main, got {got}")]
    MainArity { want: usize, got: usize },
    #[error("can't parse '{text}' as {ty}")]
    BadMainArg { ty: Type, text: String },

    #[error("io error: {0}")]
    Io(String),
}
