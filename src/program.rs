// The in-memory form of an IR program.
//
// Programs arrive fully parsed: the shapes below are exactly the JSON
// wire format, and serde is the front end. A function body is a flat
// sequence of labels and instructions; instructions come in three
// shapes. Constants carry a literal. Value operations name a
// destination and its declared type. Effect operations name neither.

use std::fmt;

use serde::{Deserialize, Serialize};


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
}


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Param>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ret: Option<Type>,
    pub instrs: Vec<Item>,
}


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}


// One element of a function body: a label or an instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Item {
    Label { label: String },
    Instr(Instr),
}


// The single constant opcode, as its own type so the constant shape
// only ever matches `"op": "const"`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConstOp {
    #[serde(rename = "const")]
    Const,
}


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Instr {
    Const {
        op: ConstOp,
        dest: String,
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        ty: Option<Type>,
        value: Literal,
    },
    Value {
        op: String,
        dest: String,
        #[serde(rename = "type")]
        ty: Type,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        funcs: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        labels: Vec<String>,
    },
    Effect {
        op: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        funcs: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        labels: Vec<String>,
    },
}


impl Instr {
    // Opcode name, with constants reporting "const".
    pub fn op(&self) -> &str {
        match self {
            Instr::Const { .. } => "const",
            Instr::Value { op, .. } | Instr::Effect { op, .. } => op,
        }
    }

    pub fn args(&self) -> &[String] {
        match self {
            Instr::Const { .. } => &[],
            Instr::Value { args, .. } | Instr::Effect { args, .. } => args,
        }
    }
}


// Literal kinds are discriminable from the wire format: a number with
// a fraction part is a float, a bare integer is an int.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    Float(f64),
}


// Types are structural: two pointer types are the same exactly when
// their pointee types are (the derived equality).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    Int,
    Bool,
    Float,
    Ptr(Box<Type>),
}


impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Float => write!(f, "float"),
            Type::Ptr(inner) => write!(f, "ptr<{}>", inner),
        }
    }
}
