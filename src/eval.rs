// The evaluator for a small typed IR.
//
// *Execution Model*
//
// A program is a set of named functions. A function body is a flat
// sequence of labels and typed instructions, executed in textual
// order until an instruction says otherwise: each instruction returns
// an Action, and the function evaluator drives a small state machine
// over it. Calls recurse through the same machinery with a fresh
// frame.
//
// *State*
//
// State splits in two. Frame-local state (the environment, the last
// and current labels, and the speculation snapshot chain) belongs to
// one activation and dies with it. Shared state (the heap, the
// reference counter, the tracer, and the dynamic instruction count)
// lives on the interpreter core, so every activation mutates the same
// objects in place.
//
// *Speculation*
//
// `speculate` opens a region whose frame-local effects can be thrown
// away: a snapshot of the frame is pushed, and `guard` aborts to a
// recovery label by restoring it. Effects that escaped to shared
// state, including the instruction count, are deliberately not rolled
// back, and calls are refused inside the region.
//
// *Phi*
//
// Crossing a label records it; `phi` selects among its sources by the
// label crossed before the current one, which is what makes the IR's
// SSA form executable.
//
// *Validity*
//
// The instruction set is strongly typed and every contract is checked
// at run-time. All violations are fatal; the Error enum in error.rs
// enumerates them.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use enumflags2::BitFlags;

use crate::driver::Options;
use crate::env::Env;
use crate::error::{Error, Result};
use crate::gc::RefCounter;
use crate::heap::Heap;
use crate::program::{Function, Instr, Item, Literal, Type};
use crate::tracer::Tracer;
use crate::value::{expected, kind_of, type_check, Pointer, TryInto, Value};


// What an instruction tells the function evaluator to do next.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Next,
    Jump(String),
    End(Option<Value>),
    Speculate,
    Commit,
    Abort(String),
}


// Frame-local state saved at `speculate` and restored on abort.
#[derive(Debug)]
struct Snapshot {
    env: Env,
    lastlabel: Option<String>,
    curlabel: Option<String>,
    parent: Option<Box<Snapshot>>,
}


// One activation: its bindings, its position in the label graph, and
// its speculation chain. Shared resources live on Interp and are
// never part of a snapshot.
#[derive(Debug)]
pub struct Frame {
    pub env: Env,
    lastlabel: Option<String>,
    curlabel: Option<String>,
    spec: Option<Box<Snapshot>>,
}

impl Frame {
    pub fn new(env: Env) -> Frame {
        Frame {
            env,
            lastlabel: None,
            curlabel: None,
            spec: None,
        }
    }

    fn speculating(&self) -> bool {
        self.spec.is_some()
    }
}


// The interpreter core. One instance serves every activation: calls
// get fresh frames, not fresh interpreters.
pub struct Interp<'p, W: Write> {
    funcs: HashMap<&'p str, &'p Function>,
    opts: Options,
    heap: Heap,
    gc: RefCounter,
    tracer: Tracer,
    icount: u64,
    out: W,
}


// Expected argument counts. `None` means the op checks its own count.
fn arity(op: &str) -> Result<Option<usize>> {
    Ok(match op {
        "id" | "not" | "br" | "alloc" | "free" | "load" | "guard" => Some(1),
        "add" | "sub" | "mul" | "div"
        | "lt" | "le" | "gt" | "ge" | "eq"
        | "and" | "or"
        | "fadd" | "fsub" | "fmul" | "fdiv"
        | "flt" | "fle" | "fgt" | "fge" | "feq"
        | "store" | "ptradd" => Some(2),
        "jmp" | "nop" | "speculate" | "commit" => Some(0),
        "print" | "call" | "ret" | "phi" => None,
        op => return Err(Error::UnknownOp(op.to_string())),
    })
}


// Fetch a variable, failing on unbound names.
fn lookup<'e>(env: &'e Env, name: &str) -> Result<&'e Value> {
    env.get(name).ok_or_else(|| Error::Undefined(name.to_string()))
}


// Fetch argument `i` and convert it to the expected representation.
fn arg_as<T>(env: &Env, args: &[String], i: usize) -> Result<T>
where
    Value: TryInto<T>,
{
    lookup(env, &args[i])?.clone().try_into()
}


// The i'th label of a control op.
fn target(op: &str, labels: &[String], i: usize) -> Result<String> {
    labels
        .get(i)
        .cloned()
        .ok_or_else(|| Error::MissingLabel(op.to_string()))
}


// Index of a label item within a function body.
fn find_label(func: &Function, label: &str) -> Result<usize> {
    func.instrs
        .iter()
        .position(|item| matches!(item, Item::Label { label: l } if l == label))
        .ok_or_else(|| Error::UnresolvedLabel(label.to_string()))
}


// Constants declared float store as floats; numeric literals under
// any other declared type floor to an integer; everything else stores
// the literal as written.
fn const_value(ty: Option<&Type>, literal: &Literal) -> Value {
    match (ty, literal) {
        (Some(Type::Float), Literal::Int(i)) => Value::Float(*i as f64),
        (Some(Type::Float), Literal::Float(f)) => Value::Float(*f),
        (Some(_), Literal::Int(i)) => Value::Int(*i),
        (Some(_), Literal::Float(f)) => Value::Int(f.floor() as i64),
        (_, Literal::Bool(b)) => Value::Bool(*b),
        (None, Literal::Int(i)) => Value::Int(*i),
        (None, Literal::Float(f)) => Value::Float(*f),
    }
}


// Integer arithmetic wraps to 64 bits; division by zero is fatal.
fn int_arith(op: &str, args: &[String], env: &Env) -> Result<Value> {
    let a: i64 = arg_as(env, args, 0)?;
    let b: i64 = arg_as(env, args, 1)?;
    Ok(Value::Int(match op {
        "add" => a.wrapping_add(b),
        "sub" => a.wrapping_sub(b),
        "mul" => a.wrapping_mul(b),
        _ => {
            if b == 0 {
                return Err(Error::DivideByZero);
            }
            a.wrapping_div(b)
        }
    }))
}


fn int_compare(op: &str, args: &[String], env: &Env) -> Result<Value> {
    let a: i64 = arg_as(env, args, 0)?;
    let b: i64 = arg_as(env, args, 1)?;
    Ok(Value::Bool(match op {
        "lt" => a < b,
        "le" => a <= b,
        "gt" => a > b,
        "ge" => a >= b,
        _ => a == b,
    }))
}


fn bool_logic(op: &str, args: &[String], env: &Env) -> Result<Value> {
    let a: bool = arg_as(env, args, 0)?;
    let b: bool = arg_as(env, args, 1)?;
    Ok(Value::Bool(if op == "and" { a && b } else { a || b }))
}


fn float_arith(op: &str, args: &[String], env: &Env) -> Result<Value> {
    let a: f64 = arg_as(env, args, 0)?;
    let b: f64 = arg_as(env, args, 1)?;
    Ok(Value::Float(match op {
        "fadd" => a + b,
        "fsub" => a - b,
        "fmul" => a * b,
        _ => a / b,
    }))
}


fn float_compare(op: &str, args: &[String], env: &Env) -> Result<Value> {
    let a: f64 = arg_as(env, args, 0)?;
    let b: f64 = arg_as(env, args, 1)?;
    Ok(Value::Bool(match op {
        "flt" => a < b,
        "fle" => a <= b,
        "fgt" => a > b,
        "fge" => a >= b,
        _ => a == b,
    }))
}


impl<'p, W: Write> Interp<'p, W> {
    pub fn new(funcs: HashMap<&'p str, &'p Function>, opts: Options, out: W) -> Interp<'p, W> {
        let hot = opts.hot;
        Interp {
            funcs,
            opts,
            heap: Heap::new(),
            gc: RefCounter::new(),
            tracer: Tracer::new(hot),
            icount: 0,
            out,
        }
    }

    // Dynamic instructions executed so far, aborted regions included.
    pub fn icount(&self) -> u64 {
        self.icount
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    // End-of-program release of everything the counter still tracks.
    pub fn sweep(&mut self) {
        self.gc.sweep(&mut self.heap);
    }

    // Serialize the trace map, name-sorted, one JSON object per line.
    pub fn dump_traces(&mut self) -> Result<()> {
        let sorted: BTreeMap<_, _> = self.tracer.logs().iter().collect();
        let text = serde_json::to_string(&sorted).map_err(|e| Error::Io(e.to_string()))?;
        writeln!(self.out, "{}", text).map_err(|e| Error::Io(e.to_string()))
    }

    // Walk one function body to completion.
    pub fn eval_func(&mut self, func: &'p Function, frame: &mut Frame) -> Result<Option<Value>> {
        trace!("eval_func {:?}", func.name);
        let mut idx = 0;
        while idx < func.instrs.len() {
            match &func.instrs[idx] {
                Item::Label { label } => {
                    frame.lastlabel = frame.curlabel.take();
                    frame.curlabel = Some(label.clone());
                    idx += 1;
                }
                Item::Instr(instr) => match self.eval_instr(instr, frame)? {
                    Action::Next => idx += 1,
                    Action::End(value) => return Ok(value),
                    Action::Jump(label) => idx = find_label(func, &label)?,
                    Action::Speculate => {
                        frame.spec = Some(Box::new(Snapshot {
                            env: frame.env.clone(),
                            lastlabel: frame.lastlabel.clone(),
                            curlabel: frame.curlabel.clone(),
                            parent: frame.spec.take(),
                        }));
                        idx += 1;
                    }
                    Action::Commit => {
                        if !frame.speculating() {
                            return Err(Error::NotSpeculating("commit".to_string()));
                        }
                        frame.spec = None;
                        idx += 1;
                    }
                    Action::Abort(label) => {
                        let snap = match frame.spec.take() {
                            Some(snap) => snap,
                            None => return Err(Error::NotSpeculating("guard".to_string())),
                        };
                        frame.env = snap.env;
                        frame.lastlabel = snap.lastlabel;
                        frame.curlabel = snap.curlabel;
                        frame.spec = snap.parent;
                        idx = find_label(func, &label)?;
                    }
                },
            }
        }
        if frame.speculating() {
            return Err(Error::SpeculativeReturn);
        }
        Ok(None)
    }

    // Evaluate a single instruction. Side effects are confined to the
    // frame's environment and the shared heap, counter, tracer, and
    // instruction count.
    pub fn eval_instr(&mut self, instr: &Instr, frame: &mut Frame) -> Result<Action> {
        self.icount += 1;
        self.tracer.record(instr);

        if let Instr::Const { dest, ty, value, .. } = instr {
            frame.env.define(dest, const_value(ty.as_ref(), value));
            return Ok(Action::Next);
        }

        let op = instr.op();
        if let Some(want) = arity(op)? {
            let got = instr.args().len();
            if got != want {
                return Err(Error::Arity { op: op.to_string(), want, got });
            }
        }
        if frame.speculating() && (op == "call" || op == "ret") {
            return Err(Error::NotDuringSpeculation(op.to_string()));
        }

        match instr {
            Instr::Value { op, dest, ty, args, funcs, labels } => {
                self.eval_value(op, dest, ty, args, funcs, labels, frame)
            }
            Instr::Effect { op, args, funcs, labels } => {
                self.eval_effect(op, args, funcs, labels, frame)
            }
            Instr::Const { .. } => unreachable!(),
        }
    }

    // Operations that bind a result.
    fn eval_value(
        &mut self,
        op: &str,
        dest: &str,
        ty: &Type,
        args: &[String],
        funcs: &[String],
        labels: &[String],
        frame: &mut Frame,
    ) -> Result<Action> {
        let value = match op {
            "id" => {
                let value = lookup(&frame.env, &args[0])?.clone();
                if self.opts.gc {
                    if let Value::Ptr(p) = &value {
                        let key = p.key.clone();
                        let old = frame.env.get(dest).cloned();
                        self.gc.assign(old.as_ref(), &key, &mut self.heap);
                    }
                }
                value
            }
            "add" | "sub" | "mul" | "div" => int_arith(op, args, &frame.env)?,
            "lt" | "le" | "gt" | "ge" | "eq" => int_compare(op, args, &frame.env)?,
            "not" => Value::Bool(!arg_as::<bool>(&frame.env, args, 0)?),
            "and" | "or" => bool_logic(op, args, &frame.env)?,
            "fadd" | "fsub" | "fmul" | "fdiv" => float_arith(op, args, &frame.env)?,
            "flt" | "fle" | "fgt" | "fge" | "feq" => float_compare(op, args, &frame.env)?,
            "alloc" => {
                let pointee = match ty {
                    Type::Ptr(inner) => (**inner).clone(),
                    other => return Err(Error::AllocType(other.clone())),
                };
                let count: i64 = arg_as(&frame.env, args, 0)?;
                let key = self.heap.alloc(count)?;
                if self.opts.gc {
                    let old = frame.env.get(dest).cloned();
                    self.gc.assign(old.as_ref(), &key, &mut self.heap);
                }
                Value::Ptr(Pointer { key, ty: pointee })
            }
            "load" => {
                let p: Pointer = arg_as(&frame.env, args, 0)?;
                match self.heap.read(&p.key)? {
                    Some(value) => value.clone(),
                    None => return Err(Error::Uninitialized(args[0].clone())),
                }
            }
            "ptradd" => {
                let p: Pointer = arg_as(&frame.env, args, 0)?;
                let delta: i64 = arg_as(&frame.env, args, 1)?;
                Value::Ptr(Pointer { key: p.key.add(delta), ty: p.ty })
            }
            "phi" => {
                if labels.len() != args.len() {
                    return Err(Error::PhiMismatch {
                        labels: labels.len(),
                        args: args.len(),
                    });
                }
                // No selecting label, or an unbound source, unbinds
                // the destination.
                let selected = frame
                    .lastlabel
                    .as_ref()
                    .and_then(|last| labels.iter().position(|l| l == last))
                    .and_then(|i| frame.env.get(&args[i]).cloned());
                match selected {
                    Some(value) => frame.env.define(dest, value),
                    None => frame.env.remove(dest),
                }
                return Ok(Action::Next);
            }
            "call" => return self.eval_call(Some((dest, ty)), args, funcs, frame),
            op => return Err(Error::NotAValueOp(op.to_string())),
        };
        frame.env.define(dest, value);
        Ok(Action::Next)
    }

    // Operations with no destination.
    fn eval_effect(
        &mut self,
        op: &str,
        args: &[String],
        funcs: &[String],
        labels: &[String],
        frame: &mut Frame,
    ) -> Result<Action> {
        match op {
            "jmp" => Ok(Action::Jump(target(op, labels, 0)?)),
            "br" => {
                let cond: bool = arg_as(&frame.env, args, 0)?;
                let which = if cond { 0 } else { 1 };
                Ok(Action::Jump(target(op, labels, which)?))
            }
            "ret" => match args.len() {
                0 => Ok(Action::End(None)),
                1 => Ok(Action::End(Some(lookup(&frame.env, &args[0])?.clone()))),
                n => Err(Error::RetArity(n)),
            },
            "print" => {
                let mut line = Vec::with_capacity(args.len());
                for arg in args {
                    line.push(lookup(&frame.env, arg)?.to_string());
                }
                writeln!(self.out, "{}", line.join(" "))
                    .and_then(|_| self.out.flush())
                    .map_err(|e| Error::Io(e.to_string()))?;
                Ok(Action::Next)
            }
            "nop" => Ok(Action::Next),
            "call" => self.eval_call(None, args, funcs, frame),
            "free" => {
                if !self.opts.defer_free {
                    let p: Pointer = arg_as(&frame.env, args, 0)?;
                    self.heap.free(&p.key)?;
                    self.gc.forget(&p.key);
                }
                Ok(Action::Next)
            }
            "store" => {
                let p: Pointer = arg_as(&frame.env, args, 0)?;
                let value = lookup(&frame.env, &args[1])?.clone();
                if !type_check(&value, &p.ty) {
                    return Err(expected(BitFlags::from_flag(kind_of(&p.ty)), &value));
                }
                self.heap.write(&p.key, value)?;
                Ok(Action::Next)
            }
            "speculate" => Ok(Action::Speculate),
            "guard" => {
                if arg_as::<bool>(&frame.env, args, 0)? {
                    Ok(Action::Next)
                } else {
                    Ok(Action::Abort(target(op, labels, 0)?))
                }
            }
            "commit" => Ok(Action::Commit),
            op => Err(Error::NotAnEffectOp(op.to_string())),
        }
    }

    // Shared call protocol for value and effect call sites.
    fn eval_call(
        &mut self,
        dest: Option<(&str, &Type)>,
        args: &[String],
        funcs: &[String],
        frame: &mut Frame,
    ) -> Result<Action> {
        let name = match funcs {
            [name] => name.as_str(),
            _ => return Err(Error::BadFuncRefs(funcs.len())),
        };
        let func = *self
            .funcs
            .get(name)
            .ok_or_else(|| Error::UnknownFunc(name.to_string()))?;

        if args.len() != func.args.len() {
            return Err(Error::CallArity {
                func: name.to_string(),
                want: func.args.len(),
                got: args.len(),
            });
        }
        let mut env = Env::new();
        for (param, arg) in func.args.iter().zip(args) {
            let value = lookup(&frame.env, arg)?.clone();
            if !type_check(&value, &param.ty) {
                return Err(Error::BadCallArg {
                    func: name.to_string(),
                    arg: arg.clone(),
                    ty: param.ty.clone(),
                });
            }
            env.define(&param.name, value);
        }

        let recording = self.opts.trace && self.tracer.enter_call(name);

        let mut callee = Frame::new(env);
        let result = self.eval_func(func, &mut callee)?;

        if recording {
            self.tracer.finish(name);
        }

        match dest {
            None => {
                if result.is_some() || func.ret.is_some() {
                    return Err(Error::UnexpectedReturn(name.to_string()));
                }
            }
            Some((dest, ty)) => {
                let ret = match &func.ret {
                    Some(ret) => ret,
                    None => return Err(Error::NoReturnType(name.to_string())),
                };
                let value = match result {
                    Some(value) => value,
                    None => return Err(Error::MissingReturn(name.to_string())),
                };
                if !type_check(&value, ty) {
                    return Err(expected(BitFlags::from_flag(kind_of(ty)), &value));
                }
                if ty != ret {
                    return Err(Error::ReturnTypeMismatch(name.to_string()));
                }
                frame.env.define(dest, value);
            }
        }
        Ok(Action::Next)
    }
}
