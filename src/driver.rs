// Program driver: options, entry arguments, run and report.

use std::collections::HashMap;
use std::io::Write;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::eval::{Frame, Interp};
use crate::program::{Function, Program, Type};
use crate::value::Value;


// Execution options. Flags are order-independent and are split out of
// the argument list before entry-function arguments are read.
#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    pub profile: bool,    // -p: dynamic instruction count to stderr
    pub gc: bool,         // -gc: reference-counted frees
    pub defer_free: bool, // -df: treat free as a no-op
    pub trace: bool,      // -tr: hot-function tracing
    pub hot: u32,         // tracer activation threshold
}

impl Default for Options {
    fn default() -> Options {
        Options {
            profile: false,
            gc: false,
            defer_free: false,
            trace: false,
            hot: 5,
        }
    }
}

impl Options {
    // Split recognized flags out of an argument list. What remains is
    // positional input for the entry function.
    pub fn parse(args: Vec<String>) -> (Options, Vec<String>) {
        let mut opts = Options::default();
        let mut rest = Vec::new();
        for arg in args {
            match arg.as_str() {
                "-p" => opts.profile = true,
                "-gc" => opts.gc = true,
                "-df" => opts.defer_free = true,
                "-tr" => opts.trace = true,
                _ => rest.push(arg),
            }
        }
        (opts, rest)
    }
}


// Index functions by name, rejecting duplicates.
fn function_table(program: &Program) -> Result<HashMap<&str, &Function>> {
    let mut table = HashMap::new();
    for func in &program.functions {
        if table.insert(func.name.as_str(), func).is_some() {
            return Err(Error::DuplicateFunc(func.name.clone()));
        }
    }
    Ok(table)
}


// Parse one entry argument against its declared type. Pointers cannot
// come from the command line.
fn entry_value(ty: &Type, text: &str) -> Result<Value> {
    let bad = || Error::BadMainArg { ty: ty.clone(), text: text.to_string() };
    match ty {
        Type::Int => text.parse::<i64>().map(Value::Int).map_err(|_| bad()),
        Type::Float => match text.parse::<f64>() {
            Ok(f) if !f.is_nan() => Ok(Value::Float(f)),
            _ => Err(bad()),
        },
        Type::Bool => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(bad()),
        },
        Type::Ptr(_) => Err(bad()),
    }
}


// Run a program to completion: locate main, bind its arguments, walk
// it, then sweep, check for leaks, and emit the requested profile and
// trace reports.
pub fn run<O, E>(
    program: &Program,
    args: &[String],
    opts: Options,
    out: O,
    mut err: E,
) -> Result<()>
where
    O: Write,
    E: Write,
{
    trace!("run {:?} {:?}", args, opts);
    let funcs = function_table(program)?;
    let main = *funcs.get("main").ok_or(Error::NoMain)?;

    if args.len() != main.args.len() {
        return Err(Error::MainArity { want: main.args.len(), got: args.len() });
    }
    let mut env = Env::new();
    for (param, text) in main.args.iter().zip(args) {
        env.define(&param.name, entry_value(&param.ty, text)?);
    }

    let (profile, gc, traced) = (opts.profile, opts.gc, opts.trace);
    let mut interp = Interp::new(funcs, opts, out);
    let mut frame = Frame::new(env);
    interp.eval_func(main, &mut frame)?;

    if gc {
        interp.sweep();
    }
    if !interp.heap().is_empty() {
        return Err(Error::Leak);
    }
    if profile {
        writeln!(err, "total_dyn_inst: {}", interp.icount())
            .map_err(|e| Error::Io(e.to_string()))?;
    }
    if traced {
        interp.dump_traces()?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_flag_splitting() {
        let (opts, rest) = Options::parse(strings(&["-p", "12", "-gc", "true", "-tr", "-df"]));
        assert_eq!(
            opts,
            Options {
                profile: true,
                gc: true,
                defer_free: true,
                trace: true,
                hot: 5,
            }
        );
        assert_eq!(rest, strings(&["12", "true"]));
    }

    #[test]
    fn test_flags_default_off() {
        let (opts, rest) = Options::parse(strings(&["3"]));
        assert_eq!(opts, Options::default());
        assert_eq!(rest, strings(&["3"]));
    }

    #[test]
    fn test_entry_values() {
        assert_eq!(entry_value(&Type::Int, "-4"), Ok(Value::Int(-4)));
        assert_eq!(entry_value(&Type::Bool, "true"), Ok(Value::Bool(true)));
        assert_eq!(entry_value(&Type::Float, "2.5"), Ok(Value::Float(2.5)));

        assert_eq!(
            entry_value(&Type::Int, "2.5"),
            Err(Error::BadMainArg { ty: Type::Int, text: "2.5".to_string() })
        );
        assert_eq!(
            entry_value(&Type::Bool, "yes"),
            Err(Error::BadMainArg { ty: Type::Bool, text: "yes".to_string() })
        );
        assert_eq!(
            entry_value(&Type::Float, "nan"),
            Err(Error::BadMainArg { ty: Type::Float, text: "nan".to_string() })
        );
        let ptr = Type::Ptr(Box::new(Type::Int));
        assert_eq!(
            entry_value(&ptr, "0"),
            Err(Error::BadMainArg { ty: ptr.clone(), text: "0".to_string() })
        );
    }

    #[test]
    fn test_function_table_rejects_duplicates() {
        let program: Program = serde_json::from_str(
            r#"{"functions": [
                {"name": "f", "instrs": [{"op": "ret"}]},
                {"name": "f", "instrs": [{"op": "ret"}]}]}"#,
        )
        .unwrap();
        assert_eq!(
            function_table(&program).err(),
            Some(Error::DuplicateFunc("f".to_string()))
        );
    }

    #[test]
    fn test_run_minimal() {
        let program: Program = serde_json::from_str(
            r#"{"functions": [{"name": "main", "instrs": [{"op": "ret"}]}]}"#,
        )
        .unwrap();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let status = run(&program, &[], Options::default(), &mut out, &mut err);
        assert_eq!(status, Ok(()));
        assert!(out.is_empty());
        assert!(err.is_empty());
    }
}
