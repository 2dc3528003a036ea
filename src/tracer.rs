// Call-count driven instruction recorder.
//
// A function becomes hot when its call count reaches the threshold.
// If no trace is active at that point, recording starts for it, and
// every instruction executed until that call returns lands in its
// log, including the bodies of nested calls. A function is traced at
// most once; nested calls never start a trace of their own.

use std::collections::{HashMap, HashSet};

use crate::program::Instr;


#[derive(Debug)]
pub struct Tracer {
    hot: u32,
    counts: HashMap<String, u32>,
    traced: HashSet<String>,
    logs: HashMap<String, Vec<Instr>>,
    active: Option<String>,
}


impl Tracer {
    pub fn new(hot: u32) -> Tracer {
        Tracer {
            hot,
            counts: HashMap::new(),
            traced: HashSet::new(),
            logs: HashMap::new(),
            active: None,
        }
    }

    // Count a call about to happen. True when this call starts a
    // trace; the caller owes a matching `finish` when it returns.
    pub fn enter_call(&mut self, name: &str) -> bool {
        if self.traced.contains(name) {
            return false;
        }
        let count = self.counts.entry(name.to_string()).or_insert(0);
        *count += 1;
        if *count >= self.hot && self.active.is_none() {
            self.active = Some(name.to_string());
            self.logs.insert(name.to_string(), Vec::new());
            true
        } else {
            false
        }
    }

    // Append to the active log, if any.
    pub fn record(&mut self, instr: &Instr) {
        if let Some(name) = &self.active {
            self.logs.entry(name.clone()).or_default().push(instr.clone());
        }
    }

    // The activating call returned: stop recording and retire the
    // function from future tracing.
    pub fn finish(&mut self, name: &str) {
        self.active = None;
        self.traced.insert(name.to_string());
    }

    pub fn logs(&self) -> &HashMap<String, Vec<Instr>> {
        &self.logs
    }
}
