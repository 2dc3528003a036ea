// Datastructure to manage the bindings of a single activation.
//
// Each call gets a fresh Env and abandons it on return. There is no
// scope chain: the IR has exactly one scope per function.

use std::collections::HashMap;

use crate::value::Value;


#[derive(Clone, Debug, Default)]
pub struct Env {
    vars: HashMap<String, Value>,
}


impl Env {
    pub fn new() -> Env {
        Env { vars: HashMap::new() }
    }

    // Look up an identifier.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    // Bind a value, replacing any existing binding.
    pub fn define(&mut self, key: &str, value: Value) {
        self.vars.insert(key.to_string(), value);
    }

    // Drop a binding, if present. Phi uses this when no predecessor
    // label selects a source.
    pub fn remove(&mut self, key: &str) {
        self.vars.remove(key);
    }
}
