//! Variable storage for the interpreter.
//!
//! All live variables sit in one arena. A call context remembers where each
//! of its scopes starts in that arena, so leaving a scope or a call is a
//! truncation. Lookups only ever see the variables of the innermost call.

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

impl Variable {
    pub fn new(name: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

#[derive(Debug)]
struct CallContext {
    // Arena index where each scope starts, innermost last.
    scopes: Vec<usize>,
}

impl CallContext {
    fn base(&self) -> usize {
        self.scopes.first().copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct Environment {
    slots: Vec<Variable>,
    calls: Vec<CallContext>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters a call with one empty scope for its parameters.
    pub fn push_call(&mut self) {
        self.calls.push(CallContext {
            scopes: vec![self.slots.len()],
        });
    }

    pub fn pop_call(&mut self) {
        if let Some(call) = self.calls.pop() {
            self.slots.truncate(call.base());
        }
    }

    pub fn push_scope(&mut self) {
        let start = self.slots.len();
        if let Some(call) = self.calls.last_mut() {
            call.scopes.push(start);
        }
    }

    pub fn pop_scope(&mut self) {
        if let Some(start) = self.calls.last_mut().and_then(|call| call.scopes.pop()) {
            self.slots.truncate(start);
        }
    }

    /// Number of active calls.
    pub fn depth(&self) -> usize {
        self.calls.len()
    }

    fn visible(&self) -> &[Variable] {
        let base = self.calls.last().map_or(0, CallContext::base);
        &self.slots[base..]
    }

    /// Adds a variable to the innermost scope. Fails when any live scope of
    /// the current call already declares `name`.
    pub fn declare(&mut self, name: &str, value: Value) -> bool {
        if self.is_declared(name) {
            return false;
        }
        self.slots.push(Variable::new(name, value));
        true
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.visible().iter().any(|variable| variable.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.visible()
            .iter()
            .rev()
            .find(|variable| variable.name == name)
            .map(|variable| &variable.value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        let base = self.calls.last().map_or(0, CallContext::base);
        self.slots[base..]
            .iter_mut()
            .rev()
            .find(|variable| variable.name == name)
            .map(|variable| &mut variable.value)
    }
}
