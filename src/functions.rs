//! Callable signatures known to the interpreter.

use crate::ast::{Block, FunctionDefinition, Parameter, ReturnType};
use crate::value::ValueType;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Read,
}

#[derive(Debug, Clone, Copy)]
pub enum FunctionBody<'p> {
    User(&'p Block),
    Builtin(Builtin),
}

#[derive(Debug, Clone)]
pub struct Function<'p> {
    pub return_type: ReturnType,
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub body: FunctionBody<'p>,
}

impl<'p> Function<'p> {
    pub fn from_definition(definition: &'p FunctionDefinition) -> Self {
        Self {
            return_type: definition.return_type,
            name: definition.name.clone(),
            parameters: definition.parameters.clone(),
            body: FunctionBody::User(&definition.body),
        }
    }

    pub fn builtin(builtin: Builtin, name: &str, param_type: ValueType) -> Self {
        Self {
            return_type: ReturnType::Void,
            name: name.to_string(),
            parameters: vec![Parameter {
                param_type,
                name: "x".to_string(),
            }],
            body: FunctionBody::Builtin(builtin),
        }
    }

    /// `print(int)`, `print(string)` and `read(int)`.
    pub fn builtins() -> Vec<Function<'p>> {
        vec![
            Function::builtin(Builtin::Print, "print", ValueType::Int),
            Function::builtin(Builtin::Print, "print", ValueType::Str),
            Function::builtin(Builtin::Read, "read", ValueType::Int),
        ]
    }

    pub fn accepts(&self, arg_types: &[ValueType]) -> bool {
        self.parameters.len() == arg_types.len()
            && self
                .parameters
                .iter()
                .zip(arg_types)
                .all(|(parameter, arg_type)| parameter.param_type == *arg_type)
    }

    /// Same name and the same parameter types in the same order.
    pub fn is_ambiguous_with(&self, other: &Function<'_>) -> bool {
        if self.name != other.name {
            return false;
        }
        let types: Vec<ValueType> = other.parameters.iter().map(|p| p.param_type).collect();
        self.accepts(&types)
    }
}

impl fmt::Display for Function<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", parameter.param_type)?;
        }
        write!(f, ")")
    }
}

/// Overload set keyed by name. No two entries are ever ambiguous, so a
/// lookup by name and argument types finds at most one function.
#[derive(Debug, Default)]
pub struct FunctionRegistry<'p> {
    functions: HashMap<String, Vec<Function<'p>>>,
}

impl<'p> FunctionRegistry<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for function in Function::builtins() {
            registry.try_add(function);
        }
        registry
    }

    /// Inserts `function` unless an existing entry is ambiguous with it.
    pub fn try_add(&mut self, function: Function<'p>) -> bool {
        let overloads = self.functions.entry(function.name.clone()).or_default();
        if overloads.iter().any(|f| f.is_ambiguous_with(&function)) {
            return false;
        }
        overloads.push(function);
        true
    }

    pub fn try_get(&self, name: &str, arg_types: &[ValueType]) -> Option<&Function<'p>> {
        self.functions
            .get(name)?
            .iter()
            .find(|function| function.accepts(arg_types))
    }

    pub fn len(&self) -> usize {
        self.functions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
