use crate::ast::{
    BinaryOp, Block, Catch, Expr, FunctionCall, Program, ReturnType, Stmt, UnaryOp,
};
use crate::environment::Environment;
use crate::error::ErrorSink;
use crate::functions::{Builtin, Function, FunctionBody, FunctionRegistry};
use crate::source::CharSource;
use crate::value::{Value, ValueType};
use std::io::Write;
use thiserror::Error;

/// How deep interpreted calls may nest before the run is stopped.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Everything that can go wrong while running a program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("ambiguous function definition '{signature}'")]
    AmbiguousFunction { signature: String },
    #[error("no function 'main' without parameters is defined")]
    MissingMain,
    #[error("variable '{name}' is already declared")]
    Redeclaration { name: String },
    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("type mismatch: cannot assign {found} to {expected} variable '{name}'")]
    AssignmentTypeMismatch {
        name: String,
        expected: ValueType,
        found: String,
    },
    #[error("type mismatch: function '{name}' does not return a value")]
    VoidValue { name: String },
    #[error("type mismatch: operator '{operator}' expects an int operand, found {found}")]
    InvalidOperand { operator: String, found: ValueType },
    #[error("type mismatch: condition must be int, found {found}")]
    InvalidCondition { found: ValueType },
    #[error("type mismatch: function '{name}' must return int, found {found}")]
    ReturnTypeMismatch { name: String, found: ValueType },
    #[error("no function matching '{name}({arg_types})'")]
    UnresolvedCall { name: String, arg_types: String },
    #[error("function '{name}' must return a value")]
    MissingReturnValue { name: String },
    #[error("void function '{name}' cannot return a value")]
    UnexpectedReturnValue { name: String },
    #[error("integer overflow in '{operator}'")]
    Overflow { operator: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("input is not a valid integer")]
    InvalidInput,
    #[error("input integer is too big")]
    InputOverflow,
    #[error("cannot read input: {0}")]
    Input(String),
    #[error("read expects a variable argument")]
    ReadTarget,
    #[error("uncaught exception: {value}")]
    UncaughtException { value: String },
    #[error("call depth limit of {limit} exceeded")]
    CallDepthExceeded { limit: usize },
    #[error("cannot write output: {0}")]
    Output(String),
    #[error("cannot reserve a {megabytes} MiB stack for a call depth of {depth}")]
    StackReservation { megabytes: usize, depth: usize },
}

/// Why evaluation stopped early.
#[derive(Debug, Clone, PartialEq)]
pub enum Unwind {
    /// An error was reported and the run is being abandoned.
    Fault,
    /// A `throw` is looking for a matching `catch`.
    Throw(Value),
}

/// Outcome of a statement that finished without unwinding.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(Option<Value>),
}

type Exec<T> = Result<T, Unwind>;

/// Tree-walking interpreter.
///
/// Errors are reported to the sink at the point where they are detected and
/// then unwind the run as [`Unwind::Fault`]; once that happens the run is
/// over and `run` returns `false`.
pub struct Interpreter<'p, 'a> {
    registry: FunctionRegistry<'p>,
    environment: Environment,
    sink: &'a dyn ErrorSink,
    output: &'a mut dyn Write,
    input: &'a mut dyn CharSource,
    max_call_depth: usize,
    failed: bool,
}

impl<'p, 'a> Interpreter<'p, 'a> {
    pub fn new(
        sink: &'a dyn ErrorSink,
        output: &'a mut dyn Write,
        input: &'a mut dyn CharSource,
    ) -> Self {
        Self {
            registry: FunctionRegistry::new(),
            environment: Environment::new(),
            sink,
            output,
            input,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            failed: false,
        }
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Registers every function of `program` and calls `main()`.
    pub fn run(&mut self, program: &'p Program) -> bool {
        self.failed = false;
        self.environment = Environment::new();
        self.registry = FunctionRegistry::with_builtins();

        for definition in &program.functions {
            let function = Function::from_definition(definition);
            let signature = function.to_string();
            if !self.registry.try_add(function) {
                self.fail(RuntimeError::AmbiguousFunction { signature });
                return false;
            }
        }

        if self.registry.try_get("main", &[]).is_none() {
            self.fail(RuntimeError::MissingMain);
            return false;
        }

        let main = FunctionCall {
            name: "main".to_string(),
            args: Vec::new(),
        };
        if let Err(Unwind::Throw(value)) = self.call(&main) {
            self.fail(RuntimeError::UncaughtException {
                value: value.to_string(),
            });
        }

        if let Err(e) = self.output.flush() {
            self.fail(RuntimeError::Output(e.to_string()));
        }

        !self.failed
    }

    fn fail(&mut self, error: RuntimeError) -> Unwind {
        self.sink.report_runtime_error(error.to_string());
        self.failed = true;
        Unwind::Fault
    }

    fn call(&mut self, call: &FunctionCall) -> Exec<Option<Value>> {
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.evaluate_expression(arg)?);
        }

        let arg_types: Vec<ValueType> = args.iter().map(Value::value_type).collect();
        let function = match self.registry.try_get(&call.name, &arg_types) {
            Some(function) => function.clone(),
            None => {
                let arg_types = arg_types
                    .iter()
                    .map(ValueType::name)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(self.fail(RuntimeError::UnresolvedCall {
                    name: call.name.clone(),
                    arg_types,
                }));
            }
        };

        match function.body {
            FunctionBody::Builtin(Builtin::Print) => {
                for value in &args {
                    self.print(value)?;
                }
                Ok(None)
            }
            FunctionBody::Builtin(Builtin::Read) => match call.args.as_slice() {
                [Expr::Variable(name)] => {
                    self.read(name)?;
                    Ok(None)
                }
                _ => Err(self.fail(RuntimeError::ReadTarget)),
            },
            FunctionBody::User(body) => self.call_user(&function, body, args),
        }
    }

    fn call_user(
        &mut self,
        function: &Function<'p>,
        body: &'p Block,
        args: Vec<Value>,
    ) -> Exec<Option<Value>> {
        if self.environment.depth() >= self.max_call_depth {
            return Err(self.fail(RuntimeError::CallDepthExceeded {
                limit: self.max_call_depth,
            }));
        }

        self.environment.push_call();
        for (parameter, value) in function.parameters.iter().zip(args) {
            if !self.environment.declare(&parameter.name, value) {
                self.environment.pop_call();
                return Err(self.fail(RuntimeError::Redeclaration {
                    name: parameter.name.clone(),
                }));
            }
        }

        let result = self.execute_block(body);
        self.environment.pop_call();

        let returned = match result? {
            Flow::Return(value) => value,
            Flow::Normal => None,
        };

        match (function.return_type, returned) {
            (ReturnType::Int, Some(Value::Int(n))) => Ok(Some(Value::Int(n))),
            (ReturnType::Int, Some(value)) => Err(self.fail(RuntimeError::ReturnTypeMismatch {
                name: function.name.clone(),
                found: value.value_type(),
            })),
            (ReturnType::Int, None) => Err(self.fail(RuntimeError::MissingReturnValue {
                name: function.name.clone(),
            })),
            (ReturnType::Void, Some(_)) => Err(self.fail(RuntimeError::UnexpectedReturnValue {
                name: function.name.clone(),
            })),
            (ReturnType::Void, None) => Ok(None),
        }
    }

    fn execute_block(&mut self, block: &Block) -> Exec<Flow> {
        self.environment.push_scope();
        let result = self.execute_statements(&block.statements);
        self.environment.pop_scope();
        result
    }

    fn execute_statements(&mut self, statements: &[Stmt]) -> Exec<Flow> {
        for statement in statements {
            match self.execute_statement(statement)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Exec<Flow> {
        match stmt {
            Stmt::Declaration { var_type, name } => {
                if !self.environment.declare(name, Value::default_for(*var_type)) {
                    return Err(self.fail(RuntimeError::Redeclaration { name: name.clone() }));
                }
                Ok(Flow::Normal)
            }
            Stmt::Assignment { name, value } => {
                self.assign(name, value)?;
                Ok(Flow::Normal)
            }
            Stmt::Call(call) => {
                self.call(call)?;
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => Some(self.evaluate_expression(expr)?),
                    None => None,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Throw(value) => {
                let value = self.evaluate_expression(value)?;
                Err(Unwind::Throw(value))
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.condition(condition)? {
                    self.execute_statement(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute_statement(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { condition, body } => {
                while self.condition(condition)? {
                    match self.execute_statement(body)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::TryCatch {
                body,
                catches,
                finally,
            } => {
                let outcome = match self.execute_block(body) {
                    Err(Unwind::Throw(exception)) => self.catch(catches, exception),
                    other => other,
                };
                if matches!(outcome, Err(Unwind::Fault)) {
                    return outcome;
                }

                match finally {
                    Some(finally) => match self.execute_block(finally)? {
                        Flow::Normal => outcome,
                        flow => Ok(flow),
                    },
                    None => outcome,
                }
            }
            Stmt::Block(block) => self.execute_block(block),
        }
    }

    fn assign(&mut self, name: &str, expr: &Expr) -> Exec<()> {
        let expected = match self.environment.get(name) {
            Some(value) => value.value_type(),
            None => {
                return Err(self.fail(RuntimeError::UndefinedVariable {
                    name: name.to_string(),
                }))
            }
        };

        let value = match expr {
            Expr::Call(call) => self.call(call)?,
            expr => Some(self.evaluate_expression(expr)?),
        };

        let found = match &value {
            Some(value) if value.value_type() == expected => None,
            Some(value) => Some(value.type_name().to_string()),
            None => Some("void".to_string()),
        };
        if let Some(found) = found {
            return Err(self.fail(RuntimeError::AssignmentTypeMismatch {
                name: name.to_string(),
                expected,
                found,
            }));
        }

        if let (Some(slot), Some(value)) = (self.environment.get_mut(name), value) {
            *slot = value;
        }
        Ok(())
    }

    /// Tries each clause in order; the first one whose guard holds handles
    /// the exception. Without a match the exception keeps unwinding.
    fn catch(&mut self, catches: &[Catch], exception: Value) -> Exec<Flow> {
        for catch in catches {
            self.environment.push_scope();
            let result = self.catch_clause(catch, &exception);
            self.environment.pop_scope();
            if let Some(flow) = result? {
                return Ok(flow);
            }
        }
        Err(Unwind::Throw(exception))
    }

    fn catch_clause(&mut self, catch: &Catch, exception: &Value) -> Exec<Option<Flow>> {
        if !self.environment.declare(&catch.name, exception.clone()) {
            return Err(self.fail(RuntimeError::Redeclaration {
                name: catch.name.clone(),
            }));
        }
        if let Some(guard) = &catch.guard {
            if !self.condition(guard)? {
                return Ok(None);
            }
        }
        self.execute_statement(&catch.body).map(Some)
    }

    fn condition(&mut self, expr: &Expr) -> Exec<bool> {
        match self.evaluate_expression(expr)? {
            Value::Int(n) => Ok(n != 0),
            value => Err(self.fail(RuntimeError::InvalidCondition {
                found: value.value_type(),
            })),
        }
    }

    pub fn evaluate_expression(&mut self, expr: &Expr) -> Exec<Value> {
        match expr {
            Expr::IntConst(n) => Ok(Value::Int(*n)),
            Expr::StringConst(s) => Ok(Value::Str(s.clone())),
            Expr::Variable(name) => match self.environment.get(name) {
                Some(value) => Ok(value.clone()),
                None => Err(self.fail(RuntimeError::UndefinedVariable { name: name.clone() })),
            },
            Expr::Call(call) => match self.call(call)? {
                Some(value) => Ok(value),
                None => Err(self.fail(RuntimeError::VoidValue {
                    name: call.name.clone(),
                })),
            },
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                // Both sides always run, `||` and `&&` included.
                let left = self.evaluate_expression(left)?;
                let right = self.evaluate_expression(right)?;
                let left = self.int_operand(&operator.to_string(), &left);
                let right = self.int_operand(&operator.to_string(), &right);
                match (left, right) {
                    (Some(l), Some(r)) => self.evaluate_binary_op(*operator, l, r),
                    _ => Err(Unwind::Fault),
                }
            }
            Expr::Unary { operator, operand } => {
                let operand = self.evaluate_expression(operand)?;
                let operand = self
                    .int_operand(&operator.to_string(), &operand)
                    .ok_or(Unwind::Fault)?;
                self.evaluate_unary_op(*operator, operand)
            }
        }
    }

    /// Reports a non-int operand and returns `None` for it.
    fn int_operand(&mut self, operator: &str, value: &Value) -> Option<i32> {
        let operand = value.as_int();
        if operand.is_none() {
            self.fail(RuntimeError::InvalidOperand {
                operator: operator.to_string(),
                found: value.value_type(),
            });
        }
        operand
    }

    fn evaluate_binary_op(&mut self, operator: BinaryOp, left: i32, right: i32) -> Exec<Value> {
        let result = match operator {
            BinaryOp::Or => Some((left != 0 || right != 0) as i32),
            BinaryOp::And => Some((left != 0 && right != 0) as i32),
            BinaryOp::Equal => Some((left == right) as i32),
            BinaryOp::NotEqual => Some((left != right) as i32),
            BinaryOp::Less => Some((left < right) as i32),
            BinaryOp::LessEqual => Some((left <= right) as i32),
            BinaryOp::Greater => Some((left > right) as i32),
            BinaryOp::GreaterEqual => Some((left >= right) as i32),
            BinaryOp::Add => left.checked_add(right),
            BinaryOp::Subtract => left.checked_sub(right),
            BinaryOp::Multiply => left.checked_mul(right),
            BinaryOp::Divide => {
                if right == 0 {
                    return Err(self.fail(RuntimeError::DivisionByZero));
                }
                left.checked_div(right)
            }
        };

        match result {
            Some(n) => Ok(Value::Int(n)),
            None => Err(self.fail(RuntimeError::Overflow {
                operator: operator.to_string(),
            })),
        }
    }

    fn evaluate_unary_op(&mut self, operator: UnaryOp, operand: i32) -> Exec<Value> {
        match operator {
            UnaryOp::Negate => match operand.checked_neg() {
                Some(n) => Ok(Value::Int(n)),
                None => Err(self.fail(RuntimeError::Overflow {
                    operator: operator.to_string(),
                })),
            },
            UnaryOp::Not => Ok(Value::Int((operand == 0) as i32)),
        }
    }

    fn print(&mut self, value: &Value) -> Exec<()> {
        match write!(self.output, "{}", value) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(RuntimeError::Output(e.to_string()))),
        }
    }

    /// Skips leading whitespace, then reads a run of decimal digits into
    /// the int variable `name`.
    fn read(&mut self, name: &str) -> Exec<()> {
        // A prompt printed without a newline must be visible before blocking.
        if let Err(e) = self.output.flush() {
            return Err(self.fail(RuntimeError::Output(e.to_string())));
        }

        while matches!(self.input.peek_char(), Some(c) if c.is_whitespace()) {
            self.input.next_char();
        }

        let mut value: Option<i32> = None;
        while let Some(digit) = self.input.peek_char().and_then(|c| c.to_digit(10)) {
            self.input.next_char();
            let next = value
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit as i32));
            match next {
                Some(n) => value = Some(n),
                None => return Err(self.fail(RuntimeError::InputOverflow)),
            }
        }

        if let Some(error) = self.input.take_error() {
            return Err(self.fail(RuntimeError::Input(error.to_string())));
        }
        let Some(value) = value else {
            return Err(self.fail(RuntimeError::InvalidInput));
        };
        match self.environment.get_mut(name) {
            Some(slot) => {
                *slot = Value::Int(value);
                Ok(())
            }
            None => Err(self.fail(RuntimeError::UndefinedVariable {
                name: name.to_string(),
            })),
        }
    }
}
