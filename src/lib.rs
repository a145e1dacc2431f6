// minic: a small imperative language
//
// Hand-written scanner, LL(1) recursive-descent parser and a tree-walking
// interpreter with overloaded functions, checked 32-bit arithmetic and
// try/catch/finally.

// Public modules
pub mod ast;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod runner;
pub mod source;
pub mod value;

// Re-export commonly used items
pub use ast::{Expr, Program, Stmt};
pub use error::{Diagnostic, DiagnosticCollector, ErrorSink, LexLocation, Position};
pub use evaluator::{Interpreter, RuntimeError};
pub use functions::FunctionRegistry;
pub use lexer::{CommentFilter, Scanner, Token, TokenSource, TokenType};
pub use parser::Parser;
pub use value::Value;

// Re-export main functions
pub use runner::{execute, run, RunOptions};
