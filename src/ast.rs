//! Syntax tree produced by the parser.
//!
//! The tree is built once and never mutated afterwards. `Display` prints a
//! node back as source text that parses to an equal tree, with parentheses
//! only where precedence or associativity require them.

use crate::value::ValueType;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub functions: Vec<FunctionDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Void,
    Int,
}

/// A formal parameter. Parameters always hold a value, so their type is a
/// [`ValueType`] and can never be void.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub param_type: ValueType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub return_type: ReturnType,
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catch {
    pub name: String,
    pub guard: Option<Expr>,
    pub body: Box<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Declaration {
        var_type: ValueType,
        name: String,
    },
    Assignment {
        name: String,
        value: Expr,
    },
    Call(FunctionCall),
    Return(Option<Expr>),
    Throw(Expr),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    TryCatch {
        body: Block,
        catches: Vec<Catch>,
        finally: Option<Block>,
    },
    Block(Block),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntConst(i32),
    StringConst(String),
    Variable(String),
    Call(FunctionCall),
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReturnType::Void => write!(f, "void"),
            ReturnType::Int => write!(f, "int"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
        };
        write!(f, "{}", symbol)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::IntConst(n) => write!(f, "{}", n),
            Expr::StringConst(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
            Expr::Variable(name) => write!(f, "{}", name),
            Expr::Call(call) => write!(f, "{}", call),
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let level = operator.precedence();
                // `==` and `<` style operators take exactly two operands.
                let chains = !matches!(
                    operator,
                    BinaryOp::Equal
                        | BinaryOp::NotEqual
                        | BinaryOp::Less
                        | BinaryOp::LessEqual
                        | BinaryOp::Greater
                        | BinaryOp::GreaterEqual
                );
                let left_level = left.precedence();
                write_operand(f, left, left_level < level || (!chains && left_level == level))?;
                write!(f, " {} ", operator)?;
                write_operand(f, right, right.precedence() <= level)
            }
            Expr::Unary { operator, operand } => {
                write!(f, "{}", operator)?;
                write_operand(f, operand, operand.precedence() < ATOM_PRECEDENCE)
            }
        }
    }
}

const UNARY_PRECEDENCE: u8 = 7;
const ATOM_PRECEDENCE: u8 = 8;

impl BinaryOp {
    /// Binding strength, loosest first.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Equal | BinaryOp::NotEqual => 3,
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => 4,
            BinaryOp::Add | BinaryOp::Subtract => 5,
            BinaryOp::Multiply | BinaryOp::Divide => 6,
        }
    }
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { operator, .. } => operator.precedence(),
            Expr::Unary { .. } => UNARY_PRECEDENCE,
            _ => ATOM_PRECEDENCE,
        }
    }
}

/// Prints only the parentheses the grammar needs, so a printed tree never
/// nests deeper than the source it came from.
fn write_operand(f: &mut fmt::Formatter, expr: &Expr, parenthesize: bool) -> fmt::Result {
    if parenthesize {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

fn indent(f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
    write!(f, "{:width$}", "", width = depth * 4)
}

impl Block {
    fn write(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
        writeln!(f, "{{")?;
        for statement in &self.statements {
            indent(f, depth + 1)?;
            statement.write(f, depth + 1)?;
            writeln!(f)?;
        }
        indent(f, depth)?;
        write!(f, "}}")
    }
}

impl Stmt {
    fn write(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
        match self {
            Stmt::Declaration { var_type, name } => write!(f, "{} {};", var_type, name),
            Stmt::Assignment { name, value } => write!(f, "{} = {};", name, value),
            Stmt::Call(call) => write!(f, "{};", call),
            Stmt::Return(Some(value)) => write!(f, "return {};", value),
            Stmt::Return(None) => write!(f, "return;"),
            Stmt::Throw(value) => write!(f, "throw {};", value),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                write!(f, "if ({}) ", condition)?;
                then_branch.write(f, depth)?;
                if let Some(else_branch) = else_branch {
                    write!(f, " else ")?;
                    else_branch.write(f, depth)?;
                }
                Ok(())
            }
            Stmt::While { condition, body } => {
                write!(f, "while ({}) ", condition)?;
                body.write(f, depth)
            }
            Stmt::TryCatch {
                body,
                catches,
                finally,
            } => {
                write!(f, "try ")?;
                body.write(f, depth)?;
                for catch in catches {
                    write!(f, " catch ({})", catch.name)?;
                    if let Some(guard) = &catch.guard {
                        write!(f, " when ({})", guard)?;
                    }
                    write!(f, " ")?;
                    catch.body.write(f, depth)?;
                }
                if let Some(finally) = finally {
                    write!(f, " finally ")?;
                    finally.write(f, depth)?;
                }
                Ok(())
            }
            Stmt::Block(block) => block.write(f, depth),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write(f, 0)
    }
}

impl fmt::Display for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", parameter.param_type, parameter.name)?;
        }
        write!(f, ") ")?;
        self.body.write(f, 0)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, function) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", function)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i32) -> Box<Expr> {
        Box::new(Expr::IntConst(n))
    }

    fn binary(left: Box<Expr>, operator: BinaryOp, right: Box<Expr>) -> Box<Expr> {
        Box::new(Expr::Binary {
            left,
            operator,
            right,
        })
    }

    #[test]
    fn parentheses_only_where_precedence_needs_them() {
        let expr = Expr::Binary {
            left: Box::new(Expr::Binary {
                left: int(1),
                operator: BinaryOp::Add,
                right: int(2),
            }),
            operator: BinaryOp::Multiply,
            right: Box::new(Expr::Variable("x".to_string())),
        };
        assert_eq!(expr.to_string(), "(1 + 2) * x");

        let sum_of_product = binary(
            int(1),
            BinaryOp::Add,
            binary(int(2), BinaryOp::Multiply, int(3)),
        );
        assert_eq!(sum_of_product.to_string(), "1 + 2 * 3");
    }

    #[test]
    fn associativity_is_preserved() {
        let left_deep = binary(
            binary(int(1), BinaryOp::Subtract, int(2)),
            BinaryOp::Subtract,
            int(3),
        );
        assert_eq!(left_deep.to_string(), "1 - 2 - 3");

        let right_deep = binary(
            int(1),
            BinaryOp::Subtract,
            binary(int(2), BinaryOp::Subtract, int(3)),
        );
        assert_eq!(right_deep.to_string(), "1 - (2 - 3)");

        // Comparisons do not chain, so a nested one keeps its parentheses.
        let compared = binary(
            binary(int(1), BinaryOp::Equal, int(2)),
            BinaryOp::Equal,
            int(3),
        );
        assert_eq!(compared.to_string(), "(1 == 2) == 3");
    }

    #[test]
    fn unary_operand_is_an_atom() {
        let negated_sum = Expr::Unary {
            operator: UnaryOp::Negate,
            operand: binary(int(1), BinaryOp::Add, int(2)),
        };
        assert_eq!(negated_sum.to_string(), "-(1 + 2)");
    }

    #[test]
    fn nested_unary_gets_parentheses() {
        let expr = Expr::Unary {
            operator: UnaryOp::Negate,
            operand: Box::new(Expr::Unary {
                operator: UnaryOp::Not,
                operand: int(0),
            }),
        };
        assert_eq!(expr.to_string(), "-(!0)");
    }

    #[test]
    fn strings_are_escaped() {
        let expr = Expr::StringConst("a\"b\\\n\t".to_string());
        assert_eq!(expr.to_string(), r#""a\"b\\\n\t""#);
    }

    #[test]
    fn statements_print_as_source() {
        let stmt = Stmt::If {
            condition: Expr::Variable("a".to_string()),
            then_branch: Box::new(Stmt::Return(Some(Expr::IntConst(1)))),
            else_branch: Some(Box::new(Stmt::Block(Block {
                statements: vec![Stmt::Call(FunctionCall {
                    name: "print".to_string(),
                    args: vec![Expr::StringConst("no".to_string())],
                })],
            }))),
        };
        assert_eq!(
            stmt.to_string(),
            "if (a) return 1; else {\n    print(\"no\");\n}"
        );
    }
}
