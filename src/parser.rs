use crate::ast::{
    BinaryOp, Block, Catch, Expr, FunctionCall, FunctionDefinition, Parameter, Program,
    ReturnType, Stmt, UnaryOp,
};
use crate::error::{ErrorKind, ErrorSink, LexLocation};
use crate::lexer::{Token, TokenSource, TokenType};
use crate::value::ValueType;
use thiserror::Error;

/// How many statements, operators, parentheses and call argument lists may
/// enclose one another. Bounds the native stack used by parsing, evaluating
/// and dropping the tree.
pub const MAX_NESTING_DEPTH: usize = 100;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("{expected} expected, found {found}")]
    Expected {
        expected: String,
        found: TokenType,
        location: LexLocation,
    },
    #[error("unexpected {found} after the last function definition")]
    TrailingInput {
        found: TokenType,
        location: LexLocation,
    },
    #[error("{what} nested too deeply")]
    TooDeep {
        what: &'static str,
        location: LexLocation,
    },
}

impl ParseError {
    pub fn location(&self) -> LexLocation {
        match self {
            ParseError::Expected { location, .. } => *location,
            ParseError::TrailingInput { location, .. } => *location,
            ParseError::TooDeep { location, .. } => *location,
        }
    }
}

/// LL(1) recursive-descent parser.
///
/// The token source is always advanced onto the first token of a rule
/// before the rule is entered. The first mismatch aborts the parse.
pub struct Parser<'a, L: TokenSource> {
    lexer: L,
    sink: &'a dyn ErrorSink,
    // Enclosing levels at the current point, at most MAX_NESTING_DEPTH.
    depth: usize,
}

impl<'a, L: TokenSource> Parser<'a, L> {
    pub fn new(lexer: L, sink: &'a dyn ErrorSink) -> Self {
        Self {
            lexer,
            sink,
            depth: 0,
        }
    }

    /// Parses the whole input, reporting the first syntax error to the sink.
    pub fn try_parse(&mut self) -> Option<Program> {
        match self.parse() {
            Ok(program) => Some(program),
            Err(error) => {
                self.sink
                    .report_error(ErrorKind::ParseError, error.location(), error.to_string());
                None
            }
        }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        self.depth = 0;
        self.lexer.advance();

        let mut functions = Vec::new();
        while self.check(TokenType::Void) || self.check(TokenType::Int) {
            functions.push(self.function()?);
        }

        if functions.is_empty() {
            return Err(self.expected("function definition"));
        }
        if !self.check(TokenType::Eof) {
            return Err(ParseError::TrailingInput {
                found: self.peek().token_type,
                location: self.peek().location,
            });
        }

        Ok(Program { functions })
    }

    fn function(&mut self) -> Result<FunctionDefinition, ParseError> {
        let return_type = if self.match_type(TokenType::Void) {
            ReturnType::Void
        } else {
            self.consume(TokenType::Int)?;
            ReturnType::Int
        };
        let name = self.identifier()?;

        self.consume(TokenType::LeftParen)?;
        let mut parameters = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                self.consume(TokenType::Int)?;
                parameters.push(Parameter {
                    param_type: ValueType::Int,
                    name: self.identifier()?,
                });
                if !self.match_type(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen)?;

        let body = self.block()?;
        Ok(FunctionDefinition {
            return_type,
            name,
            parameters,
            body,
        })
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        self.consume(TokenType::LeftBrace)?;

        let mut statements = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            statements.push(self.statement()?);
        }

        self.consume(TokenType::RightBrace)?;
        Ok(Block { statements })
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        self.enter("statement")?;
        let stmt = match self.peek().token_type {
            TokenType::Int => self.declaration(),
            TokenType::Identifier => self.assignment_or_call(),
            TokenType::Return => self.return_statement(),
            TokenType::Throw => {
                self.advance();
                let value = self.expression()?;
                self.consume(TokenType::Semicolon)?;
                Ok(Stmt::Throw(value))
            }
            TokenType::If => self.if_statement(),
            TokenType::While => self.while_statement(),
            TokenType::Try => self.try_statement(),
            TokenType::LeftBrace => Ok(Stmt::Block(self.block()?)),
            _ => Err(self.expected("statement")),
        }?;
        self.depth -= 1;
        Ok(stmt)
    }

    fn declaration(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenType::Int)?;
        let name = self.identifier()?;
        self.consume(TokenType::Semicolon)?;
        Ok(Stmt::Declaration {
            var_type: ValueType::Int,
            name,
        })
    }

    fn assignment_or_call(&mut self) -> Result<Stmt, ParseError> {
        let name = self.identifier()?;

        let stmt = if self.match_type(TokenType::Equal) {
            Stmt::Assignment {
                name,
                value: self.expression()?,
            }
        } else if self.check(TokenType::LeftParen) {
            Stmt::Call(self.finish_call(name)?)
        } else {
            return Err(self.expected("'=' or '('"));
        };

        self.consume(TokenType::Semicolon)?;
        Ok(stmt)
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenType::Return)?;
        if self.match_type(TokenType::Semicolon) {
            return Ok(Stmt::Return(None));
        }
        let value = self.expression()?;
        self.consume(TokenType::Semicolon)?;
        Ok(Stmt::Return(Some(value)))
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenType::If)?;
        let condition = self.parenthesized()?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_type(TokenType::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenType::While)?;
        let condition = self.parenthesized()?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    fn try_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenType::Try)?;
        let body = self.block()?;

        let mut catches = Vec::new();
        while self.match_type(TokenType::Catch) {
            self.consume(TokenType::LeftParen)?;
            let name = self.identifier()?;
            self.consume(TokenType::RightParen)?;
            let guard = if self.match_type(TokenType::When) {
                Some(self.parenthesized()?)
            } else {
                None
            };
            catches.push(Catch {
                name,
                guard,
                body: Box::new(self.statement()?),
            });
        }

        let finally = if self.match_type(TokenType::Finally) {
            Some(self.block()?)
        } else {
            None
        };

        if catches.is_empty() && finally.is_none() {
            return Err(self.expected("'catch' or 'finally'"));
        }

        Ok(Stmt::TryCatch {
            body,
            catches,
            finally,
        })
    }

    fn parenthesized(&mut self) -> Result<Expr, ParseError> {
        self.consume(TokenType::LeftParen)?;
        let expr = self.expression()?;
        self.consume(TokenType::RightParen)?;
        Ok(expr)
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.logical_or()
    }

    // Each operator folded into a left-deep chain counts as one level until
    // the chain is complete.
    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut expr = self.logical_and()?;

        while self.match_type(TokenType::OrOr) {
            self.enter("expression")?;
            let right = self.logical_and()?;
            expr = binary(expr, BinaryOp::Or, right);
        }

        self.depth = depth;
        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut expr = self.equality()?;

        while self.match_type(TokenType::AndAnd) {
            self.enter("expression")?;
            let right = self.equality()?;
            expr = binary(expr, BinaryOp::And, right);
        }

        self.depth = depth;
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let expr = self.relation()?;

        let operator = match self.peek().token_type {
            TokenType::EqualEqual => BinaryOp::Equal,
            TokenType::BangEqual => BinaryOp::NotEqual,
            _ => return Ok(expr),
        };
        self.advance();
        self.enter("expression")?;
        let right = self.relation()?;
        self.depth -= 1;
        Ok(binary(expr, operator, right))
    }

    fn relation(&mut self) -> Result<Expr, ParseError> {
        let expr = self.additive()?;

        let operator = match self.peek().token_type {
            TokenType::LessEqual => BinaryOp::LessEqual,
            TokenType::GreaterEqual => BinaryOp::GreaterEqual,
            TokenType::Less => BinaryOp::Less,
            TokenType::Greater => BinaryOp::Greater,
            _ => return Ok(expr),
        };
        self.advance();
        self.enter("expression")?;
        let right = self.additive()?;
        self.depth -= 1;
        Ok(binary(expr, operator, right))
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut expr = self.multiplicative()?;

        loop {
            let operator = match self.peek().token_type {
                TokenType::Plus => BinaryOp::Add,
                TokenType::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.advance();
            self.enter("expression")?;
            let right = self.multiplicative()?;
            expr = binary(expr, operator, right);
        }

        self.depth = depth;
        Ok(expr)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut expr = self.unary()?;

        loop {
            let operator = match self.peek().token_type {
                TokenType::Star => BinaryOp::Multiply,
                TokenType::Slash => BinaryOp::Divide,
                _ => break,
            };
            self.advance();
            self.enter("expression")?;
            let right = self.unary()?;
            expr = binary(expr, operator, right);
        }

        self.depth = depth;
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let operator = match self.peek().token_type {
            TokenType::Minus => UnaryOp::Negate,
            TokenType::Bang => UnaryOp::Not,
            _ => return self.atom(),
        };
        self.advance();
        self.enter("expression")?;
        let operand = self.atom()?;
        self.depth -= 1;
        Ok(Expr::Unary {
            operator,
            operand: Box::new(operand),
        })
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        match self.peek().token_type {
            TokenType::IntConst => {
                let value = self.lexer.int_value().unwrap_or_default();
                self.advance();
                Ok(Expr::IntConst(value))
            }
            TokenType::StringLit => {
                let value = self.lexer.string_value().unwrap_or_default().to_string();
                self.advance();
                Ok(Expr::StringConst(value))
            }
            TokenType::Identifier => {
                let name = self.identifier()?;
                if self.check(TokenType::LeftParen) {
                    Ok(Expr::Call(self.finish_call(name)?))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            TokenType::LeftParen => {
                self.enter("expression")?;
                let expr = self.parenthesized()?;
                self.depth -= 1;
                Ok(expr)
            }
            _ => Err(self.expected("expression")),
        }
    }

    fn finish_call(&mut self, name: String) -> Result<FunctionCall, ParseError> {
        self.consume(TokenType::LeftParen)?;
        self.enter("expression")?;

        let mut args = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_type(TokenType::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenType::RightParen)?;
        self.depth -= 1;
        Ok(FunctionCall { name, args })
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        if !self.check(TokenType::Identifier) {
            return Err(self.expected("identifier"));
        }
        let name = self.lexer.string_value().unwrap_or_default().to_string();
        self.advance();
        Ok(name)
    }

    /// Opens one nesting level. Levels are only closed on success; an
    /// error abandons the parse anyway.
    fn enter(&mut self, what: &'static str) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::TooDeep {
                what,
                location: self.peek().location,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn peek(&self) -> &Token {
        self.lexer.token()
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.peek().token_type == token_type
    }

    fn advance(&mut self) {
        self.lexer.advance();
    }

    fn match_type(&mut self, token_type: TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, token_type: TokenType) -> Result<(), ParseError> {
        if self.match_type(token_type) {
            Ok(())
        } else {
            Err(self.expected(&token_type.to_string()))
        }
    }

    fn expected(&self, what: &str) -> ParseError {
        ParseError::Expected {
            expected: what.to_string(),
            found: self.peek().token_type,
            location: self.peek().location,
        }
    }
}

fn binary(left: Expr, operator: BinaryOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        operator,
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticCollector;
    use crate::lexer::{CommentFilter, Scanner};

    fn parse(source: &str) -> (Option<Program>, DiagnosticCollector) {
        let sink = DiagnosticCollector::new();
        let program = {
            let scanner = Scanner::new(source.chars().peekable(), &sink);
            Parser::new(CommentFilter::new(scanner), &sink).try_parse()
        };
        (program, sink)
    }

    fn parse_ok(source: &str) -> Program {
        let (program, sink) = parse(source);
        assert!(!sink.has_errors(), "{:?}", sink.diagnostics());
        program.expect("program should parse")
    }

    fn main_body(source: &str) -> Vec<Stmt> {
        let program = parse_ok(&format!("void main() {{ {} }}", source));
        program.functions[0].body.statements.clone()
    }

    fn assigned_expr(source: &str) -> Expr {
        match main_body(&format!("a = {};", source)).remove(0) {
            Stmt::Assignment { value, .. } => value,
            other => panic!("unexpected statement {:?}", other),
        }
    }

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Variable(name.to_string()))
    }

    #[test]
    fn function_signature() {
        let program = parse_ok("int add(int a, int b) { return a + b; } void main() {}");
        assert_eq!(program.functions.len(), 2);
        let add = &program.functions[0];
        assert_eq!(add.return_type, ReturnType::Int);
        assert_eq!(add.name, "add");
        let names: Vec<&str> = add.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(program.functions[1].return_type, ReturnType::Void);
    }

    #[test]
    fn additive_operators_are_left_associative() {
        assert_eq!(
            assigned_expr("a - b - c"),
            Expr::Binary {
                left: Box::new(Expr::Binary {
                    left: var("a"),
                    operator: BinaryOp::Subtract,
                    right: var("b"),
                }),
                operator: BinaryOp::Subtract,
                right: var("c"),
            }
        );
    }

    #[test]
    fn precedence_follows_grammar_levels() {
        assert_eq!(
            assigned_expr("a || b && c == d + e * -f"),
            Expr::Binary {
                left: var("a"),
                operator: BinaryOp::Or,
                right: Box::new(Expr::Binary {
                    left: var("b"),
                    operator: BinaryOp::And,
                    right: Box::new(Expr::Binary {
                        left: var("c"),
                        operator: BinaryOp::Equal,
                        right: Box::new(Expr::Binary {
                            left: var("d"),
                            operator: BinaryOp::Add,
                            right: Box::new(Expr::Binary {
                                left: var("e"),
                                operator: BinaryOp::Multiply,
                                right: Box::new(Expr::Unary {
                                    operator: UnaryOp::Negate,
                                    operand: var("f"),
                                }),
                            }),
                        }),
                    }),
                }),
            }
        );
    }

    #[test]
    fn statements_of_every_kind() {
        let body = main_body(
            "int a; a = 1; print(a); if (a) a = 2; else { a = 3; } \
             while (a < 3) a = a + 1; throw 5; \
             try { f(); } catch (e) when (e == 1) print(e); catch (x) {} finally { return; }",
        );
        assert!(matches!(body[0], Stmt::Declaration { .. }));
        assert!(matches!(body[1], Stmt::Assignment { .. }));
        assert!(matches!(body[2], Stmt::Call(_)));
        assert!(matches!(body[3], Stmt::If { else_branch: Some(_), .. }));
        assert!(matches!(body[4], Stmt::While { .. }));
        assert!(matches!(body[5], Stmt::Throw(Expr::IntConst(5))));
        match &body[6] {
            Stmt::TryCatch {
                catches, finally, ..
            } => {
                assert_eq!(catches.len(), 2);
                assert!(catches[0].guard.is_some());
                assert!(catches[1].guard.is_none());
                assert!(finally.is_some());
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn comments_are_invisible_to_the_parser() {
        let program = parse_ok("// header\nvoid main() { // body\n print(1); // trailing\n }");
        assert_eq!(program.functions[0].body.statements.len(), 1);
    }

    #[test]
    fn empty_input_has_no_functions() {
        let (program, sink) = parse("");
        assert!(program.is_none());
        assert_eq!(sink.error_count(), 1);
        assert!(sink.diagnostics()[0]
            .message
            .starts_with("function definition expected"));
    }

    #[test]
    fn trailing_input_is_rejected() {
        let (program, sink) = parse("void main() {} x");
        assert!(program.is_none());
        assert_eq!(sink.error_count(), 1);
        assert!(sink.diagnostics()[0].message.contains("after the last function"));
    }

    #[test]
    fn keyword_is_not_an_identifier() {
        let (program, sink) = parse("void while() {}");
        assert!(program.is_none());
        assert_eq!(
            sink.diagnostics()[0].message,
            "identifier expected, found 'while'"
        );
    }

    #[test]
    fn first_error_stops_the_parse() {
        let (program, sink) = parse("void main() { a = ; b = ; }");
        assert!(program.is_none());
        assert_eq!(sink.error_count(), 1);
        let location = sink.diagnostics()[0].location.expect("syntax errors carry a location");
        assert_eq!(location.start.column, 19);
    }

    #[test]
    fn void_parameter_is_rejected() {
        let (program, sink) = parse("void f(void a) {}");
        assert!(program.is_none());
        assert_eq!(sink.diagnostics()[0].message, "'int' expected, found 'void'");
    }

    #[test]
    fn try_needs_catch_or_finally() {
        let (program, _) = parse("void main() { try {} }");
        assert!(program.is_none());
    }

    #[test]
    fn lexical_error_token_surfaces_as_syntax_error() {
        let (program, sink) = parse("void main() { a = 1 | 2; }");
        assert!(program.is_none());
        let kinds: Vec<ErrorKind> = sink.diagnostics().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::LexError, ErrorKind::ParseError]);
    }

    #[test]
    fn printed_program_parses_to_the_same_tree() {
        let source = r#"
            int fibb(int n) {
                if (n <= 0) return 0;
                if (n == 1) return 1;
                return fibb(n - 2) + fibb(n - 1);
            }
            void main() {
                int a;
                read(a);
                print(fibb(a));
                print("tab\there \"quoted\"\n");
                a = -(1 - 2) * !a / 3 || a && 0 != 1;
                while (a > 0) { a = a - 1; }
                try { throw 1; } catch (e) when (e >= 1) { print(e); } finally { return; }
            }
        "#;
        let first = parse_ok(source);
        let printed = first.to_string();
        let second = parse_ok(&printed);
        assert_eq!(first, second);
        assert_eq!(second.to_string(), printed);
    }

    fn nesting_error(source: &str) -> Option<String> {
        let (program, sink) = parse(source);
        match program {
            Some(_) => None,
            None => Some(sink.diagnostics()[0].message.clone()),
        }
    }

    // The statement itself takes one level, leaving MAX_NESTING_DEPTH - 1
    // for the expression.
    #[test]
    fn parentheses_are_bounded() {
        let nested = |levels: usize| {
            format!(
                "void main() {{ a = {}1{}; }}",
                "(".repeat(levels),
                ")".repeat(levels)
            )
        };
        assert_eq!(nesting_error(&nested(MAX_NESTING_DEPTH - 1)), None);
        assert_eq!(
            nesting_error(&nested(MAX_NESTING_DEPTH)).as_deref(),
            Some("expression nested too deeply")
        );
        assert_eq!(
            nesting_error(&nested(100_000)).as_deref(),
            Some("expression nested too deeply")
        );
    }

    #[test]
    fn operator_chains_are_bounded() {
        let chain = |operators: usize| {
            format!("void main() {{ a = 1{}; }}", " + 1".repeat(operators))
        };
        assert_eq!(nesting_error(&chain(MAX_NESTING_DEPTH - 1)), None);
        assert_eq!(
            nesting_error(&chain(MAX_NESTING_DEPTH)).as_deref(),
            Some("expression nested too deeply")
        );

        let negations = "-(".repeat(MAX_NESTING_DEPTH) + "1" + &")".repeat(MAX_NESTING_DEPTH);
        assert_eq!(
            nesting_error(&format!("void main() {{ a = {}; }}", negations)).as_deref(),
            Some("expression nested too deeply")
        );
    }

    #[test]
    fn statements_are_bounded() {
        let nested = |levels: usize| {
            format!("void main() {{ {} a = 1; }}", "if (1) ".repeat(levels))
        };
        assert_eq!(nesting_error(&nested(MAX_NESTING_DEPTH - 1)), None);
        assert_eq!(
            nesting_error(&nested(MAX_NESTING_DEPTH)).as_deref(),
            Some("statement nested too deeply")
        );
        assert_eq!(
            nesting_error(&nested(50_000)).as_deref(),
            Some("statement nested too deeply")
        );
    }

    #[test]
    fn sibling_expressions_do_not_add_up() {
        let operand = format!("{}1{}", "(".repeat(60), ")".repeat(60));
        let source = format!("void main() {{ a = f({0}, {0}) + {0}; }}", operand);
        assert_eq!(nesting_error(&source), None);
    }

    #[test]
    fn printed_chain_at_the_limit_reparses() {
        let source = format!(
            "void main() {{ a = 1{}; }}",
            " - 1".repeat(MAX_NESTING_DEPTH - 1)
        );
        let first = parse_ok(&source);
        assert_eq!(parse_ok(&first.to_string()), first);
    }
}
