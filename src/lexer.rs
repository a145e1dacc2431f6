use crate::error::{ErrorKind, ErrorSink, LexLocation, Position};
use crate::source::CharSource;
use std::collections::HashMap;
use std::fmt;

/// Upper bound on the characters kept for one identifier, string or comment.
pub const MAX_TOKEN_LENGTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Error,

    // Tokens with a payload
    Identifier,
    IntConst,
    StringLit,
    Comment,

    // Keywords
    Void,
    Int,
    If,
    Else,
    While,
    Return,
    Throw,
    Try,
    Catch,
    Finally,
    When,

    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Semicolon,
    Plus,
    Minus,
    Star,
    Slash,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Two character tokens
    OrOr,
    AndAnd,

    Eof,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            TokenType::Error => "error",
            TokenType::Identifier => "identifier",
            TokenType::IntConst => "integer constant",
            TokenType::StringLit => "string literal",
            TokenType::Comment => "comment",
            TokenType::Void => "'void'",
            TokenType::Int => "'int'",
            TokenType::If => "'if'",
            TokenType::Else => "'else'",
            TokenType::While => "'while'",
            TokenType::Return => "'return'",
            TokenType::Throw => "'throw'",
            TokenType::Try => "'try'",
            TokenType::Catch => "'catch'",
            TokenType::Finally => "'finally'",
            TokenType::When => "'when'",
            TokenType::LeftParen => "'('",
            TokenType::RightParen => "')'",
            TokenType::LeftBrace => "'{'",
            TokenType::RightBrace => "'}'",
            TokenType::Comma => "','",
            TokenType::Semicolon => "';'",
            TokenType::Plus => "'+'",
            TokenType::Minus => "'-'",
            TokenType::Star => "'*'",
            TokenType::Slash => "'/'",
            TokenType::Bang => "'!'",
            TokenType::BangEqual => "'!='",
            TokenType::Equal => "'='",
            TokenType::EqualEqual => "'=='",
            TokenType::Less => "'<'",
            TokenType::LessEqual => "'<='",
            TokenType::Greater => "'>'",
            TokenType::GreaterEqual => "'>='",
            TokenType::OrOr => "'||'",
            TokenType::AndAnd => "'&&'",
            TokenType::Eof => "end of input",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenValue {
    None,
    Str(String),
    Int(i32),
}

/// A token together with its payload.
///
/// Identifiers, string literals and comments carry a string; integer
/// constants carry an `i32`; every other kind, `Error` included, carries
/// nothing. The constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub location: LexLocation,
    value: TokenValue,
}

impl Token {
    pub fn new(token_type: TokenType, location: LexLocation) -> Self {
        Self {
            token_type,
            location,
            value: TokenValue::None,
        }
    }

    pub fn with_string(token_type: TokenType, text: String, location: LexLocation) -> Self {
        debug_assert!(matches!(
            token_type,
            TokenType::Identifier | TokenType::StringLit | TokenType::Comment
        ));
        Self {
            token_type,
            location,
            value: TokenValue::Str(text),
        }
    }

    pub fn with_int(value: i32, location: LexLocation) -> Self {
        Self {
            token_type: TokenType::IntConst,
            location,
            value: TokenValue::Int(value),
        }
    }

    pub fn error(location: LexLocation) -> Self {
        Self::new(TokenType::Error, location)
    }

    pub fn string_value(&self) -> Option<&str> {
        match &self.value {
            TokenValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn int_value(&self) -> Option<i32> {
        match self.value {
            TokenValue::Int(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.value {
            TokenValue::None => write!(f, "{}", self.token_type),
            TokenValue::Str(s) => write!(f, "{} {:?}", self.token_type, s),
            TokenValue::Int(n) => write!(f, "{} {}", self.token_type, n),
        }
    }
}

/// Anything the parser can pull tokens from.
pub trait TokenSource {
    /// Reads the next token. Returns `false` only at the end of input.
    fn advance(&mut self) -> bool;

    /// The token produced by the last `advance`.
    fn token(&self) -> &Token;

    fn string_value(&self) -> Option<&str> {
        self.token().string_value()
    }

    fn int_value(&self) -> Option<i32> {
        self.token().int_value()
    }
}

/// Hand-written scanner producing one token per `advance` call.
pub struct Scanner<'a, S: CharSource> {
    input: S,
    sink: &'a dyn ErrorSink,
    position: Position,
    token: Token,
    max_token_length: usize,
    keywords: HashMap<&'static str, TokenType>,

    // Reused between tokens.
    buf: String,
}

impl<'a, S: CharSource> Scanner<'a, S> {
    pub fn new(input: S, sink: &'a dyn ErrorSink) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("void", TokenType::Void);
        keywords.insert("int", TokenType::Int);
        keywords.insert("if", TokenType::If);
        keywords.insert("else", TokenType::Else);
        keywords.insert("while", TokenType::While);
        keywords.insert("return", TokenType::Return);
        keywords.insert("throw", TokenType::Throw);
        keywords.insert("try", TokenType::Try);
        keywords.insert("catch", TokenType::Catch);
        keywords.insert("finally", TokenType::Finally);
        keywords.insert("when", TokenType::When);

        let position = Position::new();
        Self {
            input,
            sink,
            position,
            token: Token::new(TokenType::Eof, LexLocation::single(position)),
            max_token_length: MAX_TOKEN_LENGTH,
            keywords,
            buf: String::new(),
        }
    }

    pub fn with_max_token_length(mut self, max_token_length: usize) -> Self {
        self.max_token_length = max_token_length;
        self
    }

    fn peek(&mut self) -> Option<char> {
        self.input.peek_char()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.input.next_char()?;
        self.position.step(c);
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn location_from(&self, start: Position) -> LexLocation {
        LexLocation::new(start, self.position)
    }

    fn report_error(&self, start: Position, message: &str) {
        self.sink.report_error(
            ErrorKind::LexError,
            self.location_from(start),
            message.to_string(),
        );
    }

    fn scan_token(&mut self, start: Position, c: char) -> Token {
        if c.is_ascii_alphabetic() || c == '_' {
            return self.identifier(start);
        }
        if c.is_ascii_digit() {
            return self.number(start);
        }

        self.bump();
        let token_type = match c {
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '{' => TokenType::LeftBrace,
            '}' => TokenType::RightBrace,
            ',' => TokenType::Comma,
            ';' => TokenType::Semicolon,
            '+' => TokenType::Plus,
            '-' => TokenType::Minus,
            '*' => TokenType::Star,
            '!' => self.either('=', TokenType::BangEqual, TokenType::Bang),
            '=' => self.either('=', TokenType::EqualEqual, TokenType::Equal),
            '<' => self.either('=', TokenType::LessEqual, TokenType::Less),
            '>' => self.either('=', TokenType::GreaterEqual, TokenType::Greater),
            '|' => return self.doubled(start, '|', TokenType::OrOr),
            '&' => return self.doubled(start, '&', TokenType::AndAnd),
            '/' => {
                if self.peek() == Some('/') {
                    self.bump();
                    return self.comment(start);
                }
                TokenType::Slash
            }
            '"' => return self.string(start),
            _ => {
                self.report_error(start, &format!("unknown token '{}'", c.escape_default()));
                return Token::error(self.location_from(start));
            }
        };

        Token::new(token_type, self.location_from(start))
    }

    fn either(&mut self, next: char, matched: TokenType, alone: TokenType) -> TokenType {
        if self.peek() == Some(next) {
            self.bump();
            matched
        } else {
            alone
        }
    }

    fn doubled(&mut self, start: Position, c: char, token_type: TokenType) -> Token {
        if self.peek() == Some(c) {
            self.bump();
            Token::new(token_type, self.location_from(start))
        } else {
            self.report_error(start, &format!("unknown token '{}'", c));
            Token::error(self.location_from(start))
        }
    }

    fn identifier(&mut self, start: Position) -> Token {
        self.buf.clear();
        let mut too_long = false;

        while let Some(c) = self.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            self.bump();
            if self.buf.len() < self.max_token_length {
                self.buf.push(c);
            } else {
                too_long = true;
            }
        }

        let location = self.location_from(start);
        if too_long {
            self.report_error(start, "too long identifier");
            return Token::error(location);
        }

        match self.keywords.get(self.buf.as_str()) {
            Some(keyword) => Token::new(*keyword, location),
            None => Token::with_string(TokenType::Identifier, self.buf.clone(), location),
        }
    }

    fn number(&mut self, start: Position) -> Token {
        let first = self.bump().and_then(|c| c.to_digit(10)).unwrap_or(0);

        if first == 0 && matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.skip_digits();
            self.report_error(start, "illegal leading zero");
            return Token::error(self.location_from(start));
        }

        let mut value = Some(first as i32);
        while let Some(digit) = self.peek().and_then(|c| c.to_digit(10)) {
            self.bump();
            value = value
                .and_then(|v| v.checked_mul(10))
                .and_then(|v| v.checked_add(digit as i32));
            if value.is_none() {
                self.skip_digits();
                self.report_error(start, "too big integral constant");
                return Token::error(self.location_from(start));
            }
        }

        match value {
            Some(n) => Token::with_int(n, self.location_from(start)),
            None => Token::error(self.location_from(start)),
        }
    }

    fn skip_digits(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
    }

    /// Scans the text of a `//` comment; both slashes are already consumed.
    fn comment(&mut self, start: Position) -> Token {
        self.buf.clear();
        let mut length = 0;
        let mut truncated = false;

        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
            if length < self.max_token_length {
                self.buf.push(c);
                length += 1;
            } else {
                truncated = true;
            }
        }

        let location = self.location_from(start);
        if truncated {
            self.sink.report_warning(
                ErrorKind::LexError,
                location,
                "too long comment, the rest of the line is ignored".to_string(),
            );
        }
        Token::with_string(TokenType::Comment, self.buf.clone(), location)
    }

    fn string(&mut self, start: Position) -> Token {
        self.buf.clear();
        let mut length = 0;

        loop {
            let c = match self.peek() {
                None => {
                    self.report_error(start, "unterminated string");
                    return Token::error(self.location_from(start));
                }
                Some('\n') => {
                    self.report_error(start, "string broken by newline");
                    return Token::error(self.location_from(start));
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    let escaped = match self.peek() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('"') => '"',
                        Some('\\') => '\\',
                        _ => {
                            self.report_error(start, "illegal escape sequence");
                            self.skip_rest_of_string();
                            return Token::error(self.location_from(start));
                        }
                    };
                    self.bump();
                    escaped
                }
                Some(c) => {
                    self.bump();
                    c
                }
            };

            if length == self.max_token_length {
                self.report_error(start, "too long string");
                self.skip_rest_of_string();
                return Token::error(self.location_from(start));
            }
            self.buf.push(c);
            length += 1;
        }

        Token::with_string(TokenType::StringLit, self.buf.clone(), self.location_from(start))
    }

    /// Skips to the closing quote (consumed) or to the end of the line (kept).
    fn skip_rest_of_string(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
            if c == '"' {
                break;
            }
        }
    }
}

impl<'a, S: CharSource> TokenSource for Scanner<'a, S> {
    fn advance(&mut self) -> bool {
        self.skip_whitespace();
        let start = self.position;

        match self.peek() {
            None => {
                self.token = Token::new(TokenType::Eof, LexLocation::single(start));
                false
            }
            Some(c) => {
                self.token = self.scan_token(start, c);
                true
            }
        }
    }

    fn token(&self) -> &Token {
        &self.token
    }
}

/// Hides comment tokens from whoever reads through it.
pub struct CommentFilter<L: TokenSource> {
    inner: L,
}

impl<L: TokenSource> CommentFilter<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

impl<L: TokenSource> TokenSource for CommentFilter<L> {
    fn advance(&mut self) -> bool {
        loop {
            if !self.inner.advance() {
                return false;
            }
            if self.inner.token().token_type != TokenType::Comment {
                return true;
            }
        }
    }

    fn token(&self) -> &Token {
        self.inner.token()
    }
}
