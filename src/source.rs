//! Character sources consumed by the scanner and by the `read` built-in.
//!
//! A source hands out one character at a time and lets the consumer look one
//! character ahead. Any `Peekable` iterator of `char` is a source; byte
//! readers are adapted through [`ReaderSource`], which decodes UTF-8 itself.

use std::io::{self, BufRead, Bytes};
use std::iter::Peekable;
use std::str::{self, Utf8Error};
use thiserror::Error;

pub trait CharSource {
    /// Next character without consuming it, `None` at end of input.
    fn peek_char(&mut self) -> Option<char>;

    /// Consumes and returns the next character, `None` at end of input.
    fn next_char(&mut self) -> Option<char>;

    /// The failure that ended the input early, if any. Taking it clears it.
    fn take_error(&mut self) -> Option<CharReaderError> {
        None
    }
}

impl<I: Iterator<Item = char>> CharSource for Peekable<I> {
    fn peek_char(&mut self) -> Option<char> {
        self.peek().copied()
    }

    fn next_char(&mut self) -> Option<char> {
        self.next()
    }
}

#[derive(Debug, Error)]
pub enum CharReaderError {
    #[error("failed to read bytes: {0}")]
    Io(#[from] io::Error),
    #[error("unexpected UTF-8 start byte: {0:#010b}")]
    BadStartByte(u8),
    #[error("failed to convert byte sequence to UTF-8: {0}")]
    Utf8(#[from] Utf8Error),
}

/// Decodes the bytes of a buffered reader into characters.
#[derive(Debug)]
pub struct CharReader<R: BufRead> {
    input: Peekable<Bytes<R>>,
    buf: Vec<u8>,
}

impl<R: BufRead> CharReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: input.bytes().peekable(),
            buf: Vec::with_capacity(4),
        }
    }

    fn decode_multi_byte(&mut self, first_byte: u8) -> Result<char, CharReaderError> {
        self.buf.clear();
        self.buf.push(first_byte);
        while let Some(next) = self.input.peek() {
            match next {
                Ok(b) if (b & 0b1100_0000) == 0b1000_0000 => {
                    self.buf.push(*b);
                    self.input.next();
                }
                Ok(_) => break,
                Err(_) => {
                    if let Some(Err(e)) = self.input.next() {
                        return Err(e.into());
                    }
                    break;
                }
            }
        }
        let s = str::from_utf8(&self.buf)?;
        s.chars()
            .next()
            .ok_or(CharReaderError::BadStartByte(first_byte))
    }
}

impl<R: BufRead> Iterator for CharReader<R> {
    type Item = Result<char, CharReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.input.next()? {
            Ok(b) if b.is_ascii() => Some(Ok(b as char)),
            Ok(b) if (b & 0b1100_0000) == 0b1100_0000 => Some(self.decode_multi_byte(b)),
            Ok(b) => Some(Err(CharReaderError::BadStartByte(b))),
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// A [`CharSource`] over any buffered reader, such as a locked stdin.
///
/// The first decoding or I/O failure ends the stream; it can be retrieved
/// with [`CharSource::take_error`].
#[derive(Debug)]
pub struct ReaderSource<R: BufRead> {
    reader: CharReader<R>,
    lookahead: Option<char>,
    error: Option<CharReaderError>,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: CharReader::new(input),
            lookahead: None,
            error: None,
        }
    }

    fn fill(&mut self) {
        if self.lookahead.is_some() || self.error.is_some() {
            return;
        }
        match self.reader.next() {
            Some(Ok(c)) => self.lookahead = Some(c),
            Some(Err(e)) => self.error = Some(e),
            None => {}
        }
    }
}

impl<R: BufRead> CharSource for ReaderSource<R> {
    fn peek_char(&mut self) -> Option<char> {
        self.fill();
        self.lookahead
    }

    fn next_char(&mut self) -> Option<char> {
        self.fill();
        self.lookahead.take()
    }

    fn take_error(&mut self) -> Option<CharReaderError> {
        self.error.take()
    }
}
