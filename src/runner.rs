use crate::ast::Program;
use crate::error::{Diagnostic, DiagnosticCollector, ErrorSink};
use crate::evaluator::{Interpreter, RuntimeError, DEFAULT_MAX_CALL_DEPTH};
use crate::lexer::{CommentFilter, Scanner, TokenSource, MAX_TOKEN_LENGTH};
use crate::parser::{Parser, MAX_NESTING_DEPTH};
use crate::source::{CharSource, ReaderSource};
use std::io::{self, BufReader, Write};
use std::panic;
use std::thread;

/// Stack for the pipeline thread before any interpreted call is made.
const BASE_STACK_SIZE: usize = 8 << 20;

/// Stack for one interpreted call. Its body nests at most
/// `MAX_NESTING_DEPTH` levels, each a few evaluator frames deep.
const CALL_STACK_SIZE: usize = MAX_NESTING_DEPTH * (8 << 10) + (64 << 10);

/// Knobs shared by every entry point of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub max_token_length: usize,
    pub max_call_depth: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_token_length: MAX_TOKEN_LENGTH,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

fn scanner<'a>(
    source: &'a str,
    sink: &'a dyn ErrorSink,
    options: &RunOptions,
) -> Scanner<'a, std::iter::Peekable<std::str::Chars<'a>>> {
    Scanner::new(source.chars().peekable(), sink).with_max_token_length(options.max_token_length)
}

/// Scans and parses `source` with comments filtered out.
pub fn parse(source: &str, sink: &dyn ErrorSink, options: &RunOptions) -> Option<Program> {
    let lexer = CommentFilter::new(scanner(source, sink, options));
    Parser::new(lexer, sink).try_parse()
}

/// Stack the pipeline thread needs to reach `max_call_depth` nested calls.
pub fn stack_size(options: &RunOptions) -> usize {
    options
        .max_call_depth
        .saturating_add(1)
        .saturating_mul(CALL_STACK_SIZE)
        .saturating_add(BASE_STACK_SIZE)
}

/// Parses and interprets `source`. Returns `true` when the program ran to
/// completion without errors.
///
/// The work happens on a thread whose stack is sized by [`stack_size`], so
/// the caller's own stack does not bound the call depth. Diagnostics are
/// forwarded to `sink` once that thread is done.
pub fn execute(
    source: &str,
    sink: &dyn ErrorSink,
    output: &mut (dyn Write + Send),
    input: &mut (dyn CharSource + Send),
    options: &RunOptions,
) -> bool {
    let size = stack_size(options);
    let outcome = thread::scope(|scope| {
        let worker = thread::Builder::new()
            .name("minic".to_string())
            .stack_size(size)
            .spawn_scoped(scope, move || interpret(source, output, input, options))?;
        Ok::<_, io::Error>(worker.join())
    });

    match outcome {
        Ok(Ok((ok, diagnostics))) => {
            for diagnostic in diagnostics {
                sink.report_diagnostic(diagnostic);
            }
            ok
        }
        Ok(Err(payload)) => panic::resume_unwind(payload),
        Err(_) => {
            let error = RuntimeError::StackReservation {
                megabytes: size >> 20,
                depth: options.max_call_depth,
            };
            sink.report_runtime_error(error.to_string());
            false
        }
    }
}

fn interpret(
    source: &str,
    output: &mut dyn Write,
    input: &mut dyn CharSource,
    options: &RunOptions,
) -> (bool, Vec<Diagnostic>) {
    let sink = DiagnosticCollector::new();
    let Some(program) = parse(source, &sink, options) else {
        return (false, sink.drain());
    };

    let ok = Interpreter::new(&sink, output, input)
        .with_max_call_depth(options.max_call_depth)
        .run(&program);
    (ok, sink.drain())
}

/// Runs `source` against the process's stdin and stdout and renders the
/// collected diagnostics to stderr.
pub fn run(source: &str, filename: Option<&str>, options: &RunOptions) -> io::Result<bool> {
    let sink = DiagnosticCollector::new();
    let mut input = ReaderSource::new(BufReader::new(io::stdin()));
    let mut output = io::stdout();

    execute(source, &sink, &mut output, &mut input, options);

    report_all(&sink, source, filename)?;
    Ok(!sink.has_errors())
}

/// Prints one line per token, for inspecting what the scanner produces.
pub fn dump_tokens(
    source: &str,
    filename: Option<&str>,
    keep_comments: bool,
    options: &RunOptions,
) -> io::Result<bool> {
    let sink = DiagnosticCollector::new();
    let mut out = io::stdout().lock();

    let lexer = scanner(source, &sink, options);
    if keep_comments {
        write_tokens(lexer, &mut out)?;
    } else {
        write_tokens(CommentFilter::new(lexer), &mut out)?;
    }
    out.flush()?;

    report_all(&sink, source, filename)?;
    Ok(!sink.has_errors())
}

/// Prints the parsed program back as source text.
pub fn dump_ast(source: &str, filename: Option<&str>, options: &RunOptions) -> io::Result<bool> {
    let sink = DiagnosticCollector::new();
    if let Some(program) = parse(source, &sink, options) {
        print!("{}", program);
    }

    report_all(&sink, source, filename)?;
    Ok(!sink.has_errors())
}

pub fn write_tokens<L: TokenSource>(mut lexer: L, out: &mut dyn Write) -> io::Result<()> {
    while lexer.advance() {
        let token = lexer.token();
        writeln!(out, "{}\t{}", token.location.start, token)?;
    }
    Ok(())
}

fn report_all(sink: &DiagnosticCollector, source: &str, filename: Option<&str>) -> io::Result<()> {
    for diagnostic in sink.drain() {
        diagnostic.report(source, filename)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_runs_a_program() {
        let sink = DiagnosticCollector::new();
        let mut output = Vec::new();
        let mut input = "".chars().peekable();
        let ok = execute(
            "void main() { print(\"hi\"); }",
            &sink,
            &mut output,
            &mut input,
            &RunOptions::default(),
        );
        assert!(ok);
        assert_eq!(String::from_utf8(output).unwrap(), "hi");
    }

    #[test]
    fn execute_stops_on_syntax_error() {
        let sink = DiagnosticCollector::new();
        let mut output = Vec::new();
        let mut input = "".chars().peekable();
        let ok = execute(
            "void main() { print(1) }",
            &sink,
            &mut output,
            &mut input,
            &RunOptions::default(),
        );
        assert!(!ok);
        assert_eq!(sink.error_count(), 1);
        assert!(output.is_empty());
    }

    #[test]
    fn execute_forwards_warnings_with_their_location() {
        let sink = DiagnosticCollector::new();
        let mut output = Vec::new();
        let mut input = "".chars().peekable();
        let options = RunOptions {
            max_token_length: 4,
            ..RunOptions::default()
        };
        let ok = execute(
            "void main() { } // a long comment",
            &sink,
            &mut output,
            &mut input,
            &options,
        );
        assert!(ok);
        let diagnostics = sink.diagnostics();
        assert_eq!(sink.warning_count(), 1);
        assert_eq!(diagnostics[0].location.map(|l| l.start.column), Some(17));
    }

    #[test]
    fn stack_grows_with_call_depth() {
        let shallow = RunOptions {
            max_call_depth: 1,
            ..RunOptions::default()
        };
        assert!(stack_size(&RunOptions::default()) > stack_size(&shallow));
        assert!(stack_size(&shallow) > BASE_STACK_SIZE);

        let unbounded = RunOptions {
            max_call_depth: usize::MAX,
            ..RunOptions::default()
        };
        assert_eq!(stack_size(&unbounded), usize::MAX);
    }

    #[test]
    fn token_dump_lists_tokens_with_positions() {
        let sink = DiagnosticCollector::new();
        let mut out = Vec::new();
        let lexer = scanner("int x; // c", &sink, &RunOptions::default());
        write_tokens(lexer, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "1:1\t'int'",
                "1:5\tidentifier \"x\"",
                "1:6\t';'",
                "1:8\tcomment \" c\"",
            ]
        );
    }
}
