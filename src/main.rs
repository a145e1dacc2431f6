use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use minic::runner::{self, RunOptions};
use std::fs;
use std::io::{self, Read};
use std::path::Path;

fn main() {
    match run_cli() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn command() -> Command {
    Command::new("minic")
        .about("Interpreter for a small imperative language with int and string values")
        .arg(
            Arg::new("file")
                .help("The program to run; read from stdin when omitted")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("tokens")
                .long("tokens")
                .help("Print the token stream instead of running the program")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("ast")
                .long("ast")
                .help("Print the parsed program instead of running it")
                .action(ArgAction::SetTrue)
                .conflicts_with("tokens"),
        )
        .arg(
            Arg::new("keep-comments")
                .long("keep-comments")
                .help("Include comment tokens in the --tokens output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-token-length")
                .long("max-token-length")
                .value_name("N")
                .help("Longest identifier, string or comment the scanner accepts")
                .value_parser(clap::value_parser!(usize))
                .default_value("256"),
        )
        .arg(
            Arg::new("max-call-depth")
                .long("max-call-depth")
                .value_name("N")
                .help("How deeply function calls may nest")
                .value_parser(clap::value_parser!(usize))
                .default_value("256"),
        )
}

fn run_cli() -> Result<bool> {
    let matches = command().get_matches();

    let mut options = RunOptions::default();
    if let Some(n) = matches.get_one::<usize>("max-token-length") {
        options.max_token_length = *n;
    }
    if let Some(n) = matches.get_one::<usize>("max-call-depth") {
        options.max_call_depth = *n;
    }

    let file = matches.get_one::<String>("file");
    let source = match file {
        Some(path) => read_file(Path::new(path))?,
        None => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("cannot read the program from stdin")?;
            source
        }
    };
    let filename = file.map(String::as_str);

    let ok = if matches.get_flag("tokens") {
        runner::dump_tokens(&source, filename, matches.get_flag("keep-comments"), &options)
    } else if matches.get_flag("ast") {
        runner::dump_ast(&source, filename, &options)
    } else {
        runner::run(&source, filename, &options)
    }
    .context("cannot write diagnostics")?;

    Ok(ok)
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read file '{}'", path.display()))
}
