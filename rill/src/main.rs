//! Rill compiler CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command, Emit};
use console::style;
use rill::{CompileOptions, Error};
use rill_parser::lexer::tokenize;
use rill_source::{Diagnostic, Severity, Source};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("RILL_LOG"))
        .with_writer(io::stderr)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        // diagnostics were already printed
        Err(Error::Compile { .. }) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {e}", style("error").red().bold().for_stderr());
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Error> {
    match command {
        Command::Compile {
            input,
            output,
            emit,
            no_fold,
        } => {
            let content = read_source(&input)?;
            let source = Source::with_name(input.display(), &content);
            if output.is_some() {
                console::set_colors_enabled(false);
            }
            let options = CompileOptions {
                fold_constants: !no_fold,
                ..Default::default()
            };
            let result = emit_output(&source, emit, options);
            report(&source);
            write_output(output.as_deref(), &result?)
        }
        Command::Run {
            input,
            no_fold,
            dump_bytecode,
        } => {
            let content = read_source(&input)?;
            let source = Source::with_name(input.display(), &content);
            let options = CompileOptions {
                fold_constants: !no_fold,
                dump_bytecode,
            };
            let module = rill::compile(&source, options);
            report(&source);
            let module = module?;

            let mut stdout = io::stdout().lock();
            let result = rill_vm::Vm::interpret(&module, &mut stdout);
            stdout.flush().map_err(stdout_error)?;
            Ok(result?)
        }
    }
}

fn read_source(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn emit_output(source: &Source, emit: Emit, options: CompileOptions) -> Result<String, Error> {
    let mut output = String::new();
    match emit {
        Emit::Tokens => {
            for token in tokenize(source) {
                output.push_str(&format!(
                    "{:>4}:{:<3} {:<16} {:?}\n",
                    token.position.line,
                    token.position.column,
                    format!("{:?}", token.kind),
                    token.lexeme
                ));
            }
        }
        Emit::Ast => {
            let program = rill_parser::parse(source);
            output = program.to_string();
        }
        Emit::Asm => {
            output = rill::compile(source, options)?.to_string();
        }
    }
    if source.has_no_errors() {
        Ok(output)
    } else {
        Err(Error::Compile {
            errors: source.diagnostics.error_count(),
        })
    }
}

fn write_output(path: Option<&Path>, output: &str) -> Result<(), Error> {
    match path {
        Some(path) => std::fs::write(path, output).map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(output.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(stdout_error)
        }
    }
}

fn stdout_error(source: io::Error) -> Error {
    Error::Write {
        path: PathBuf::from("<stdout>"),
        source,
    }
}

/// Prints every diagnostic to stderr in source order.
fn report(source: &Source) {
    for diagnostic in source.diagnostics.sorted() {
        eprintln!("{}", render(source, &diagnostic));
    }
}

fn render(source: &Source, diagnostic: &Diagnostic) -> String {
    let severity = match diagnostic.severity {
        Severity::Error => style(diagnostic.severity).red().bold(),
        Severity::Warning => style(diagnostic.severity).yellow().bold(),
    };
    format!(
        "{}:{}: {}: {}",
        source.name,
        source.position(diagnostic.span.start),
        severity.for_stderr(),
        diagnostic.message
    )
}
