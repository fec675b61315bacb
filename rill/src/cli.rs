//! Command-line interface for the Rill compiler.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rill")]
#[command(about = "Rill programming language compiler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a source file and print the requested representation
    Compile {
        input: PathBuf,
        /// Write the output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Emit::Asm)]
        emit: Emit,
        /// Disable constant folding
        #[arg(long)]
        no_fold: bool,
    },
    /// Compile and execute a source file
    Run {
        input: PathBuf,
        /// Disable constant folding
        #[arg(long)]
        no_fold: bool,
        /// Print the generated bytecode to stderr before running
        #[arg(long)]
        dump_bytecode: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Emit {
    /// The token stream
    Tokens,
    /// The parsed program, pretty-printed
    Ast,
    /// The textual assembly of the generated bytecode
    Asm,
}
