use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser as ClapParser, ValueEnum, error::ErrorKind};
use colored::Colorize;
use spc::{
    CompileError, Compilation, compile,
    frontend::{SourceFile, SourceFileOrigin},
    middle::ir::pretty_print::{compare_listing, pretty_print_ir},
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Tokens,
    Ast,
    Symbols,
    Ir,
    Optimized,
    All,
}

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    source_files: Vec<PathBuf>,

    /// What to print for each successfully compiled file
    #[arg(long, value_enum, default_value_t = Emit::Optimized)]
    emit: Emit,

    /// Show the IR before and after optimization side by side
    #[arg(long)]
    compare: bool,

    /// Print optimization statistics
    #[arg(long)]
    stats: bool,

    /// Log more (repeat for more detail). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("spc={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn header(title: &str) {
    println!("{}", format!("== {title} ==").bold());
}

fn emit(compilation: &Compilation, emit: Emit) {
    let all = emit == Emit::All;

    if all || emit == Emit::Tokens {
        header("tokens");
        for token in &compilation.tokens {
            println!("{:4}: {:<24} {token}", token.line, format!("{:?}", token.kind));
        }
    }

    if all || emit == Emit::Ast {
        header("syntax tree");
        println!("{:#?}", compilation.program);
    }

    if all || emit == Emit::Symbols {
        header("symbol table");
        print!("{}", compilation.symbol_table);
    }

    if all || emit == Emit::Ir {
        header("intermediate code");
        pretty_print_ir(&compilation.instructions);
    }

    if all || emit == Emit::Optimized {
        header("optimized code");
        pretty_print_ir(&compilation.optimized.instructions);
    }
}

fn report_failure(source_file: &SourceFile, error: &CompileError) {
    if let CompileError::Semantic { diagnostics, .. } = error {
        for diagnostic in diagnostics {
            eprintln!("{}", diagnostic.render());
            eprintln!(
                " {} {}",
                "-->".blue(),
                source_file.format_line_position(diagnostic.line)
            );
            source_file.highlight_line(diagnostic.line);
        }
    } else {
        for (line, message) in error.messages() {
            eprintln!("{}: {message}", "error".red().bold());
            eprintln!(" {} {}", "-->".blue(), source_file.format_line_position(line));
            source_file.highlight_line(line);
        }
    }

    eprintln!(
        "{}: could not compile `{}` due to {error}",
        "error".red().bold(),
        source_file.origin
    );
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.exists() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", source_file.display()),
                )
                .exit()
        }

        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", source_file.display()),
                )
                .exit()
        }
    }

    /* Read in source files */

    let source_files = args
        .source_files
        .iter()
        .map(|path| {
            let contents = std::fs::read_to_string(path).with_context(|| {
                format!("Failed to read '{}' (or invalid UTF-8)", path.display())
            })?;

            Ok(SourceFile {
                contents,
                origin: SourceFileOrigin::File(path.clone()),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut failed = false;

    for source_file in &source_files {
        tracing::info!(origin = %source_file.origin, "compiling");

        let compilation = match compile(source_file) {
            Ok(compilation) => compilation,
            Err(error) => {
                report_failure(source_file, &error);
                failed = true;
                continue;
            }
        };

        emit(&compilation, args.emit);

        if args.compare {
            header("original vs optimized");
            print!(
                "{}",
                compare_listing(
                    &compilation.instructions,
                    &compilation.optimized.instructions
                )
            );
        }

        if args.stats {
            header("optimization statistics");
            println!("{}", compilation.optimized.stats);
        }
    }

    if failed {
        std::process::exit(1);
    }

    Ok(())
}
