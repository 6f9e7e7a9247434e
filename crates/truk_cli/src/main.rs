//! Thin command-line front end over the truk compilation pipeline.
//!
//! This binary only parses arguments, invokes the pipeline, prints
//! diagnostics and writes output files. Build manifests, caching and the
//! downstream C toolchain are deliberately outside it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use truk_base::Interner;
use truk_compile::compile::{check_file, compile_file, CompileOptions, CompileOutput};
use truk_compile::{AssemblyKind, Reporter};

#[derive(Parser)]
#[command(name = "truk", version, about = "truk language compiler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile an entry file to C source.
    Compile {
        /// Entry source file.
        entry: PathBuf,
        /// Output path for the generated C (defaults to stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Import search paths, tried in order after the importing file's
        /// directory.
        #[arg(short = 'I', long = "include", value_name = "DIR")]
        include: Vec<PathBuf>,
        /// Build a library (.c/.h pair) instead of an application.
        #[arg(long)]
        lib: bool,
        /// Header basename for library mode.
        #[arg(long, requires = "lib")]
        header: Option<String>,
        /// Print the compilation-unit metadata as JSON on stdout.
        #[arg(long)]
        metadata: bool,
    },
    /// Resolve imports and type-check without emitting.
    Check {
        entry: PathBuf,
        #[arg(short = 'I', long = "include", value_name = "DIR")]
        include: Vec<PathBuf>,
    },
    /// Dump the token stream of one file.
    Tokens { file: PathBuf },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Compile { entry, output, include, lib, header, metadata } => {
            let options = CompileOptions {
                search_paths: include,
                assembly: if lib { AssemblyKind::Library } else { AssemblyKind::Application },
                header_name: header,
            };
            let result = compile_file(&entry, &options);
            report(&result);
            if !result.success() {
                return ExitCode::FAILURE;
            }

            if metadata {
                if let Some(meta) = &result.metadata {
                    match serde_json::to_string_pretty(meta) {
                        Ok(json) => println!("{}", json),
                        Err(err) => log::warn!("failed to serialize metadata: {}", err),
                    }
                }
            }

            let Some(assembly) = &result.assembly else {
                return ExitCode::FAILURE;
            };

            match &output {
                Some(path) => {
                    if let Err(err) = std::fs::write(path, &assembly.source) {
                        eprintln!("error: failed to write '{}': {}", path.display(), err);
                        return ExitCode::FAILURE;
                    }
                    if let (Some(header_text), Some(header_name)) =
                        (&assembly.header, &assembly.header_name)
                    {
                        let header_path = path
                            .parent()
                            .map(|d| d.join(header_name))
                            .unwrap_or_else(|| PathBuf::from(header_name));
                        if let Err(err) = std::fs::write(&header_path, header_text) {
                            eprintln!(
                                "error: failed to write '{}': {}",
                                header_path.display(),
                                err
                            );
                            return ExitCode::FAILURE;
                        }
                    }
                }
                None => print!("{}", assembly.source),
            }
            ExitCode::SUCCESS
        }
        Command::Check { entry, include } => {
            let result = check_file(&entry, include);
            report(&result);
            if result.success() {
                eprintln!("ok");
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Tokens { file } => {
            let source = match std::fs::read_to_string(&file) {
                Ok(source) => source,
                Err(err) => {
                    eprintln!("error: failed to read '{}': {}", file.display(), err);
                    return ExitCode::FAILURE;
                }
            };
            let mut interner = Interner::new();
            for token in truk_language::lexer::tokenize(&source, &mut interner) {
                println!(
                    "{:>5} {:>3}:{:<3} {:?} {:?}",
                    token.source_index,
                    token.line,
                    token.column,
                    token.kind,
                    interner.resolve(token.lexeme)
                );
            }
            ExitCode::SUCCESS
        }
    }
}

fn report(result: &CompileOutput) {
    let reporter = Reporter::new();
    for warning in &result.warnings {
        eprint!("{}", reporter.render_warning(warning));
    }
    for diag in &result.diagnostics {
        eprint!("{}", reporter.render(diag, result.source_for(diag)));
    }
}
