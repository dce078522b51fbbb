use anyhow::Result;
use bon_compiler::{CompileError, CompileOptions, Compiler};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "bon")]
#[command(version)]
#[command(about = "Bon Programming Language Compiler", long_about = None)]
struct Cli {
    /// Source file to compile
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Enable verbose output from the compiler
    #[arg(short, long)]
    verbose: bool,

    /// Dump intermediate representation for compiled modules
    #[arg(long)]
    asm: bool,

    /// Optimization level (0-3)
    #[arg(short = 'O', long = "opt-level", value_name = "N", default_value_t = 2)]
    opt_level: u8,

    /// Start an interactive session
    #[arg(long)]
    repl: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    let Some(stdlib_path) = std::env::var_os("BON_STDLIB_PATH").map(PathBuf::from) else {
        eprintln!(
            "BON_STDLIB_PATH not set - have you run \"source ~/.profile\" since installing?"
        );
        return ExitCode::FAILURE;
    };

    let options = CompileOptions {
        verbose: cli.verbose,
        dump_ir: cli.asm,
        opt_level: cli.opt_level.min(3),
        stdlib_path: Some(stdlib_path),
        ..CompileOptions::default()
    };

    if cli.repl {
        return match run_repl(&options) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{}", err);
                ExitCode::FAILURE
            }
        };
    }

    let Some(file) = cli.file else {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    };

    match compile(&options, &file) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn compile(options: &CompileOptions, file: &std::path::Path) -> Result<()> {
    let mut compiler = Compiler::new(options.clone());
    compiler.load_prelude()?;

    let plan = compiler.compile_file(file)?;
    if options.dump_ir {
        print!("{}", plan);
    }
    println!("{}", compiler.diags.finalize());
    Ok(())
}

/// Line-oriented REPL: each entry is type-checked against everything
/// entered so far and the inferred types of new top-level expressions
/// are printed.
fn run_repl(options: &CompileOptions) -> Result<()> {
    let stdin = std::io::stdin();
    let mut history = String::new();

    println!("Bon {} interactive session", env!("CARGO_PKG_VERSION"));
    loop {
        print!("bon> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            return Ok(());
        }

        // recheck the accumulated session plus the new entry
        let mut attempt = history.clone();
        attempt.push_str(&line);

        let mut compiler = Compiler::new(options.clone());
        if let Err(err) = compiler.load_prelude() {
            eprintln!("{}", err);
            continue;
        }
        match compiler.compile_source(&attempt, "repl") {
            Ok(_) => {
                history = attempt;
                if let Some(last) = compiler.state.toplevel_expressions.last() {
                    let type_var = last.body.type_var;
                    println!(": {}", compiler.state.types.name_of(type_var));
                }
            }
            Err(CompileError::HadErrors { .. }) => {
                // diagnostics were already printed; the entry is dropped
            }
            Err(err) => eprintln!("{}", err),
        }
    }
}
