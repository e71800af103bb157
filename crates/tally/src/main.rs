//! `tally-check`: load a ledger file and report every problem in it.
//!
//! Exit code 0 when the ledger is clean, 1 when any error was found, 2 on
//! host-level failure.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::Level;

use tally_loader::{load, LedgerError, LoadResult};

/// Validate a ledger file and report errors.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The ledger file to check.
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Show verbose output, including timing.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output; only the exit code reports the result.
    #[arg(short, long)]
    quiet: bool,
}

fn run(args: &Args) -> Result<ExitCode> {
    let mut stdout = io::stdout().lock();
    let start = std::time::Instant::now();

    if !args.file.exists() {
        bail!("file not found: {}", args.file.display());
    }

    if args.verbose && !args.quiet {
        eprintln!("Loading {}...", args.file.display());
    }
    let result = load(&args.file);

    if !args.quiet {
        report_errors(&result, &mut stdout)?;

        for warning in &result.options.warnings {
            writeln!(stdout, "warning[{}]: {}", warning.code, warning.message)?;
        }

        if args.verbose {
            writeln!(
                stdout,
                "\n{} directives from {} file(s) in {:.2}ms (input hash {})",
                result.directives.len(),
                result.source_map.files().len(),
                start.elapsed().as_secs_f64() * 1000.0,
                &result.input_hash[..12],
            )?;
        }

        match result.errors.len() {
            0 => writeln!(stdout, "No errors.")?,
            1 => writeln!(stdout, "1 error.")?,
            n => writeln!(stdout, "{n} errors.")?,
        }
    }

    if result.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

/// Print each pipeline error, with a source excerpt for parse errors.
fn report_errors(result: &LoadResult, out: &mut impl Write) -> Result<()> {
    for error in &result.errors {
        match error {
            LedgerError::Parse { path, error } => {
                let location = result
                    .source_map
                    .get_by_path(path)
                    .map(|file| {
                        let (line, col) = file.line_col(error.span.start);
                        let excerpt = file.line(line).unwrap_or("").to_string();
                        (line, col, excerpt)
                    });
                match location {
                    Some((line, col, excerpt)) => {
                        writeln!(
                            out,
                            "error: {}:{line}:{col}: {}",
                            path.display(),
                            error.message()
                        )?;
                        writeln!(out, "  | {excerpt}")?;
                    }
                    None => {
                        writeln!(out, "error: {}: {}", path.display(), error.message())?;
                    }
                }
            }
            other => writeln!(out, "error: {other}")?,
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .init();
    }

    match run(&args) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
