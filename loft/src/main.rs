use clap::{Parser, Subcommand};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

use loft_core::codegen::KernelModule;
use loft_core::ir::verify::verify_graph;

/// Times the execution of a closure and prints the elapsed time if verbose.
fn time<T, F: FnOnce() -> T>(name: &str, verbose: bool, f: F) -> T {
    let start = Instant::now();
    let result = f();
    if verbose {
        let elapsed = start.elapsed().as_millis();
        eprintln!("{}: {}ms", name, elapsed);
    }
    result
}

#[derive(Parser)]
#[command(name = "loft")]
#[command(about = "Kernel-source backend driver for the loft offload runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit kernel source from a serialized kernel module
    Compile {
        /// Input kernel module (JSON)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (defaults to input name with .cl extension)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Print verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Verify a kernel module without emitting source
    Check {
        /// Input kernel module (JSON)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Print verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Debug, Error)]
enum DriverError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Module parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Compilation error: {0}")]
    CompilationError(#[from] loft_core::InternalError),
}

fn main() -> Result<(), DriverError> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { input, output, verbose } => {
            compile_file(input, output, verbose)?;
        }
        Commands::Check { input, verbose } => {
            check_file(input, verbose)?;
        }
    }

    Ok(())
}

fn compile_file(input: PathBuf, output: Option<PathBuf>, verbose: bool) -> Result<(), DriverError> {
    if verbose {
        info!("Compiling {}...", input.display());
    }

    let source = fs::read_to_string(&input)?;
    let mut module: KernelModule = time("parse", verbose, || serde_json::from_str(&source))?;
    let text = time("emit", verbose, || module.emit())?;

    let output_path = output.unwrap_or_else(|| {
        let mut path = input.clone();
        path.set_extension("cl");
        path
    });
    fs::write(&output_path, text)?;

    if verbose {
        info!(
            "Successfully compiled kernel {} to {}",
            module.prototype.name,
            output_path.display()
        );
    }

    Ok(())
}

fn check_file(input: PathBuf, verbose: bool) -> Result<(), DriverError> {
    if verbose {
        info!("Checking {}...", input.display());
    }

    let source = fs::read_to_string(&input)?;
    let mut module: KernelModule = time("parse", verbose, || serde_json::from_str(&source))?;

    if let Err(errors) = time("verify", verbose, || verify_graph(&module.graph)) {
        for error in &errors {
            eprintln!("error: {}", error);
        }
        return Err(loft_core::err_structure!(
            "{} verification error(s) in kernel {}",
            errors.len(),
            module.prototype.name
        )
        .into());
    }

    // A well-formed graph can still fail to structure; emit and discard.
    time("emit", verbose, || module.emit())?;

    if verbose {
        info!(
            "Kernel {} verified: {} blocks, {} ops",
            module.prototype.name,
            module.graph.num_blocks(),
            module.graph.num_ops()
        );
    }

    Ok(())
}
