//! Convenience front end: assembles a source file (or loads a raw image) and runs it
//! in one step, without leaving an intermediate `.bin` on disk.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use tcvm::consts::{DEFAULT_CORE_SIZE, DEFAULT_STACK_SIZE};
use tcvm::interpreter::{ExecuteOutcome, Vm};

#[derive(Parser, Debug)]
#[command(name = "vm", about = "Assembles and runs a program in one step")]
struct Args {
    /// Assembly source file, or a raw code image with `--raw`.
    input: PathBuf,

    /// Treat `input` as an already-assembled code image rather than source text.
    #[arg(long)]
    raw: bool,

    /// Total memory image size, in bytes.
    #[arg(long, default_value_t = DEFAULT_CORE_SIZE)]
    core_size: usize,

    /// Stack region carved from the top of the image, in bytes.
    #[arg(long, default_value_t = DEFAULT_STACK_SIZE)]
    stack_size: usize,

    /// Caps the number of instructions executed before giving up.
    #[arg(long)]
    max_steps: Option<u64>,

    /// Path to a dynamically loaded external-variable library.
    #[arg(long)]
    externals: Option<String>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let image = if args.raw {
        match fs::read(&args.input) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(path = %args.input.display(), %e, "failed to read code image");
                return ExitCode::FAILURE;
            }
        }
    } else {
        let source = match fs::read_to_string(&args.input) {
            Ok(s) => s,
            Err(e) => {
                error!(path = %args.input.display(), %e, "failed to read source file");
                return ExitCode::FAILURE;
            }
        };
        match tcvm::assembler::assemble(&source) {
            Ok(code) => code,
            Err(errors) => {
                for err in &errors {
                    eprintln!("{err}");
                }
                return ExitCode::FAILURE;
            }
        }
    };

    let mut vm = match &args.externals {
        Some(lib) => match unsafe { Vm::with_externals_library(args.core_size, args.stack_size, lib) } {
            Ok(vm) => vm,
            Err(e) => {
                error!(%e, "failed to construct VM");
                return ExitCode::FAILURE;
            }
        },
        None => match Vm::new(args.core_size, args.stack_size) {
            Ok(vm) => vm,
            Err(e) => {
                error!(%e, "failed to construct VM");
                return ExitCode::FAILURE;
            }
        },
    };
    vm.set_verbose(args.verbose);

    if let Err(e) = vm.load_program(&image) {
        error!(%e, "failed to load code image");
        return ExitCode::FAILURE;
    }

    match vm.run(args.max_steps) {
        ExecuteOutcome::Halted => {
            let code = vm.registers().unsigned(0) as u8;
            info!(code, "program halted");
            ExitCode::from(code)
        }
        ExecuteOutcome::StepLimitReached => {
            error!("step limit reached before halt");
            ExitCode::FAILURE
        }
        ExecuteOutcome::Error(e) => {
            error!(%e, "execution failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();
}
