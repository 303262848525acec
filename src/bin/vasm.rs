//! Assembler front end: source text in, a raw code image out.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "vasm", about = "Assembles a program into a raw code image")]
struct Args {
    /// Assembly source file.
    input: PathBuf,

    /// Output path for the assembled image (defaults to the input path with a `.bin`
    /// extension).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let source = match fs::read_to_string(&args.input) {
        Ok(s) => s,
        Err(e) => {
            error!(path = %args.input.display(), %e, "failed to read source file");
            return ExitCode::FAILURE;
        }
    };

    let code = match tcvm::assembler::assemble(&source) {
        Ok(code) => code,
        Err(errors) => {
            for err in &errors {
                eprintln!("{err}");
            }
            return ExitCode::FAILURE;
        }
    };

    let output = args.output.unwrap_or_else(|| args.input.with_extension("bin"));
    if let Err(e) = fs::write(&output, &code) {
        error!(path = %output.display(), %e, "failed to write output image");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();
}
