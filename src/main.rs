//! Sara compiler CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use sara::build::{self, BuildConfig, OptLevel, OutputMode};

#[derive(Parser)]
#[command(name = "sarac", version, about = "Sara compiler")]
struct Cli {
    /// Input source path
    #[arg(default_value = "examples/in.sra")]
    input: PathBuf,

    /// Print the AST, MIR (pre- and post-optimization), and emitted IR to stdout
    #[arg(short, long)]
    debug: bool,

    /// Write optimized MIR to <stem>.mir and exit
    #[arg(long)]
    mir: bool,

    /// Write GAS assembly to <stem>.s and exit
    #[arg(long, alias = "gas")]
    asm: bool,

    /// Write LLVM IR to <stem>.ll and exit without invoking a toolchain
    #[arg(long)]
    ll: bool,

    /// Render diagnostics as plain text instead of ariadne's styled output
    #[arg(long)]
    plain: bool,

    /// Optimization level forwarded to the downstream compiler: 0-3, s, z
    #[arg(short = 'O', default_value = "0", value_name = "LEVEL")]
    opt: String,
}

fn parse_opt_level(raw: &str) -> Option<OptLevel> {
    match raw {
        "0" => Some(OptLevel::O0),
        "1" => Some(OptLevel::O1),
        "2" => Some(OptLevel::O2),
        "3" => Some(OptLevel::O3),
        "s" => Some(OptLevel::Os),
        "z" => Some(OptLevel::Oz),
        _ => None,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(opt_level) = parse_opt_level(&cli.opt) else {
        eprintln!("error: invalid optimization level '-O{}' (expected 0-3, s, or z)", cli.opt);
        return ExitCode::from(1);
    };

    let output_mode = if cli.mir {
        OutputMode::Mir
    } else if cli.asm {
        OutputMode::Gas
    } else if cli.ll {
        OutputMode::LlvmIr
    } else {
        OutputMode::Executable
    };

    let mut config = BuildConfig::new(cli.input);
    config.output_mode = output_mode;
    config.opt_level = opt_level;
    config.debug = cli.debug;
    config.plain_diagnostics = cli.plain;

    match build::build(&config) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}
