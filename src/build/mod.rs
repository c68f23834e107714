//! Build orchestration: wires every pipeline stage together and, for a
//! full build, shells out to the external toolchain (spec §6). Grounded on
//! the teacher's `build::build`, generalized from BMB's direct
//! LLVM-crate/object-file path to this crate's textual-IR-plus-subprocess
//! path (the teacher's `#[cfg(not(feature = "llvm"))]` branch is the closer
//! analogue: it also shells out to `clang` over a `.ll` file).

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::ast::optimize as ast_optimize;
use crate::codegen::{gas, llvm, CodeGenError};
use crate::error::{report_ariadne, DiagnosticConfig, DiagnosticSink, Severity};
use crate::lexer::tokenize;
use crate::mir::{lower, optimize as mir_optimize};
use crate::parser::parse;
use crate::resolver::resolve;
use crate::types::check;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptLevel {
    #[default]
    O0,
    O1,
    O2,
    O3,
    Os,
    Oz,
}

impl OptLevel {
    pub fn as_flag(self) -> &'static str {
        match self {
            OptLevel::O0 => "-O0",
            OptLevel::O1 => "-O1",
            OptLevel::O2 => "-O2",
            OptLevel::O3 => "-O3",
            OptLevel::Os => "-Os",
            OptLevel::Oz => "-Oz",
        }
    }
}

/// What a build invocation should produce. Mirrors spec §6's `--mir`,
/// `--asm`/`--gas`, and `--ll` flags, each of which writes one artifact and
/// exits before any external toolchain is invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Executable,
    Mir,
    Gas,
    LlvmIr,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub input: PathBuf,
    pub output_mode: OutputMode,
    pub opt_level: OptLevel,
    pub debug: bool,
    pub plain_diagnostics: bool,
}

impl BuildConfig {
    pub fn new(input: PathBuf) -> Self {
        Self { input, output_mode: OutputMode::default(), opt_level: OptLevel::default(), debug: false, plain_diagnostics: false }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("compilation failed with {error_count} error(s)")]
    Diagnostics { error_count: usize },

    #[error("code generation error: {0}")]
    CodeGen(#[from] CodeGenError),

    #[error("toolchain error: {0}")]
    Toolchain(String),
}

pub type BuildResult<T> = Result<T, BuildError>;

pub fn build(config: &BuildConfig) -> BuildResult<()> {
    let source = std::fs::read_to_string(&config.input)?;

    let mut lex_errors = Vec::new();
    let tokens = tokenize(&source, &mut lex_errors);

    let mut sink = DiagnosticSink::new(DiagnosticConfig::default());
    for d in lex_errors {
        sink.emit(d);
    }

    let mut program = parse(&tokens, &mut sink);
    if sink.has_errors() {
        report_and_fail(&sink, &source, &config.input, config.plain_diagnostics)?;
    }

    resolve(&program, &mut sink);
    check(&program, &mut sink);
    if sink.has_errors() {
        report_and_fail(&sink, &source, &config.input, config.plain_diagnostics)?;
    }

    if config.debug {
        println!("-- AST --\n{program:#?}");
    }

    let interner = ast_optimize::optimize(&mut program);
    if config.debug {
        println!("-- AST optimizer: {} node(s) interned --", interner.len());
    }

    let mut mir = lower::lower_program(&program);
    if config.debug {
        println!("-- MIR (pre-optimization) --\n{}", mir.to_text());
    }

    mir_optimize::optimize(&mut mir);
    if config.debug {
        println!("-- MIR (optimized) --\n{}", mir.to_text());
    }

    match config.output_mode {
        OutputMode::Mir => {
            write_sibling(&config.input, "mir", &mir.to_text())?;
            return Ok(());
        }
        OutputMode::Gas => {
            let asm = gas::emit_program(&mir)?;
            write_sibling(&config.input, "s", &asm)?;
            return Ok(());
        }
        OutputMode::LlvmIr => {
            let ir = llvm::emit_program(&mir)?;
            write_sibling(&config.input, "ll", &ir)?;
            return Ok(());
        }
        OutputMode::Executable => {}
    }

    let ir = llvm::emit_program(&mir)?;
    if config.debug {
        println!("-- LLVM IR --\n{ir}");
    }
    let ir_path = config.input.with_extension("ll");
    std::fs::write(&ir_path, &ir)?;

    let output_path = config.input.with_extension(if cfg!(windows) { "exe" } else { "" });
    let clang = find_clang().map_err(BuildError::Toolchain)?;
    let status = Command::new(&clang)
        .args([config.opt_level.as_flag(), ir_path.to_str().unwrap(), "-o", output_path.to_str().unwrap()])
        .status()?;
    if !status.success() {
        return Err(BuildError::Toolchain(format!("{clang} exited with {status}")));
    }

    let _ = std::fs::remove_file(&ir_path);
    Ok(())
}

fn report_and_fail(sink: &DiagnosticSink, source: &str, path: &Path, plain: bool) -> BuildResult<()> {
    let filename = path.to_string_lossy();
    for d in sink.diagnostics() {
        if plain {
            eprintln!("{}", d.render_plain(source));
        } else {
            report_ariadne(&filename, source, d);
        }
    }
    eprintln!("{}", sink.summary());
    let error_count = sink.diagnostics().iter().filter(|d| d.severity == Severity::Error).count();
    Err(BuildError::Diagnostics { error_count })
}

fn write_sibling(input: &Path, ext: &str, content: &str) -> BuildResult<()> {
    let path = input.with_extension(ext);
    std::fs::write(path, content)?;
    Ok(())
}

fn find_clang() -> Result<String, String> {
    let candidates = if cfg!(target_os = "windows") {
        vec!["clang", "clang.exe"]
    } else {
        vec!["clang", "clang-18", "clang-17", "clang-16", "clang-15"]
    };
    find_first_available(&candidates).ok_or_else(|| "clang not found; install LLVM/clang".to_string())
}

#[allow(dead_code)]
fn find_llc() -> Result<String, String> {
    find_first_available(&["llc", "llc-18", "llc-17"]).ok_or_else(|| "llc not found".to_string())
}

#[allow(dead_code)]
fn find_gnu_as() -> Result<String, String> {
    find_first_available(&["as"]).ok_or_else(|| "GNU as not found".to_string())
}

#[allow(dead_code)]
fn find_linker() -> Result<String, String> {
    find_first_available(&["ld", "lld", "gcc", "cc"]).ok_or_else(|| "no linker found".to_string())
}

fn find_first_available(candidates: &[&str]) -> Option<String> {
    for candidate in candidates {
        if Command::new(candidate).arg("--version").output().is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}
