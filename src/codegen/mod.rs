//! Shared error type for both code generation backends (spec §4.9, §4.10).

pub mod gas;
pub mod llvm;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodeGenError {
    #[error("unknown function '{0}' referenced during code generation")]
    UnknownFunction(String),
    #[error("unknown variable '{0}' referenced during code generation")]
    UnknownVariable(String),
    #[error("unknown temporary '{0}' referenced during code generation")]
    UnknownTemporary(String),
}

pub type Result<T> = std::result::Result<T, CodeGenError>;
