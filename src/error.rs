//! Crate-wide error type.

use std::io;
use thiserror::Error;

use crate::accumulator::AccumulatorError;

/// Errors that can occur while reading inputs or building masks.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Htslib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Contig '{0}' not found in genome file")]
    UnknownContig(String),

    #[error("No depth values found, check the input file format")]
    NoDepthValues,

    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a parse error on a 1-based line number.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }
}
