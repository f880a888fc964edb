//! Library error type
//!
//! Runs never fail with an error once started: cancellation and busy rejection are
//! reported as outcomes. Errors here are structural misuse caught before any work
//! begins.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type BenchResult<T> = std::result::Result<T, BenchError>;
