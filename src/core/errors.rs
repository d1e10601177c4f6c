// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;

/// The main error enum, representing all possible failures within the gate.
#[derive(Error, Debug)]
pub enum HustGateError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArgumentCount(String),

    #[error("syntax error")]
    SyntaxError,

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("value is not a valid float")]
    NotAFloat,

    #[error("min or max is not a float")]
    RangeBoundNotAFloat,

    #[error("hash value is not an integer")]
    HashValueNotAnInteger,

    #[error("Partition error: {0}")]
    Partition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ParseIntError> for HustGateError {
    fn from(_: ParseIntError) -> Self {
        HustGateError::NotAnInteger
    }
}

impl From<ParseFloatError> for HustGateError {
    fn from(_: ParseFloatError) -> Self {
        HustGateError::NotAFloat
    }
}

impl From<serde_json::Error> for HustGateError {
    fn from(e: serde_json::Error) -> Self {
        HustGateError::Internal(format!("JSON error: {e}"))
    }
}

impl HustGateError {
    /// Renders the error as the payload of a RESP error reply. Every variant
    /// is prefixed with `ERR`, matching what redis clients expect from a
    /// generic server error.
    pub fn to_resp_error(&self) -> String {
        format!("ERR {self}")
    }
}
