//! Crate-wide error type.
//! Translator failures inside a batch are counted, not propagated. Only
//! single-shot calls such as the quality review surface them here.

use thiserror::Error;

use crate::translate::TranslateError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("translator error: {0}")]
    Translator(#[from] TranslateError),
}

pub type Result<T> = std::result::Result<T, Error>;
