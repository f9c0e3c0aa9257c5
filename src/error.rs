//! Error types for the daytime service

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaytimeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Session service already started")]
    AlreadyStarted,

    #[error("No session listener registered")]
    NoListener,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DaytimeError>;
