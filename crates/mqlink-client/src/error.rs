//! Client error types.

use std::io;

use thiserror::Error;

/// Failure reported by the packet transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport closed")]
    Closed,
}

/// Client error type.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Handler not started")]
    NotStarted,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] mqlink_core::ProtocolError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
