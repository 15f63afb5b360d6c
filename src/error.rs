//! Error types.
//!
//! Configuration problems surface as a [`HandlerError`] carrying a stable
//! numeric [`ErrorCode`]. Individual request failures are [`FetchError`]s and
//! never abort a batch unless the configuration asks for it.

use thiserror::Error;

/// Stable numeric codes attached to every [`HandlerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    FileRead = 100,
    JsonUnmarshal = 101,
    FileOpen = 102,
    MissingUrls = 103,
    MissingTimeout = 104,
    EmptyUrlFile = 105,
    ConfigurationVerification = 107,
    TaskFault = 109,
    FetchAborted = 110,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// The underlying cause of a [`HandlerError`], when there is one.
#[derive(Debug, Error)]
pub enum HandlerCause {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    HeaderName(#[from] reqwest::header::InvalidHeaderName),

    #[error(transparent)]
    HeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// A structured error: a code, a human-readable message and an optional cause.
#[derive(Debug, Error)]
#[error("{message} (code {})", .code.as_u16())]
pub struct HandlerError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<HandlerCause>,
}

impl HandlerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_cause(
        code: ErrorCode,
        message: impl Into<String>,
        cause: impl Into<HandlerCause>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(cause.into()),
        }
    }
}

/// Why a single URL produced no entry.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request construction, connection, timeout, redirect limit or body read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The batch was cancelled while the request was still in flight.
    #[error("cancelled before completion")]
    Cancelled,
}
