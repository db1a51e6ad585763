use std::{error::Error, fmt::Display};

use thiserror::Error;

#[derive(Error, Debug)]
pub struct SerdeJsonError {
    pub msg: String,
    #[source]
    pub source: serde_json::Error,
}

impl Display for SerdeJsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.msg, self.source)
    }
}

#[derive(Error, Debug)]
pub struct ReqwestError {
    pub msg: String,
    #[source]
    pub source: reqwest::Error,
}

impl Display for ReqwestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.msg, self.source)
    }
}

#[derive(Error, Debug)]
pub enum RequestError {
    /// The HTTP layer failed before a response could be read.
    Reqwest(ReqwestError),
    /// The node answered with a JSON-RPC error object.
    JsonRpc { code: i64, message: String },
    /// The node answered with a non-success HTTP status.
    Http { status: u16, body: String },
    Other(String),
}

impl Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::Reqwest(e) => write!(f, "{}: {}", e.msg, e.source),
            RequestError::JsonRpc { code, message } => {
                write!(f, "JSON-RPC error {code}: {message}")
            }
            RequestError::Http { status, body } => write!(f, "HTTP status {status}: {body}"),
            RequestError::Other(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RPCError {
    #[error("RPC setup error: {0}")]
    SetupError(String),
    #[error("Request error: {0}")]
    RequestError(RequestError),
    #[error("Serialize error: {0}")]
    SerializeError(SerdeJsonError),
    #[error("Unknown error: {0}")]
    UnknownError(String),
}

impl RPCError {
    pub(crate) fn other<S: ToString>(msg: S) -> Self {
        RPCError::RequestError(RequestError::Other(msg.to_string()))
    }

    pub(crate) fn from_reqwest<S: ToString>(msg: S, error: reqwest::Error) -> Self {
        RPCError::RequestError(RequestError::Reqwest(ReqwestError {
            msg: msg.to_string(),
            source: error,
        }))
    }

    pub(crate) fn from_serde<S: ToString>(msg: S, error: serde_json::Error) -> Self {
        RPCError::SerializeError(SerdeJsonError { msg: msg.to_string(), source: error })
    }
}

/// Invalid arguments to the block range partitioner.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,
    #[error("block interval must be greater than zero")]
    ZeroBlockInterval,
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid block range: {0}")]
    InvalidRange(#[from] RangeError),
    #[error("Failed to fetch blocks {first}..={last}: {source}")]
    Chunk {
        first: u64,
        last: u64,
        #[source]
        source: RPCError,
    },
}

/// Helper function to extract the full error chain including source errors
pub(crate) fn extract_error_chain(error: &dyn Error) -> String {
    let mut chain = vec![error.to_string()];
    let mut source = error.source();

    while let Some(err) = source {
        chain.push(err.to_string());
        source = err.source();
    }

    if chain.len() == 1 {
        chain[0].clone()
    } else {
        format!("{} (caused by: {})", chain[0], chain[1..].join(" -> "))
    }
}
