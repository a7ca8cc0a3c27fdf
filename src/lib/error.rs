use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("arithmetic overflow while applying {0}")]
    Overflow(String),
    #[error("event {id} at block {block_number} log {log_index} arrived after the committed cursor")]
    OutOfOrder {
        id: String,
        block_number: u64,
        log_index: u64,
    },
    #[error("indexer halted after fault: {0}")]
    Halted(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for IndexError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for IndexError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rocksdb::Error> for IndexError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

impl IntoResponse for IndexError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MalformedEvent(_)
            | Self::Overflow(_)
            | Self::OutOfOrder { .. }
            | Self::Halted(_)
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();
        (status, Json(ErrorBody { message: &message })).into_response()
    }
}
