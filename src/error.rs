use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sea_orm::DbErr;
use serde_json::{json, Value};
use static_assertions::assert_impl_all;
use tracing::{event, Level};

#[derive(thiserror::Error, Debug)]
pub enum Error
where
    Self: Send + Sync,
{
    #[error("Unauthorized")]
    Unauthorized,
    #[error("No credits left")]
    InsufficientCredit,
    #[error("{0}")]
    BadRequest(String),
    #[error("Not found")]
    NotFound,
    #[error("Failed to extract website theme: {0}")]
    ExtractionFailed(String),
    #[error("Failed to generate image: {message}")]
    GenerationFailed {
        message: String,
        details: Option<Value>,
    },
    #[error("Failed to fetch generated image: {0}")]
    FetchFailed(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Failed to create generation record: {0}")]
    PersistenceFailed(String),
    #[error("Failed to create signed URL: {0}")]
    SigningFailed(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

assert_impl_all!(Error: Send, Sync);

pub type Result<T> = std::result::Result<T, Error>;

impl From<DbErr> for Error {
    fn from(e: DbErr) -> Self {
        Error::Database(e.to_string())
    }
}

impl Error {
    pub fn generation(message: impl Into<String>) -> Self {
        Error::GenerationFailed {
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::InsufficientCredit | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            event!(Level::ERROR, "{}", self);
        } else {
            event!(Level::DEBUG, "{}", self);
        }
        let body = match &self {
            Error::GenerationFailed {
                details: Some(details),
                ..
            } => json!({ "error": self.to_string(), "details": details }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
