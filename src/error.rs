use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use diesel::result::Error as DieselError;
use thiserror::Error;

use crate::dto::ApiResponse;

#[derive(Error, Debug)]
pub enum AppError {
    /// Caller-correctable input problem, reported verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("Invalid pk \"{0}\" - object does not exist.")]
    InvalidIngredient(i32),

    /// Missing or owned by someone else; the two are never distinguished.
    #[error("Not found.")]
    NotFound,

    #[error("Authentication credentials were not provided or are invalid.")]
    Unauthorized,

    #[error("Database is unavailable")]
    Unavailable,

    #[error("Database error: {0}")]
    Database(#[source] DieselError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Blocking task failed: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// Whether the error says something about the health of the database
    /// rather than about the request. Only these trip the circuit breaker.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Pool(_) | AppError::Storage(_) | AppError::Blocking(_)
        )
    }
}

impl From<DieselError> for AppError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => AppError::NotFound,
            other => AppError::Database(other),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidIngredient(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Storage(_)
            | AppError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = if self.is_infrastructure() {
            log::error!("{}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::error(message))
    }
}
