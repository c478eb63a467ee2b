use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

use crate::domain::errors::DomainError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{message}")]
    Conflict { message: String, retryable: bool },

    #[error("{0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        let retryable = e.is_retryable();
        let message = e.to_string();
        match e {
            DomainError::InvalidRequest(_) | DomainError::IllegalPaymentTransition { .. } => {
                AppError::BadRequest(message)
            }
            DomainError::OrderNotFound => AppError::NotFound(message),
            DomainError::ProductNotFound(_) => AppError::Unprocessable(message),
            DomainError::InsufficientStock { .. }
            | DomainError::ConcurrentConflict(_)
            | DomainError::IllegalTransition { .. }
            | DomainError::AlreadyCancelled
            | DomainError::DuplicateInvoice(_) => AppError::Conflict { message, retryable },
            DomainError::StockTimeout(_) => AppError::Unavailable(message),
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Internal(detail) => {
                log::error!("Request failed: {}", detail);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Internal server error"
                }))
            }
            AppError::Conflict { retryable, .. } => {
                HttpResponse::build(self.status_code()).json(serde_json::json!({
                    "error": self.to_string(),
                    "retryable": retryable
                }))
            }
            AppError::Unavailable(_) => {
                HttpResponse::build(self.status_code()).json(serde_json::json!({
                    "error": self.to_string(),
                    "retryable": true
                }))
            }
            _ => HttpResponse::build(self.status_code()).json(serde_json::json!({
                "error": self.to_string()
            })),
        }
    }
}
