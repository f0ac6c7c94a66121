use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::lifecycle::LifecycleError;
use crate::validation::FieldError;

/// AppError
///
/// The single error type returned by handlers. Every variant maps onto one HTTP status
/// and renders the `{"error": {"message", "status", "details"?}}` envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;

/// ErrorBody
///
/// Wire shape of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub message: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(entity: &str) -> Self {
        AppError::NotFound(format!("{entity} not found"))
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("Insufficient permissions".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (message, details) = match self {
            AppError::Validation(fields) => {
                // The first field message doubles as the headline, matching what clients display.
                let message = fields
                    .first()
                    .map(|f| f.message.clone())
                    .unwrap_or_else(|| "Validation failed".to_string());
                (message, Some(fields))
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                ("Internal server error".to_string(), None)
            }
            other => (other.to_string(), None),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                message,
                status: status.as_u16(),
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// RepoError
///
/// Failure modes of the persistence layer. Unique-constraint violations are separated
/// out so that handlers can answer 409 instead of 500.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    /// A foreign key pointed at a row that does not exist.
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let constraint = db_err.constraint().unwrap_or("unique constraint").to_string();
                RepoError::Conflict(constraint)
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                let constraint = db_err.constraint().unwrap_or("foreign key").to_string();
                RepoError::InvalidReference(constraint)
            }
            _ => RepoError::Database(err),
        }
    }
}

/// The client-facing field behind a unique constraint. Unknown constraints map to
/// `None` so their names never reach a response.
fn conflict_field(constraint: &str) -> Option<&'static str> {
    match constraint {
        "users_email_key" => Some("email"),
        "users_username_key" => Some("username"),
        "posts_slug_key" | "categories_slug_key" | "tags_slug_key" => Some("slug"),
        "categories_name_key" | "tags_name_key" => Some("name"),
        _ => None,
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => AppError::NotFound("Resource not found".to_string()),
            RepoError::Conflict(constraint) => match conflict_field(&constraint) {
                Some(field) => AppError::Conflict(format!("A record with this {field} already exists")),
                None => AppError::Conflict("Resource already exists".to_string()),
            },
            RepoError::InvalidReference(constraint) => {
                tracing::warn!(constraint = %constraint, "Foreign key violation");
                AppError::BadRequest("Referenced record does not exist".to_string())
            }
            RepoError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                AppError::Internal("Database error".to_string())
            }
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
