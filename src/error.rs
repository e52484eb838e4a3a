use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::repo::RepoError;

pub const RATE_LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again after 15 minutes";

/// Envelope every error response uses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub status_code: u16,
    #[schema(value_type = Option<Object>)]
    pub data: Option<serde_json::Value>,
    pub message: String,
    pub errors: Vec<String>,
    pub success: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] Validation(String),
    #[error("{0}")] BadRequest(String),
    #[error("User with the given username or email already exists!")] Conflict,
    #[error("{0}")] Upload(String),
    #[error("{0}")] Persistence(String),
    #[error("Too many requests from this IP, please try again after 15 minutes")] RateLimited,
    #[error("{0}")] NotFound(String),
    #[error("{0}")] MethodNotAllowed(String),
    #[error("Something went wrong, please try again")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Internal(msg) => {
                tracing::error!(error = %msg, "repository failure");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::BadRequest(_)
            | ApiError::Upload(_)
            | ApiError::Persistence(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ApiErrorBody {
            status_code: status.as_u16(),
            data: None,
            message: self.to_string(),
            errors: Vec::new(),
            success: false,
        })
    }
}
