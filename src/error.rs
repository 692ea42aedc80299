use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde::Serialize;
use utoipa::ToSchema;

/// Error taxonomy shared by the store, the spreadsheet normalizer and the handlers.
#[derive(Debug, Display)]
pub enum AppError {
    /// Missing or invalid request input
    #[display(fmt = "{}", _0)]
    Validation(String),

    /// Malformed spreadsheet or unparsable numeric field
    #[display(fmt = "{}", _0)]
    Parse(String),

    #[display(fmt = "{}", _0)]
    NotFound(String),

    /// Storage failures; the detail is logged, never returned to the caller
    #[display(fmt = "Internal Server Error")]
    Internal(String),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "Missing required fields")]
    pub error: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Parse(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!(error = %e, "Database operation failed");
        AppError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        tracing::error!(error = %e, "Stored JSON could not be (de)serialized");
        AppError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_status_codes() {
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Parse("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn test_internal_detail_is_hidden() {
        let resp = AppError::Internal("connection refused".into()).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal Server Error");
    }

    #[actix_web::test]
    async fn test_validation_message_is_returned() {
        let resp = AppError::Validation("Missing required fields".into()).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Missing required fields");
    }
}
