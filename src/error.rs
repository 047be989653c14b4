//! Service error kinds and their HTTP mapping.
use actix_web::{error::BlockingError, http::StatusCode, HttpResponse, ResponseError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Capacity(String),

    #[error("Meeting requests are currently disabled")]
    Disabled,

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION",
            ServiceError::Auth(_) => "AUTH",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::Capacity(_) => "CAPACITY",
            ServiceError::Disabled => "DISABLED",
            ServiceError::Internal(_) => "INTERNAL",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ServiceError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ServiceError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ServiceError::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ServiceError::Internal(msg.into())
    }

    /// Message safe to return to clients. Internal details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Internal(_) => "An internal server error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::Disabled => StatusCode::BAD_REQUEST,
            ServiceError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) | ServiceError::Capacity(_) => StatusCode::CONFLICT,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ServiceError::Internal(detail) = self {
            log::error!("Request failed with internal error: {}", detail);
        }
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.kind(),
            message: self.public_message(),
        })
    }
}

impl From<DieselError> for ServiceError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => ServiceError::NotFound("Record not found".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                ServiceError::Conflict(format!("Conflicting record: {}", info.message()))
            }
            DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
                ServiceError::Conflict("Concurrent update detected, please retry".to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info) => {
                ServiceError::Validation(format!("Constraint violated: {}", info.message()))
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                ServiceError::NotFound(format!("Referenced record missing: {}", info.message()))
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for ServiceError {
    fn from(e: r2d2::Error) -> Self {
        ServiceError::Internal(format!("Database pool error: {}", e))
    }
}

impl From<BlockingError> for ServiceError {
    fn from(e: BlockingError) -> Self {
        ServiceError::Internal(format!("Blocking task failed: {}", e))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Internal(format!("Serialization error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_status_codes_follow_error_kind() {
        assert_eq!(ServiceError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::Disabled.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::Auth("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServiceError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ServiceError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(ServiceError::Capacity("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(ServiceError::internal("x").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_diesel_not_found_maps_to_not_found() {
        let err: ServiceError = DieselError::NotFound.into();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let err = ServiceError::internal("connection refused on 10.0.0.3");
        assert_eq!(err.public_message(), "An internal server error occurred");
    }

    #[actix_web::test]
    async fn test_error_body_carries_kind_and_reason() {
        let resp = ServiceError::Capacity("Host property is full".into()).error_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "CAPACITY");
        assert_eq!(json["message"], "Host property is full");
    }
}
