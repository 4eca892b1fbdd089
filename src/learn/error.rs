use axum::{http::StatusCode, response::IntoResponse, Json};
use bigdecimal::BigDecimal;
use uuid::Uuid;

use super::store::StoreError;
use super::types::EnrollmentStatus;

#[derive(Debug, thiserror::Error)]
pub enum LearnError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("User is already enrolled in this course")]
    AlreadyEnrolled,
    #[error("Payment of {price} is required to enroll in course {course_id}")]
    PaymentRequired { course_id: Uuid, price: BigDecimal },
    #[error("User has already rated this course")]
    DuplicateRating,
    #[error("Invalid parent reply: {0}")]
    InvalidParent(String),
    #[error("User is not enrolled in this course")]
    NotEnrolled,
    #[error("Enrollment is {0}")]
    EnrollmentClosed(EnrollmentStatus),
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LearnError {
    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} {id}"))
    }

    pub fn transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyEnrolled => "already_enrolled",
            Self::PaymentRequired { .. } => "payment_required",
            Self::DuplicateRating => "duplicate_rating",
            Self::InvalidParent(_) => "invalid_parent",
            Self::NotEnrolled => "not_enrolled",
            Self::EnrollmentClosed(_) => "enrollment_closed",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Validation(_) => "validation",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized(_) => "unauthorized",
            Self::Storage(_) => "storage",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyEnrolled
            | Self::DuplicateRating
            | Self::EnrollmentClosed(_)
            | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::PaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::InvalidParent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotEnrolled | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for LearnError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("record".to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl IntoResponse for LearnError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let mut body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "code": self.code(),
        });
        if let Self::PaymentRequired { course_id, price } = &self {
            body["course_id"] = serde_json::json!(course_id);
            body["price"] = serde_json::json!(price.to_string());
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(LearnError::AlreadyEnrolled.status_code(), StatusCode::CONFLICT);
        assert_eq!(LearnError::DuplicateRating.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            LearnError::PaymentRequired {
                course_id: Uuid::new_v4(),
                price: BigDecimal::from(10),
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            LearnError::InvalidParent("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(LearnError::not_found("course", 1).status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_store_errors_become_storage_errors() {
        let err: LearnError = StoreError::Query("boom".into()).into();
        assert_eq!(err.code(), "storage");
        let err: LearnError = StoreError::NotFound.into();
        assert_eq!(err.code(), "not_found");
    }
}
