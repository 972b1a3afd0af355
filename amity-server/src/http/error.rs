//! API error types with IntoResponse
//!
//! Every error renders as `{"error": "<code>", "message": "<text>"}`.
//! Server-side failures are logged and answered with a generic message.

use amity_core::AmityError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::AuthError;
use crate::db::repos::DbError;
use crate::geo::GeoError;
use crate::models::ValidationError;
use crate::uploads::UploadError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Validation failed (400)
    Validation(ValidationError),

    /// Request not allowed by domain rules (400)
    BadRequest(String),

    /// Missing or bad credentials (401)
    Unauthorized(String),

    /// Authenticated but not allowed (403)
    Forbidden { reason: String },

    /// Resource not found (404)
    NotFound { resource: &'static str, id: String },

    /// State conflict, e.g. duplicate request (409)
    Conflict(String),

    /// Upload over the size limit (413)
    PayloadTooLarge { max: usize },

    /// A dependency such as the ZIP lookup failed (502)
    Upstream(String),

    /// Database error (500, logged)
    Database(DbError),

    /// Internal error (500, logged)
    Internal { message: String },
}

impl ApiError {
    pub fn internal(message: impl ToString) -> Self {
        Self::Internal {
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Upstream(_) => "upstream_error",
            Self::Database(_) | Self::Internal { .. } => "internal_error",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::BadRequest(m) | Self::Unauthorized(m) | Self::Conflict(m) => m.clone(),
            Self::Forbidden { reason } => reason.clone(),
            Self::NotFound { resource, id } => format!("{} '{}' not found", resource, id),
            Self::PayloadTooLarge { max } => format!("upload exceeds {} bytes", max),
            Self::Upstream(_) => "an upstream service failed".to_string(),
            Self::Database(_) | Self::Internal { .. } => "an internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Database(e) => tracing::error!("Database error: {}", e),
            Self::Internal { message } => tracing::error!("Internal error: {}", message),
            Self::Upstream(detail) => tracing::warn!("Upstream error: {}", detail),
            _ => {}
        }

        let status = self.status();
        let body = Json(json!({
            "error": self.code(),
            "message": self.message(),
        }));

        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound { resource, id } => Self::NotFound { resource, id },
            DbError::Conflict(m) => Self::Conflict(m),
            DbError::Invalid(m) => Self::BadRequest(m),
            _ => Self::Database(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidToken(_)
            | AuthError::Expired
            | AuthError::SessionMismatch
            | AuthError::SessionInactive => Self::Unauthorized(e.to_string()),
            AuthError::WeakSecret { .. } | AuthError::MissingSecret | AuthError::Hash(_) => {
                Self::internal(e)
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::TooLarge { max } => Self::PayloadTooLarge { max },
            UploadError::UnsupportedType(_) | UploadError::ContentMismatch(_) | UploadError::Empty => {
                Self::BadRequest(e.to_string())
            }
            UploadError::InvalidPath(_) | UploadError::Io(_) => Self::internal(e),
        }
    }
}

impl From<GeoError> for ApiError {
    fn from(e: GeoError) -> Self {
        match e {
            GeoError::NotFound(zip) => Self::NotFound {
                resource: "zip code",
                id: zip,
            },
            GeoError::Upstream(detail) => Self::Upstream(detail),
        }
    }
}

impl From<AmityError> for ApiError {
    fn from(e: AmityError) -> Self {
        match e {
            AmityError::UnknownVariant { .. } | AmityError::SelfReference { .. } => {
                Self::BadRequest(e.to_string())
            }
            _ => Self::internal(e),
        }
    }
}
