//! Error handling for the branch inventory ledger
//!
//! Every workflow and ledger failure is a typed `AppError`. The controller
//! layer renders them through `ErrorDetail`, or through axum directly when the
//! `http` feature is enabled.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use shared::{BranchId, ProductId};

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Input errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule errors
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error(
        "Insufficient stock for product {product_id} at branch {branch_id}: \
         {available} available, {requested} requested"
    )]
    InsufficientStock {
        branch_id: BranchId,
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("Product {product_id} is not stocked at branch {branch_id}")]
    ProductNotStocked {
        branch_id: BranchId,
        product_id: ProductId,
    },

    #[error(
        "Return of {requested} exceeds what remains of sale {sale_id} for product {product_id} \
         ({sold} sold, {already_returned} already returned)"
    )]
    ReturnExceedsSold {
        sale_id: Uuid,
        product_id: ProductId,
        sold: i64,
        already_returned: i64,
        requested: i64,
    },

    #[error("Actor has no branch assigned")]
    NoBranchAssigned,

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a field validation failure
    pub fn validation(field: &str, message: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    /// Stable machine-readable code for the caller
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::ProductNotStocked { .. } => "PRODUCT_NOT_STOCKED",
            AppError::ReturnExceedsSold { .. } => "RETURN_EXCEEDS_SOLD",
            AppError::NoBranchAssigned => "NO_BRANCH_ASSIGNED",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) | AppError::MigrationError(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Caller-facing description. Storage and internal failures are not
    /// described beyond their code.
    pub fn detail(&self) -> ErrorDetail {
        let (message, field) = match self {
            AppError::Validation { field, message } => (message.clone(), Some(field.clone())),
            AppError::DatabaseError(_) | AppError::MigrationError(_) => {
                ("A database error occurred".to_string(), None)
            }
            AppError::InternalError(_) => ("An internal error occurred".to_string(), None),
            AppError::InsufficientStock { product_id, .. }
            | AppError::ProductNotStocked { product_id, .. }
            | AppError::ReturnExceedsSold { product_id, .. } => {
                (self.to_string(), Some(format!("product:{}", product_id)))
            }
            other => (other.to_string(), None),
        };

        ErrorDetail {
            code: self.code().to_string(),
            message,
            field,
        }
    }

    /// True for failures caused by the request rather than the system
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            AppError::Configuration(_)
                | AppError::DatabaseError(_)
                | AppError::MigrationError(_)
                | AppError::Internal(_)
                | AppError::InternalError(_)
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("failed '{}' check", e.code))
                    })
                    .unwrap_or_else(|| "is invalid".to_string());
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("input".to_string(), errors.to_string()));

        AppError::Validation { field, message }
    }
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NoBranchAssigned => StatusCode::FORBIDDEN,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::InsufficientStock { .. }
            | AppError::ProductNotStocked { .. }
            | AppError::ReturnExceedsSold { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::MigrationError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        }

        (
            status,
            axum::Json(ErrorResponse {
                error: self.detail(),
            }),
        )
            .into_response()
    }
}

/// Result type alias for ledger operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_names_product() {
        let err = AppError::InsufficientStock {
            branch_id: 1,
            product_id: 7,
            available: 4,
            requested: 5,
        };
        let detail = err.detail();
        assert_eq!(detail.code, "INSUFFICIENT_STOCK");
        assert_eq!(detail.field.as_deref(), Some("product:7"));
        assert!(detail.message.contains("product 7"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let err = AppError::InternalError(anyhow::anyhow!("secret connection string"));
        let detail = err.detail();
        assert_eq!(detail.code, "INTERNAL_ERROR");
        assert!(!detail.message.contains("secret"));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_configuration_errors_are_server_side() {
        let err: AppError = config::ConfigError::NotFound("database.url".to_string()).into();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_validator_errors_convert_to_field_error() {
        use validator::Validate;

        let input = shared::CreateReturnInput {
            sale_id: Uuid::new_v4(),
            product_id: 7,
            quantity: 0,
            reason: None,
        };
        let err: AppError = input.validate().unwrap_err().into();
        match err {
            AppError::Validation { field, .. } => assert_eq!(field, "quantity"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
