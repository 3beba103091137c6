//! Error taxonomy for the API surface.
//!
//! Every error carries a stable machine-readable `code` plus a human message.
//! Controllers return these directly; actix renders them as `{code, message}`
//! JSON bodies via the `ResponseError` impl.

use actix_web::{HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Missing or malformed request fields
    Validation(String),
    /// Bad or missing API key
    Authentication(String),
    /// Invoice payer restriction violated
    Forbidden(String),
    /// Unknown invoice / payment / agent
    NotFound(String),
    /// Invoice already paid
    AlreadySettled(String),
    /// Recipient reference is neither an address nor a known agent
    UnknownRecipient(String),
    /// Resolved recipient is not a well-formed chain address
    InvalidRecipient(String),
    /// Product id could not be parsed as a non-negative integer
    InvalidProductId(String),
    /// Forward request expired or malformed
    RelayRejected(String),
    /// Chain reported insufficient balance or allowance
    InsufficientFunds(String),
    /// A chain read or write failed; underlying message preserved
    SettlementFailed(String),
    /// Receipt not observed within the timeout. The transaction may still land.
    SettlementTimeout(String),
    /// Storage or other internal failure
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Authentication(_) => "AUTHENTICATION_FAILED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadySettled(_) => "ALREADY_SETTLED",
            Self::UnknownRecipient(_) => "UNKNOWN_RECIPIENT",
            Self::InvalidRecipient(_) => "INVALID_RECIPIENT",
            Self::InvalidProductId(_) => "INVALID_PRODUCT_ID",
            Self::RelayRejected(_) => "RELAY_REJECTED",
            Self::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            Self::SettlementFailed(_) => "SETTLEMENT_FAILED",
            Self::SettlementTimeout(_) => "SETTLEMENT_TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m)
            | Self::Authentication(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::AlreadySettled(m)
            | Self::UnknownRecipient(m)
            | Self::InvalidRecipient(m)
            | Self::InvalidProductId(m)
            | Self::RelayRejected(m)
            | Self::InsufficientFunds(m)
            | Self::SettlementFailed(m)
            | Self::SettlementTimeout(m)
            | Self::Internal(m) => m,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl actix_web::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::InvalidRecipient(_)
            | Self::InvalidProductId(_)
            | Self::RelayRejected(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::UnknownRecipient(_) => StatusCode::NOT_FOUND,
            Self::AlreadySettled(_) => StatusCode::CONFLICT,
            // Insufficient funds is a settlement failure: the chain call
            // reverted (or the relayer ran dry), not a malformed request
            Self::InsufficientFunds(_) | Self::SettlementFailed(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::SettlementTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "code": self.code(),
            "message": self.message(),
        }))
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError::Internal(format!("Database error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Authentication("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::AlreadySettled("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::SettlementTimeout("x".into()).status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ApiError::InvalidProductId("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InsufficientFunds("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::SettlementFailed("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ApiError::SettlementFailed("x".into()).code(), "SETTLEMENT_FAILED");
        assert_eq!(ApiError::RelayRejected("x".into()).code(), "RELAY_REJECTED");
        assert_eq!(ApiError::InsufficientFunds("x".into()).code(), "INSUFFICIENT_FUNDS");
    }
}
