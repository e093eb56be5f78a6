//! Maps core error kinds to HTTP status codes.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("store error: {0}")]
    Store(#[from] lanwarden_core::error::StoreError),
    #[error("invalid query parameter: {0}")]
    Validation(String),
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Store(e) => {
                log::error!("request failed with a store error: {e}");
                HttpResponse::InternalServerError().json(json!({ "error": "internal error" }))
            }
            ApiError::Validation(msg) => {
                HttpResponse::BadRequest().json(json!({ "error": msg }))
            }
        }
    }
}
