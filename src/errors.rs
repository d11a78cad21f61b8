// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PixshopError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Request to the AI service failed: {0}")]
    Transport(String),

    #[error("Failed to apply edit to image {} of {}: {message}", .index + 1, .total)]
    BatchFailed {
        index: usize,
        total: usize,
        message: String,
    },

    #[error("Could not decode media: {0}")]
    Decode(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PixshopError {
    pub fn validation(message: impl Into<String>) -> Self {
        PixshopError::Validation(message.into())
    }
}

impl ResponseError for PixshopError {
    fn error_response(&self) -> HttpResponse {
        match self {
            PixshopError::Validation(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Validation error",
                "message": self.to_string()
            })),
            PixshopError::Rejected(_) => {
                HttpResponse::UnprocessableEntity().json(serde_json::json!({
                    "error": "Request rejected by AI service",
                    "message": self.to_string()
                }))
            }
            PixshopError::Transport(_) | PixshopError::BatchFailed { .. } => {
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "AI service error",
                    "message": self.to_string()
                }))
            }
            PixshopError::Decode(_) | PixshopError::ImageProcessing(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Media processing error",
                    "message": self.to_string()
                }))
            }
            PixshopError::NotFound(_) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "Not found",
                "message": self.to_string()
            })),
            PixshopError::Config(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Configuration error",
                    "message": self.to_string()
                }))
            }
        }
    }
}
