use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreeningError {
    /// 校验器拒绝，携带面向用户的原因
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Model is not ready yet, please retry later")]
    ModelNotReady,

    /// 模型加载或预热失败，消息自带上下文
    #[error("{0}")]
    ModelLoad(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ScreeningError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScreeningError::Rejected(_) => StatusCode::BAD_REQUEST,
            ScreeningError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ScreeningError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            ScreeningError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ScreeningError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ScreeningError::ModelNotReady => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ScreeningError::Rejected(_) => "IMAGE_REJECTED",
            ScreeningError::InvalidInput(_) => "INVALID_INPUT",
            ScreeningError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            ScreeningError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ScreeningError::Timeout(_) => "TIMEOUT",
            ScreeningError::ModelNotReady => "MODEL_NOT_READY",
            ScreeningError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            ScreeningError::ImageProcessing(_) => "IMAGE_PROCESSING_ERROR",
            ScreeningError::Inference(_) => "INFERENCE_ERROR",
            ScreeningError::Config(_) => "CONFIG_ERROR",
            ScreeningError::Io(_) => "IO_ERROR",
            ScreeningError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            ScreeningError::Ort(_) => "ORT_ERROR",
            ScreeningError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 预期内的用户侧错误（4xx），不算缺陷
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for ScreeningError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });

        if self.is_client_error() {
            tracing::warn!("Request rejected: {} ({}, {})", self, self.error_code(), status);
        } else {
            tracing::error!("Request failed: {} ({}, {})", self, self.error_code(), status);
        }

        (status, axum::Json(body)).into_response()
    }
}
