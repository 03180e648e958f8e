use crate::web::handlers::{DetectRequest, FrameRequest};
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

/// 验证的JSON提取器
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: for<'de> Deserialize<'de> + Validate,
    S: Send + Sync,
{
    type Rejection = ValidationError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|err| ValidationError::JsonParse(err.to_string()))?;

        value.validate().map_err(ValidationError::Validation)?;

        Ok(ValidatedJson(value))
    }
}

/// 验证trait
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// 验证错误类型
#[derive(Debug)]
pub enum ValidationError {
    JsonParse(String),
    Validation(String),
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        let message = match self {
            ValidationError::JsonParse(msg) => format!("JSON parse error: {}", msg),
            ValidationError::Validation(msg) => msg,
        };

        tracing::error!("Request validation failed: {}", message);

        let body = serde_json::json!({ "error": message });

        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// 图像检测请求验证
impl Validate for DetectRequest {
    fn validate(&self) -> Result<(), String> {
        match &self.image {
            Some(image) if !image.trim().is_empty() => Ok(()),
            _ => Err("No image data provided".to_string()),
        }
    }
}

/// 视频帧请求验证
impl Validate for FrameRequest {
    fn validate(&self) -> Result<(), String> {
        match &self.frame {
            Some(frame) if !frame.trim().is_empty() => Ok(()),
            _ => Err("No frame data provided".to_string()),
        }
    }
}
