use crate::detection::{Detection, DetectionPipeline};
use crate::models::AppState;
use crate::utils::error::DetectError;
use crate::web::extractors::ValidatedJson;
use crate::Result;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// 静态图像端点的置信度阈值
pub const IMAGE_CONFIDENCE_THRESHOLD: f32 = 0.76;

/// 实时帧端点的置信度阈值（较低，换取召回）
pub const FRAME_CONFIDENCE_THRESHOLD: f32 = 0.4;

/// 单张图像检测请求（base64模式）
#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    /// Base64编码的图像数据（可带data URI前缀）
    pub image: Option<String>,
}

/// 视频帧检测请求
#[derive(Debug, Deserialize)]
pub struct FrameRequest {
    /// Base64编码的帧数据
    pub frame: Option<String>,

    /// 客户端时间戳，原样回传
    #[serde(default)]
    pub timestamp: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub detections: Vec<Detection>,
    pub total_objects: usize,
    /// 解码后图像的 [height, width]
    pub image_shape: [usize; 2],
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub detections: Vec<Detection>,
    pub total_objects: usize,
    pub timestamp: f64,
}

/// 单张图像检测处理器
pub async fn detect_image_handler(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<DetectRequest>,
) -> Result<Json<DetectResponse>> {
    let start_time = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();

    tracing::info!("Processing detection request: request_id={}", request_id);

    let model = state.model()?;
    let image_data = request.image.ok_or_else(|| {
        DetectError::InvalidInput("No image data provided".to_string())
    })?;

    let output = DetectionPipeline::process_image(
        model.as_ref(),
        &image_data,
        IMAGE_CONFIDENCE_THRESHOLD,
    )?;

    tracing::info!(
        "Detection completed: request_id={}, objects={}, time={:.3}s",
        request_id,
        output.detections.len(),
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(DetectResponse {
        total_objects: output.detections.len(),
        detections: output.detections,
        image_shape: output.image_shape,
        status: "success",
    }))
}

/// 视频帧检测处理器
pub async fn detect_frame_handler(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<FrameRequest>,
) -> Result<Json<FrameResponse>> {
    let start_time = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();

    tracing::info!("Processing frame detection request: request_id={}", request_id);

    let model = state.model()?;
    let frame_data = request.frame.ok_or_else(|| {
        DetectError::InvalidInput("No frame data provided".to_string())
    })?;

    let detections = DetectionPipeline::process_frame(
        model.as_ref(),
        &frame_data,
        FRAME_CONFIDENCE_THRESHOLD,
    )?;

    tracing::info!(
        "Frame detection completed: request_id={}, objects={}, time={:.3}s",
        request_id,
        detections.len(),
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(FrameResponse {
        total_objects: detections.len(),
        detections,
        timestamp: request.timestamp.unwrap_or(0.0),
    }))
}
