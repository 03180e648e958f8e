pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::models::AppState;
use crate::utils::error::DetectError;
use crate::{Config, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

pub async fn serve(config: Config) -> Result<()> {
    // 构造应用状态；模型装载失败不阻止启动，检测请求将快速失败
    let state = AppState::initialize(config.clone());

    // 构建应用路由
    let app = create_app(state);

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr
        .parse()
        .map_err(|e| DetectError::Config(
            format!("Invalid bind address {}: {}", config.bind_addr, e)
        ))?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /detect             - Single image detection");
    tracing::info!("  POST /detect-video-frame - Real-time frame detection");
    tracing::info!("  GET  /health             - Health check");
    tracing::info!("  GET  /api/info           - Service information");

    // 启动服务器
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DetectError::Internal(
            format!("Failed to bind to address {}: {}", addr, e)
        ))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| DetectError::Internal(
            format!("Server failed to start: {}", e)
        ))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        // 检测API路由
        .route("/detect", post(handlers::detect_image_handler))
        .route("/detect-video-frame", post(handlers::detect_frame_handler))

        // 系统路由
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))

        // 添加中间件 - 使用分层模式避免复杂类型嵌套
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(DefaultBodyLimit::max(state.config.server_config.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(state.config.server_config.request_timeout)))
        .layer(CorsLayer::permissive())

        // 传递应用状态到处理器
        .with_state(state)
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.model_loaded()
    }))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "ONNX Detection Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "model": {
            "loaded": state.model_loaded(),
            "path": state.config.model_path.display().to_string(),
            "error": state.model_error()
        },
        "thresholds": {
            "image": handlers::IMAGE_CONFIDENCE_THRESHOLD,
            "frame": handlers::FRAME_CONFIDENCE_THRESHOLD
        },
        "onnx": {
            "intra_threads": state.config.onnx_config.intra_threads,
            "optimization_level": state.config.onnx_config.optimization_level
        }
    }))
}
