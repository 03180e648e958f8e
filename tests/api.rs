use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine;
use http_body_util::BodyExt;
use ndarray::Array3;
use onnx_detect::models::{AppState, DetectionModel, ModelState, RawDetection};
use onnx_detect::web::create_app;
use onnx_detect::Config;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct StubModel {
    detections: Vec<RawDetection>,
    labels: Vec<&'static str>,
    last_floor: Mutex<Option<Option<f32>>>,
}

impl StubModel {
    fn new(detections: Vec<RawDetection>, labels: Vec<&'static str>) -> Self {
        Self {
            detections,
            labels,
            last_floor: Mutex::new(None),
        }
    }
}

impl DetectionModel for StubModel {
    fn infer(
        &self,
        _image: &Array3<f32>,
        min_confidence: Option<f32>,
    ) -> onnx_detect::Result<Vec<RawDetection>> {
        *self.last_floor.lock() = Some(min_confidence);
        let floor = min_confidence.unwrap_or(0.0);
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence > floor)
            .cloned()
            .collect())
    }

    fn class_name(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).copied()
    }
}

fn test_config() -> Config {
    Config::new(
        "127.0.0.1:0".to_string(),
        "models/model.onnx".to_string(),
        None,
        None,
        false,
    )
    .unwrap()
}

fn app_with_stub(stub: Arc<StubModel>) -> Router {
    let model: Arc<dyn DetectionModel> = stub;
    create_app(AppState::with_model(test_config(), ModelState::Loaded(model)))
}

fn app_without_model() -> Router {
    create_app(AppState::with_model(
        test_config(),
        ModelState::Failed("Detection model not found: models/model.onnx".to_string()),
    ))
}

fn raw(bbox: [f32; 4], class_id: usize, confidence: f32) -> RawDetection {
    RawDetection {
        bbox,
        class_id,
        confidence,
    }
}

fn png_data_uri(width: u32, height: u32) -> String {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([80, 130, 60]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&bytes)
    )
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_unloaded_model() {
    let (status, body) = get(app_without_model(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], false);
}

#[tokio::test]
async fn health_reports_loaded_model() {
    let stub = Arc::new(StubModel::new(Vec::new(), Vec::new()));
    let (status, body) = get(app_with_stub(stub), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], true);
}

#[tokio::test]
async fn detect_with_empty_body_returns_bad_request() {
    let stub = Arc::new(StubModel::new(Vec::new(), Vec::new()));
    let (status, body) = post_json(app_with_stub(stub), "/detect", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image data provided");
}

#[tokio::test]
async fn detect_without_model_returns_server_error() {
    let (status, body) = post_json(
        app_without_model(),
        "/detect",
        json!({ "image": png_data_uri(32, 32) }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Model not loaded");
}

#[tokio::test]
async fn frame_without_model_returns_server_error() {
    let (status, body) = post_json(
        app_without_model(),
        "/detect-video-frame",
        json!({ "frame": png_data_uri(32, 32) }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Model not loaded");
}

#[tokio::test]
async fn frame_with_undecodable_bytes_returns_bad_request() {
    let stub = Arc::new(StubModel::new(Vec::new(), Vec::new()));
    let not_an_image = base64::engine::general_purpose::STANDARD.encode(b"not an image");
    let (status, body) = post_json(
        app_with_stub(stub),
        "/detect-video-frame",
        json!({ "frame": not_an_image }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid frame data");
}

#[tokio::test]
async fn detect_with_malformed_base64_returns_bad_request() {
    let stub = Arc::new(StubModel::new(Vec::new(), Vec::new()));
    let (status, _body) = post_json(
        app_with_stub(stub),
        "/detect",
        json!({ "image": "data:image/png;base64,!!!" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn detect_round_trips_stub_detection() {
    let stub = Arc::new(StubModel::new(
        vec![raw([10.4, 20.6, 110.2, 220.9], 1, 0.875)],
        vec!["plastic", "glass"],
    ));
    let (status, body) = post_json(
        app_with_stub(stub),
        "/detect",
        json!({ "image": png_data_uri(64, 48) }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["total_objects"], 1);
    assert_eq!(body["image_shape"], json!([48, 64]));

    let detection = &body["detections"][0];
    assert_eq!(detection["bbox"], json!([10, 20, 110, 220]));
    assert_eq!(detection["class"], "glass");
    assert_eq!(detection["class_id"], 1);
    assert_eq!(detection["confidence"], 0.875);
}

#[tokio::test]
async fn detect_filters_detections_at_or_below_threshold() {
    let stub = Arc::new(StubModel::new(
        vec![
            raw([0.0, 0.0, 10.0, 10.0], 0, 0.76),
            raw([0.0, 0.0, 10.0, 10.0], 0, 0.5),
            raw([20.0, 20.0, 40.0, 40.0], 0, 0.875),
        ],
        vec!["plastic"],
    ));
    let (status, body) = post_json(
        app_with_stub(stub),
        "/detect",
        json!({ "image": png_data_uri(64, 48) }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_objects"], 1);
    assert_eq!(body["detections"][0]["confidence"], 0.875);
}

#[tokio::test]
async fn detect_with_no_qualifying_objects_returns_empty_list() {
    let stub = Arc::new(StubModel::new(Vec::new(), vec!["plastic"]));
    let (status, body) = post_json(
        app_with_stub(stub),
        "/detect",
        json!({ "image": png_data_uri(40, 30) }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["total_objects"], 0);
    assert_eq!(body["detections"], json!([]));
    assert_eq!(body["image_shape"], json!([30, 40]));
}

#[tokio::test]
async fn frame_forwards_threshold_into_inference_call() {
    let stub = Arc::new(StubModel::new(
        vec![
            raw([0.0, 0.0, 10.0, 10.0], 0, 0.4),
            raw([20.0, 20.0, 40.0, 40.0], 0, 0.5),
        ],
        vec!["plastic"],
    ));
    let (status, body) = post_json(
        app_with_stub(stub.clone()),
        "/detect-video-frame",
        json!({ "frame": png_data_uri(32, 32) }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(*stub.last_floor.lock(), Some(Some(0.4)));
    // 恰好等于阈值的检测不出现在响应中
    assert_eq!(body["total_objects"], 1);
    assert_eq!(body["detections"][0]["confidence"], 0.5);
}

#[tokio::test]
async fn image_endpoint_passes_no_floor_into_inference_call() {
    let stub = Arc::new(StubModel::new(Vec::new(), Vec::new()));
    let (status, _body) = post_json(
        app_with_stub(stub.clone()),
        "/detect",
        json!({ "image": png_data_uri(32, 32) }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(*stub.last_floor.lock(), Some(None));
}

#[tokio::test]
async fn frame_echoes_request_timestamp() {
    let stub = Arc::new(StubModel::new(Vec::new(), Vec::new()));
    let (status, body) = post_json(
        app_with_stub(stub),
        "/detect-video-frame",
        json!({ "frame": png_data_uri(32, 32), "timestamp": 123.45 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timestamp"], 123.45);
    assert_eq!(body["total_objects"], 0);
}

#[tokio::test]
async fn frame_timestamp_defaults_to_zero() {
    let stub = Arc::new(StubModel::new(Vec::new(), Vec::new()));
    let (status, body) = post_json(
        app_with_stub(stub),
        "/detect-video-frame",
        json!({ "frame": png_data_uri(32, 32) }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timestamp"], 0.0);
}

#[tokio::test]
async fn info_reports_model_status() {
    let (status, body) = get(app_without_model(), "/api/info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"]["loaded"], false);

    // f32阈值经f64序列化后只能近似比较
    let image_threshold = body["thresholds"]["image"].as_f64().unwrap();
    let frame_threshold = body["thresholds"]["frame"].as_f64().unwrap();
    assert!((image_threshold - 0.76).abs() < 1e-6);
    assert!((frame_threshold - 0.4).abs() < 1e-6);
}
