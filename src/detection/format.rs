use crate::detection::Detection;
use crate::models::{DetectionModel, RawDetection};

/// 检测结果格式化器
pub struct DetectionFormatter;

impl DetectionFormatter {
    /// 构建响应用的检测记录：严格大于阈值过滤、整数截断边界框、
    /// 类别名查表（缺失时退回class_<id>）、置信度保留3位小数
    pub fn format_detections(
        raw_detections: Vec<RawDetection>,
        model: &dyn DetectionModel,
        min_confidence: f32,
    ) -> Vec<Detection> {
        raw_detections
            .into_iter()
            .filter(|detection| detection.confidence > min_confidence)
            .map(|detection| Detection {
                bbox: [
                    detection.bbox[0] as i32,
                    detection.bbox[1] as i32,
                    detection.bbox[2] as i32,
                    detection.bbox[3] as i32,
                ],
                class_name: model
                    .class_name(detection.class_id)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("class_{}", detection.class_id)),
                confidence: round_confidence(detection.confidence),
                class_id: detection.class_id,
            })
            .collect()
    }
}

/// 置信度保留3位小数
pub fn round_confidence(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}
