use crate::models::{DetectionModel, LabelTable, RawDetection};
use crate::utils::error::DetectError;
use crate::{Config, Result};
use ndarray::{s, Array3, Array4, ArrayD, Axis, Ix2};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;

pub struct YoloDetector {
    session: Mutex<Session>,
    input_name: String,  // 动态发现的输入名称
    output_name: String, // 动态发现的输出名称
    input_size: (usize, usize), // (height, width)
    labels: LabelTable,
    candidate_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl YoloDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = &config.model_path;

        if !model_path.exists() {
            return Err(DetectError::ModelLoad(
                format!("Detection model not found: {}", model_path.display())
            ));
        }

        tracing::info!("Loading detection model from: {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.onnx_config.intra_threads)?
            .commit_from_file(model_path)?;

        if session.inputs().is_empty() {
            return Err(DetectError::ModelLoad(
                "Detection model has no inputs".to_string()
            ));
        }
        if session.outputs().is_empty() {
            return Err(DetectError::ModelLoad(
                "Detection model has no outputs".to_string()
            ));
        }

        // 动态发现输入/输出名称
        let input_name = session.inputs()[0].name().to_string();
        let output_name = session.outputs()[0].name().to_string();
        tracing::info!(
            "Detection model input: '{}', output: '{}'",
            input_name, output_name
        );

        // 记录所有可用输出用于调试
        for (i, output) in session.outputs().iter().enumerate() {
            tracing::debug!("Detection output[{}]: '{}'", i, output.name());
        }

        // 标签文件可选：缺失时类别名退回class_<id>
        let labels_path = config.labels_file();
        let labels = if labels_path.exists() {
            LabelTable::load(&labels_path)?
        } else {
            tracing::warn!(
                "Labels file not found: {}, class names fall back to ids",
                labels_path.display()
            );
            LabelTable::empty()
        };

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_size: (640, 640), // YOLO默认输入尺寸
            labels,
            candidate_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        })
    }

    /// 图像预处理：保持宽高比缩放到目标画布左上角，空余补零，归一化为NCHW
    fn preprocess(&self, image: &Array3<f32>) -> Result<(Array4<f32>, f32, f32)> {
        let (orig_h, orig_w) = (image.shape()[0], image.shape()[1]);
        let (target_h, target_w) = self.input_size;

        if orig_h == 0 || orig_w == 0 {
            return Err(DetectError::InvalidInput("Empty image".to_string()));
        }

        // 计算缩放比例，保持宽高比
        let scale = (target_h as f32 / orig_h as f32)
            .min(target_w as f32 / orig_w as f32);

        let new_h = ((orig_h as f32 * scale) as usize).clamp(1, target_h);
        let new_w = ((orig_w as f32 * scale) as usize).clamp(1, target_w);

        let mut input = Array4::<f32>::zeros((1, 3, target_h, target_w));

        for y in 0..new_h {
            for x in 0..new_w {
                let src_y = ((y as f32 / scale) as usize).min(orig_h - 1);
                let src_x = ((x as f32 / scale) as usize).min(orig_w - 1);
                for c in 0..3 {
                    input[[0, c, y, x]] = image[[src_y, src_x, c]] / 255.0;
                }
            }
        }

        let scale_x = orig_w as f32 / new_w as f32;
        let scale_y = orig_h as f32 / new_h as f32;

        Ok((input, scale_x, scale_y))
    }
}

impl DetectionModel for YoloDetector {
    fn infer(&self, image: &Array3<f32>, min_confidence: Option<f32>) -> Result<Vec<RawDetection>> {
        let (orig_h, orig_w) = (image.shape()[0], image.shape()[1]);

        // 预处理
        let (input, scale_x, scale_y) = self.preprocess(image)?;

        // 推理 - 立即提取数据避免生命周期冲突
        let input_tensor = Tensor::from_array(input)?;
        let prediction = {
            let mut session = self.session.lock();
            let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

            match outputs.get(&self.output_name) {
                Some(output) => output.try_extract_array::<f32>()?.into_owned(),
                None => {
                    // 提供详细的错误诊断信息
                    let available: Vec<String> =
                        outputs.keys().map(|s| s.to_string()).collect();
                    return Err(DetectError::Inference(format!(
                        "Output '{}' not found. Available outputs: {:?}",
                        self.output_name, available
                    )));
                }
            }
        };

        // 后处理：解码候选框，再做类内NMS
        let floor = min_confidence.unwrap_or(self.candidate_threshold);
        let candidates =
            decode_predictions(&prediction, scale_x, scale_y, orig_w, orig_h, floor)?;
        let detections =
            non_max_suppression(candidates, self.iou_threshold, self.max_detections);

        tracing::debug!(
            "Inference: {}x{} image, {} detections (floor {})",
            orig_w, orig_h,
            detections.len(),
            floor
        );

        Ok(detections)
    }

    fn class_name(&self, class_id: usize) -> Option<&str> {
        self.labels.name(class_id)
    }
}

/// 解码YOLO输出张量：[1, 4+nc, N] 或 [4+nc, N]，行为cx,cy,w,h+类别分数
///
/// 统一收敛为二维候选视图后再迭代；其他形状视为模型不兼容。
fn decode_predictions(
    prediction: &ArrayD<f32>,
    scale_x: f32,
    scale_y: f32,
    orig_w: usize,
    orig_h: usize,
    min_confidence: f32,
) -> Result<Vec<RawDetection>> {
    let pred_shape = prediction.shape();

    let view = match pred_shape.len() {
        3 => {
            if pred_shape[0] != 1 {
                return Err(DetectError::Inference(
                    "Expected batch size 1 for detection".to_string()
                ));
            }
            prediction.index_axis(Axis(0), 0)
        }
        2 => prediction.view(),
        _ => {
            return Err(DetectError::ModelCompatibility(format!(
                "Unsupported detection output shape: {:?}. Expected 2D (attrs,candidates) or 3D (batch,attrs,candidates)",
                pred_shape
            )));
        }
    };
    let view = view
        .into_dimensionality::<Ix2>()
        .map_err(|e| DetectError::ModelCompatibility(e.to_string()))?;

    let num_attrs = view.shape()[0];
    let num_candidates = view.shape()[1];
    if num_attrs < 5 {
        return Err(DetectError::ModelCompatibility(format!(
            "Detection output has {} attributes per candidate, expected at least 5",
            num_attrs
        )));
    }

    let mut candidates = Vec::new();

    for i in 0..num_candidates {
        let scores = view.slice(s![4.., i]);
        let best = scores.indexed_iter().max_by(|a, b| a.1.total_cmp(b.1));
        let Some((class_id, &max_score)) = best else {
            continue;
        };

        if max_score > min_confidence {
            let cx = view[[0, i]];
            let cy = view[[1, i]];
            let w = view[[2, i]];
            let h = view[[3, i]];

            // 缩放回原图坐标并截断到图像边界
            let xmin = ((cx - w / 2.0) * scale_x).clamp(0.0, orig_w as f32);
            let ymin = ((cy - h / 2.0) * scale_y).clamp(0.0, orig_h as f32);
            let xmax = ((cx + w / 2.0) * scale_x).clamp(0.0, orig_w as f32);
            let ymax = ((cy + h / 2.0) * scale_y).clamp(0.0, orig_h as f32);

            candidates.push(RawDetection {
                bbox: [xmin, ymin, xmax, ymax],
                class_id,
                confidence: max_score,
            });
        }
    }

    Ok(candidates)
}

/// 贪心类内NMS：按置信度降序保留互不重叠的框
fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();

    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }

        let suppressed = kept.iter().any(|existing| {
            existing.class_id == candidate.class_id
                && box_iou(&existing.bbox, &candidate.bbox) > iou_threshold
        });

        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

/// 计算两个边界框的IoU（交并比）
fn box_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_xmin = a[0].max(b[0]);
    let inter_ymin = a[1].max(b[1]);
    let inter_xmax = a[2].min(b[2]);
    let inter_ymax = a[3].min(b[3]);

    if inter_xmin >= inter_xmax || inter_ymin >= inter_ymax {
        return 0.0;
    }

    let inter_area = (inter_xmax - inter_xmin) * (inter_ymax - inter_ymin);
    let a_area = (a[2] - a[0]) * (a[3] - a[1]);
    let b_area = (b[2] - b[0]) * (b[3] - b[1]);
    let union_area = a_area + b_area - inter_area;

    if union_area <= 0.0 {
        return 0.0;
    }

    inter_area / union_area
}

#[cfg(test)]
mod tests {
    use super::{box_iou, decode_predictions, non_max_suppression};
    use crate::models::RawDetection;
    use ndarray::Array3;

    fn raw(bbox: [f32; 4], class_id: usize, confidence: f32) -> RawDetection {
        RawDetection { bbox, class_id, confidence }
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(box_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [5.0, 5.0, 15.0, 25.0];
        assert!((box_iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_overlapping_same_class() {
        let detections = non_max_suppression(
            vec![
                raw([0.0, 0.0, 10.0, 10.0], 0, 0.8),
                raw([1.0, 1.0, 11.0, 11.0], 0, 0.9),
            ],
            0.45,
            300,
        );
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 0.9);
    }

    #[test]
    fn nms_keeps_overlapping_different_classes() {
        let detections = non_max_suppression(
            vec![
                raw([0.0, 0.0, 10.0, 10.0], 0, 0.8),
                raw([1.0, 1.0, 11.0, 11.0], 1, 0.9),
            ],
            0.45,
            300,
        );
        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn nms_caps_detection_count() {
        let detections = non_max_suppression(
            vec![
                raw([0.0, 0.0, 10.0, 10.0], 0, 0.9),
                raw([50.0, 50.0, 60.0, 60.0], 0, 0.8),
                raw([100.0, 100.0, 110.0, 110.0], 0, 0.7),
            ],
            0.45,
            2,
        );
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[1].confidence, 0.8);
    }

    #[test]
    fn decode_extracts_best_class_above_floor() {
        // 2个类别，3个候选：只有候选1超过下限，类别1分数最高
        let mut output = Array3::<f32>::zeros((1, 6, 3));
        output[[0, 0, 1]] = 100.0; // cx
        output[[0, 1, 1]] = 80.0; // cy
        output[[0, 2, 1]] = 40.0; // w
        output[[0, 3, 1]] = 20.0; // h
        output[[0, 4, 1]] = 0.3; // 类别0分数
        output[[0, 5, 1]] = 0.7; // 类别1分数
        output[[0, 4, 0]] = 0.1;
        output[[0, 5, 2]] = 0.2;

        let candidates =
            decode_predictions(&output.into_dyn(), 2.0, 2.0, 1280, 960, 0.4).unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].class_id, 1);
        assert_eq!(candidates[0].confidence, 0.7);
        assert_eq!(candidates[0].bbox, [160.0, 140.0, 240.0, 180.0]);
    }

    #[test]
    fn decode_rejects_unexpected_rank() {
        let output = ndarray::Array1::<f32>::zeros(6).into_dyn();
        let err = decode_predictions(&output, 1.0, 1.0, 640, 640, 0.25).unwrap_err();
        assert!(matches!(err, crate::DetectError::ModelCompatibility(_)));
    }
}
