use crate::detection::{Detection, DetectionFormatter};
use crate::image::ImageLoader;
use crate::models::DetectionModel;
use crate::utils::error::DetectError;
use crate::Result;

/// 单张图像检测输出
#[derive(Debug)]
pub struct ImageDetectionOutput {
    pub detections: Vec<Detection>,
    /// 解码后图像的 [height, width]
    pub image_shape: [usize; 2],
}

/// 检测处理流水线：解码 → 推理 → 格式化
pub struct DetectionPipeline;

impl DetectionPipeline {
    /// 处理base64编码的单张图像；阈值在推理后过滤
    pub fn process_image(
        model: &dyn DetectionModel,
        base64_data: &str,
        min_confidence: f32,
    ) -> Result<ImageDetectionOutput> {
        // 加载图像
        let image = ImageLoader::from_base64(base64_data)?;
        let image_array = ImageLoader::preprocess(image)?;
        let image_shape = [image_array.shape()[0], image_array.shape()[1]];

        // 推理：图像端点不传入下限，事后按阈值过滤
        let raw_detections = model.infer(&image_array, None)?;
        let detections =
            DetectionFormatter::format_detections(raw_detections, model, min_confidence);

        tracing::info!(
            "Image detection completed: {} candidates above threshold {}",
            detections.len(),
            min_confidence
        );

        Ok(ImageDetectionOutput {
            detections,
            image_shape,
        })
    }

    /// 处理base64编码的视频帧；阈值作为下限传入推理调用本身
    pub fn process_frame(
        model: &dyn DetectionModel,
        base64_data: &str,
        min_confidence: f32,
    ) -> Result<Vec<Detection>> {
        // 加载帧：字节无法解码为图像时按固定的400错误处理
        let image = ImageLoader::from_base64(base64_data).map_err(|err| match err {
            DetectError::ImageDecode(_) => {
                DetectError::InvalidInput("Invalid frame data".to_string())
            }
            other => other,
        })?;
        let image_array = ImageLoader::preprocess(image)?;

        // 推理：实时帧用较低阈值预过滤
        let raw_detections = model.infer(&image_array, Some(min_confidence))?;
        let detections =
            DetectionFormatter::format_detections(raw_detections, model, min_confidence);

        tracing::info!(
            "Frame detection completed: {} detections above threshold {}",
            detections.len(),
            min_confidence
        );

        Ok(detections)
    }
}
