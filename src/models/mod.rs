pub mod detector;
pub mod labels;
pub mod state;

pub use detector::YoloDetector;
pub use labels::LabelTable;
pub use state::{AppState, ModelState};

use crate::Result;
use ndarray::Array3;

/// 推理适配器输出的单个原始检测
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// 边界框 [xmin, ymin, xmax, ymax]（原图像素坐标）
    pub bbox: [f32; 4],
    /// 类别索引
    pub class_id: usize,
    /// 置信度 (0.0 - 1.0)
    pub confidence: f32,
}

/// 检测模型接口
pub trait DetectionModel: Send + Sync {
    /// 对HWC像素数组执行推理；min_confidence在推理调用内部过滤候选
    fn infer(&self, image: &Array3<f32>, min_confidence: Option<f32>) -> Result<Vec<RawDetection>>;

    /// 类别索引到名称的映射（由模型持有）
    fn class_name(&self, class_id: usize) -> Option<&str>;
}
