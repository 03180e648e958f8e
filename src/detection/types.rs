use serde::{Deserialize, Serialize};

/// 单个检测结果（响应中的detections条目）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// 边界框 [xmin, ymin, xmax, ymax]（整数像素坐标）
    pub bbox: [i32; 4],

    /// 类别名称
    #[serde(rename = "class")]
    pub class_name: String,

    /// 置信度（保留3位小数）
    pub confidence: f32,

    /// 类别索引
    pub class_id: usize,
}
