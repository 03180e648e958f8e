use crate::models::{DetectionModel, YoloDetector};
use crate::utils::error::DetectError;
use crate::{Config, Result};
use std::sync::Arc;

/// 模型槽位：启动时一次性装载，此后只读
pub enum ModelState {
    Loaded(Arc<dyn DetectionModel>),
    Failed(String),
}

impl ModelState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelState::Loaded(_))
    }
}

/// 应用状态：启动时构造一次，通过axum状态传入各处理器
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    model: Arc<ModelState>,
}

impl AppState {
    /// 尝试加载模型并构造应用状态；加载失败只记录，不中止启动
    pub fn initialize(config: Config) -> Self {
        let model = match YoloDetector::new(&config) {
            Ok(detector) => {
                tracing::info!("Detection model loaded successfully");
                ModelState::Loaded(Arc::new(detector))
            }
            Err(e) => {
                tracing::error!("Failed to load detection model: {}", e);
                ModelState::Failed(e.to_string())
            }
        };

        Self::with_model(config, model)
    }

    /// 用给定的模型状态构造应用状态（测试注入入口）
    pub fn with_model(config: Config, model: ModelState) -> Self {
        Self {
            config,
            model: Arc::new(model),
        }
    }

    /// 获取模型句柄；未装载时快速失败
    pub fn model(&self) -> Result<Arc<dyn DetectionModel>> {
        match self.model.as_ref() {
            ModelState::Loaded(model) => Ok(Arc::clone(model)),
            ModelState::Failed(_) => Err(DetectError::ModelUnavailable),
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_loaded()
    }

    /// 装载失败原因（用于服务信息端点）
    pub fn model_error(&self) -> Option<&str> {
        match self.model.as_ref() {
            ModelState::Loaded(_) => None,
            ModelState::Failed(reason) => Some(reason),
        }
    }
}
