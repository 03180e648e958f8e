use crate::utils::error::DetectError;
use crate::Result;
use std::fs;
use std::path::Path;

/// 类别标签表：每行一个类别名称，行号即类别索引
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    /// 从标签文件加载类别名称
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| DetectError::ModelLoad(format!("Failed to read labels file: {}", e)))?;

        let mut names = Vec::new();
        for line in content.lines() {
            let name = line.trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }

        tracing::info!("Loaded {} class labels from {}", names.len(), path.display());
        Ok(Self { names })
    }

    /// 空标签表：所有查询都走class_<id>回退
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
