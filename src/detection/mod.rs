pub mod format;
pub mod pipeline;
pub mod types;

pub use format::DetectionFormatter;
pub use pipeline::{DetectionPipeline, ImageDetectionOutput};
pub use types::Detection;
