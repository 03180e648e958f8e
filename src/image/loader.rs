use crate::utils::error::DetectError;
use crate::Result;
use base64::Engine;
use image::{DynamicImage, GenericImageView};
use ndarray::Array3;

/// 解码后图像的最大字节数
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

pub struct ImageLoader;

impl ImageLoader {
    /// 从base64字符串加载图像
    pub fn from_base64(base64_data: &str) -> Result<DynamicImage> {
        // 检测并移除可能的数据URL前缀 (data:image/xxx;base64,)
        let base64_clean = if base64_data.starts_with("data:") {
            base64_data.split(',').nth(1).unwrap_or(base64_data)
        } else {
            base64_data
        };

        // 解码base64
        let image_bytes = base64::engine::general_purpose::STANDARD
            .decode(base64_clean)
            .map_err(DetectError::Base64)?;

        Self::from_bytes(&image_bytes)
    }

    /// 从字节流加载图像
    pub fn from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        // 检查文件大小
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(DetectError::FileTooLarge(bytes.len(), MAX_IMAGE_BYTES));
        }

        let image = image::load_from_memory(bytes)
            .map_err(DetectError::ImageDecode)?;

        Ok(image)
    }

    /// 转换DynamicImage为ndarray::Array3<f32> (HWC格式, RGB, [0,255])
    pub fn to_array3(image: &DynamicImage) -> Array3<f32> {
        let rgb_image = image.to_rgb8();
        let (width, height) = rgb_image.dimensions();

        let mut array = Array3::<f32>::zeros((height as usize, width as usize, 3));

        for (x, y, pixel) in rgb_image.enumerate_pixels() {
            for c in 0..3 {
                array[[y as usize, x as usize, c]] = pixel[c] as f32;
            }
        }

        array
    }

    /// 验证图像尺寸
    pub fn validate_dimensions(image: &DynamicImage) -> Result<()> {
        let (width, height) = image.dimensions();

        // 检查最小尺寸
        if width < 16 || height < 16 {
            return Err(DetectError::InvalidInput(
                format!("Image too small: {}x{}, minimum 16x16", width, height)
            ));
        }

        // 检查最大尺寸
        if width > 8192 || height > 8192 {
            return Err(DetectError::InvalidInput(
                format!("Image too large: {}x{}, maximum 8192x8192", width, height)
            ));
        }

        Ok(())
    }

    /// 预处理图像：校验尺寸并转换为推理适配器使用的像素数组
    pub fn preprocess(image: DynamicImage) -> Result<Array3<f32>> {
        Self::validate_dimensions(&image)?;

        Ok(Self::to_array3(&image))
    }
}
