use crate::utils::error::ScreeningError;
use crate::Result;
use image::{DynamicImage, GenericImageView, ImageFormat};

/// 上传文件大小上限
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub struct ImageLoader;

impl ImageLoader {
    /// 从上传的字节解码图像
    pub fn from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(ScreeningError::InvalidInput("Empty file".to_string()));
        }

        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ScreeningError::FileTooLarge(bytes.len(), MAX_UPLOAD_BYTES));
        }

        if let Some(format) = Self::detect_format(bytes) {
            if !Self::is_supported_format(format) {
                return Err(ScreeningError::UnsupportedFormat(format!("{:?}", format)));
            }
        }

        let image = image::load_from_memory(bytes)?;
        Self::validate_dimensions(&image)?;

        Ok(Self::normalize_channels(image))
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Tiff
                | ImageFormat::WebP
                | ImageFormat::Gif
        )
    }

    /// 验证图像尺寸
    pub fn validate_dimensions(image: &DynamicImage) -> Result<()> {
        let (width, height) = image.dimensions();

        if width == 0 || height == 0 {
            return Err(ScreeningError::InvalidInput(format!(
                "Image has no pixels: {}x{}",
                width, height
            )));
        }

        if width > 8192 || height > 8192 {
            return Err(ScreeningError::InvalidInput(format!(
                "Image too large: {}x{}, maximum 8192x8192",
                width, height
            )));
        }

        Ok(())
    }

    /// 统一为8位单通道或8位RGB，丢弃alpha与高位深
    pub fn normalize_channels(image: DynamicImage) -> DynamicImage {
        match image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
            other if other.color().channel_count() <= 2 => DynamicImage::ImageLuma8(other.to_luma8()),
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbaImage};
    use std::io::Cursor;

    fn encode_png(image: &DynamicImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn keeps_single_channel_uploads_gray() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([42])));
        let decoded = ImageLoader::from_bytes(&encode_png(&gray)).unwrap();
        assert!(matches!(decoded, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn drops_alpha_channel() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, image::Rgba([1, 2, 3, 255])));
        let decoded = ImageLoader::from_bytes(&encode_png(&rgba)).unwrap();
        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn rejects_garbage_and_empty_payloads() {
        assert!(matches!(
            ImageLoader::from_bytes(b""),
            Err(ScreeningError::InvalidInput(_))
        ));
        assert!(matches!(
            ImageLoader::from_bytes(b"definitely not an image"),
            Err(ScreeningError::ImageDecode(_))
        ));
    }
}
