use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, GenericImageView, ImageFormat};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

const BYTES_IN_MB: f64 = 1024.0 * 1024.0;

/// Ошибки нормализации. Текст `Display` показывается пользователю как есть.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("Image size ({size_mb:.1}MB) exceeds {limit_mb}MB limit.")]
    TooLarge { size_mb: f64, limit_mb: f64 },
    #[error("Unsupported format: {0}. Please use JPEG or PNG.")]
    UnsupportedFormat(String),
    #[error("Failed to process image. Please try another photo.")]
    Decode,
}

/// Готовый к отправке JPEG в base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub base64: String,
    pub width: u32,
    pub height: u32,
    pub jpeg_len: usize,
}

impl NormalizedImage {
    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.base64)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    max_size_mb: f64,
    max_dimension: u32,
    jpeg_quality: u8,
}

impl ImageNormalizer {
    pub fn new(max_size_mb: f64, max_dimension: u32, jpeg_quality: u8) -> Self {
        Self {
            max_size_mb,
            max_dimension,
            jpeg_quality,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.max_image_size_mb, cfg.max_image_dimension, cfg.jpeg_quality)
    }

    /// Проверяет размер и формат, ужимает длинную сторону до `max_dimension`
    /// и перекодирует в JPEG с заданным качеством.
    pub fn normalize(&self, raw: &[u8]) -> Result<NormalizedImage, NormalizeError> {
        let size_mb = raw.len() as f64 / BYTES_IN_MB;
        if size_mb > self.max_size_mb {
            return Err(NormalizeError::TooLarge {
                size_mb,
                limit_mb: self.max_size_mb,
            });
        }

        let format = image::guess_format(raw).map_err(|err| {
            warn!(error = %err, len = raw.len(), "image: unknown header");
            NormalizeError::Decode
        })?;
        if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
            return Err(NormalizeError::UnsupportedFormat(format_name(format)));
        }

        let img = image::load_from_memory_with_format(raw, format).map_err(|err| {
            warn!(error = %err, ?format, "image: decode failed");
            NormalizeError::Decode
        })?;
        let (orig_w, orig_h) = img.dimensions();

        // resize сохраняет пропорции и вписывает картинку в квадрат max x max
        let img = if orig_w.max(orig_h) > self.max_dimension {
            img.resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3)
        } else {
            img
        };

        let rgb = img.to_rgb8();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality)
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            .map_err(|err| {
                warn!(error = %err, "image: jpeg encode failed");
                NormalizeError::Decode
            })?;

        debug!(
            orig_w,
            orig_h,
            w = rgb.width(),
            h = rgb.height(),
            jpeg_len = jpeg.len(),
            "image: normalized"
        );

        Ok(NormalizedImage {
            base64: general_purpose::STANDARD.encode(&jpeg),
            width: rgb.width(),
            height: rgb.height(),
            jpeg_len: jpeg.len(),
        })
    }
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Gif => "GIF".to_string(),
        ImageFormat::Bmp => "BMP".to_string(),
        ImageFormat::WebP => "WEBP".to_string(),
        ImageFormat::Tiff => "TIFF".to_string(),
        ImageFormat::Ico => "ICO".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, RgbaImage};
    use std::io::Cursor;

    fn encoded(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 200])
        }));
        let img = match format {
            ImageOutputFormat::Jpeg(_) | ImageOutputFormat::Bmp => {
                DynamicImage::ImageRgb8(img.to_rgb8())
            }
            _ => img,
        };
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, format).unwrap();
        cursor.into_inner()
    }

    fn decode(normalized: &NormalizedImage) -> (ImageFormat, DynamicImage) {
        let bytes = general_purpose::STANDARD.decode(&normalized.base64).unwrap();
        assert_eq!(bytes.len(), normalized.jpeg_len);
        let format = image::guess_format(&bytes).unwrap();
        (format, image::load_from_memory(&bytes).unwrap())
    }

    #[test]
    fn small_png_becomes_jpeg_of_same_size() {
        let normalizer = ImageNormalizer::new(4.0, 2048, 85);
        let out = normalizer
            .normalize(&encoded(300, 200, ImageOutputFormat::Png))
            .unwrap();
        let (format, img) = decode(&out);
        assert_eq!(format, ImageFormat::Jpeg);
        assert_eq!(img.dimensions(), (300, 200));
        assert!(out.data_url().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn long_edge_is_scaled_down_to_limit() {
        let normalizer = ImageNormalizer::new(4.0, 64, 85);
        let out = normalizer
            .normalize(&encoded(256, 128, ImageOutputFormat::Jpeg(90)))
            .unwrap();
        let (format, img) = decode(&out);
        assert_eq!(format, ImageFormat::Jpeg);
        assert_eq!(img.dimensions(), (64, 32));
    }

    #[test]
    fn portrait_images_keep_aspect() {
        let normalizer = ImageNormalizer::new(4.0, 50, 85);
        let out = normalizer
            .normalize(&encoded(100, 200, ImageOutputFormat::Png))
            .unwrap();
        assert_eq!((out.width, out.height), (25, 50));
    }

    #[test]
    fn oversized_buffer_is_rejected_before_decoding() {
        let png = encoded(64, 64, ImageOutputFormat::Png);
        let limit_mb = (png.len() - 1) as f64 / BYTES_IN_MB;
        let normalizer = ImageNormalizer::new(limit_mb, 2048, 85);
        assert!(matches!(
            normalizer.normalize(&png),
            Err(NormalizeError::TooLarge { .. })
        ));
        let garbage = vec![0u8; png.len() * 2];
        assert!(matches!(
            normalizer.normalize(&garbage),
            Err(NormalizeError::TooLarge { .. })
        ));
    }

    #[test]
    fn gif_and_bmp_are_unsupported() {
        let normalizer = ImageNormalizer::new(4.0, 2048, 85);
        assert_eq!(
            normalizer.normalize(&encoded(8, 8, ImageOutputFormat::Gif)),
            Err(NormalizeError::UnsupportedFormat("GIF".into()))
        );
        assert_eq!(
            normalizer.normalize(&encoded(8, 8, ImageOutputFormat::Bmp)),
            Err(NormalizeError::UnsupportedFormat("BMP".into()))
        );
    }

    #[test]
    fn corrupt_data_is_a_decode_error() {
        let normalizer = ImageNormalizer::new(4.0, 2048, 85);
        assert_eq!(normalizer.normalize(b"not an image"), Err(NormalizeError::Decode));

        let mut truncated = encoded(64, 64, ImageOutputFormat::Png);
        truncated.truncate(40);
        assert_eq!(normalizer.normalize(&truncated), Err(NormalizeError::Decode));
    }

    #[test]
    fn error_messages_are_user_facing() {
        let err = NormalizeError::TooLarge {
            size_mb: 5.0,
            limit_mb: 4.0,
        };
        assert_eq!(err.to_string(), "Image size (5.0MB) exceeds 4MB limit.");
    }
}
