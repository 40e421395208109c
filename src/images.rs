//! Normalizing and storing uploaded meter photos.

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_WIDTH: u32 = 1920;
pub const MAX_HEIGHT: u32 = 1080;
pub const JPEG_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("unsupported or corrupt image: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to store image: {0}")]
    Io(#[from] std::io::Error),
    #[error("image processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Decodes `bytes`, shrinks the image to fit 1920x1080 and re-encodes it as JPEG.
/// Smaller images keep their size.
pub fn normalize_image(bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
    let mut img = image::load_from_memory(bytes)?;
    if img.width() > MAX_WIDTH || img.height() > MAX_HEIGHT {
        img = img.resize(MAX_WIDTH, MAX_HEIGHT, FilterType::Lanczos3);
    }

    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(out)
}

pub fn image_filename(meter_id: i64, at: DateTime<Utc>) -> String {
    format!("meter_{}_{}.jpg", meter_id, at.timestamp_millis())
}

/// Rejects names that could escape the upload directory.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains("..") && !name.contains('/') && !name.contains('\\')
}

/// Normalizes an uploaded photo and writes it to `upload_dir`. Returns the file name.
pub async fn store_meter_image(
    upload_dir: &Path,
    meter_id: i64,
    bytes: Vec<u8>,
) -> Result<String, ImageError> {
    let jpeg = tokio::task::spawn_blocking(move || normalize_image(&bytes)).await??;

    tokio::fs::create_dir_all(upload_dir).await?;
    let filename = image_filename(meter_id, Utc::now());
    tokio::fs::write(upload_dir.join(&filename), &jpeg).await?;

    tracing::info!(meter_id, file = %filename, size = jpeg.len(), "Stored meter image");
    Ok(filename)
}

/// Resolves a stored image by name, or `None` if the name is unsafe or missing.
pub async fn find_image(upload_dir: &Path, filename: &str) -> Option<PathBuf> {
    if !is_safe_filename(filename) {
        return None;
    }
    let path = upload_dir.join(filename);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Some(path),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_large_image_is_shrunk_keeping_aspect() {
        let jpeg = normalize_image(&png(4000, 2000)).unwrap();
        let img = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(img.dimensions(), (1920, 960));
    }

    #[test]
    fn test_small_image_is_not_enlarged() {
        let jpeg = normalize_image(&png(100, 50)).unwrap();
        let img = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(img.dimensions(), (100, 50));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = normalize_image(b"definitely not an image");
        assert!(matches!(result, Err(ImageError::Image(_))));
    }

    #[test]
    fn test_filename_and_safety() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(image_filename(4, at), "meter_4_1700000000123.jpg");

        assert!(is_safe_filename("meter_4_1700000000123.jpg"));
        assert!(!is_safe_filename("../secret"));
        assert!(!is_safe_filename("a/b.jpg"));
        assert!(!is_safe_filename("a\\b.jpg"));
        assert!(!is_safe_filename(""));
    }

    #[tokio::test]
    async fn test_store_and_find_image() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");

        let name = store_meter_image(&uploads, 4, png(10, 10)).await.unwrap();
        assert!(name.starts_with("meter_4_"));
        assert!(find_image(&uploads, &name).await.is_some());
        assert!(find_image(&uploads, "meter_4_missing.jpg").await.is_none());
        assert!(find_image(&uploads, "../uploads").await.is_none());
    }
}
