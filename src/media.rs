//! Recipe image storage on the local filesystem.

use std::fs;
use std::io;
use std::path::PathBuf;

use image::ImageFormat;
use uuid::Uuid;

use crate::error::AppError;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED: [(&str, ImageFormat); 3] = [
    ("image/jpeg", ImageFormat::Jpeg),
    ("image/png", ImageFormat::Png),
    ("image/gif", ImageFormat::Gif),
];

/// An image as received from the client. `bytes` may be truncated once
/// `size` passes [`MAX_IMAGE_BYTES`]; `size` is always the full length.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub size: usize,
}

impl ImageUpload {
    /// Checks the declared type, the size limit and that the bytes really
    /// are an image of the declared type.
    pub fn validate(&self) -> Result<ImageFormat, AppError> {
        let declared = self.content_type.as_deref().unwrap_or_default();
        let format = ALLOWED
            .iter()
            .find(|(mime, _)| mime.eq_ignore_ascii_case(declared))
            .map(|(_, format)| *format)
            .ok_or_else(|| {
                AppError::validation(format!(
                    "image: Unsupported content type \"{declared}\"; expected image/jpeg, image/png or image/gif."
                ))
            })?;

        if self.size > MAX_IMAGE_BYTES {
            return Err(AppError::validation("image: File size must not exceed 5 MB."));
        }

        match image::guess_format(&self.bytes) {
            Ok(sniffed) if sniffed == format => Ok(format),
            _ => Err(AppError::validation(
                "image: Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    base_url: String,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    /// Writes the image under a fresh name and returns its key.
    pub fn save(&self, format: ImageFormat, bytes: &[u8]) -> io::Result<String> {
        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let key = format!("recipes/{}.{}", Uuid::new_v4().simple(), extension);
        let path = self.root.join(&key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(key)
    }

    pub fn discard(&self, key: &str) {
        if let Err(e) = fs::remove_file(self.root.join(key)) {
            log::warn!("could not remove orphaned image {key}: {e}");
        }
    }

    pub fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}
