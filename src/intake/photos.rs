use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ValidationError;

/// Largest accepted photo, 5 MiB.
pub const MAX_PHOTO_BYTES: u64 = 5 * 1024 * 1024;

/// A validated image, held base64-encoded so it can go straight onto the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPhoto")]
pub struct PhotoAttachment {
    content_type: String,
    size_bytes: u64,
    data_base64: String,
}

fn validate(content_type: &str, size_bytes: u64) -> Result<(), ValidationError> {
    if !content_type.starts_with("image/") {
        return Err(ValidationError::NotAnImage {
            content_type: content_type.to_string(),
        });
    }
    if size_bytes > MAX_PHOTO_BYTES {
        return Err(ValidationError::PhotoTooLarge { size_bytes });
    }
    Ok(())
}

/// Wire form; the stored size is recomputed from the decoded bytes.
#[derive(Deserialize)]
struct RawPhoto {
    content_type: String,
    data_base64: String,
}

impl TryFrom<RawPhoto> for PhotoAttachment {
    type Error = ValidationError;

    fn try_from(raw: RawPhoto) -> Result<Self, Self::Error> {
        let bytes = STANDARD
            .decode(raw.data_base64.as_bytes())
            .map_err(|e| ValidationError::PhotoUnreadable(format!("invalid base64: {}", e)))?;
        Self::new(&raw.content_type, &bytes)
    }
}

impl PhotoAttachment {
    pub fn new(content_type: &str, bytes: &[u8]) -> Result<Self, ValidationError> {
        let content_type = content_type.trim().to_ascii_lowercase();
        let size_bytes = bytes.len() as u64;
        validate(&content_type, size_bytes)?;

        Ok(Self {
            content_type,
            size_bytes,
            data_base64: STANDARD.encode(bytes),
        })
    }

    /// Reads and validates an image file. Nothing is returned unless the whole file was read.
    pub async fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ValidationError::PhotoUnreadable(format!("{}: {}", path.display(), e)))?;
        if metadata.len() > MAX_PHOTO_BYTES {
            return Err(ValidationError::PhotoTooLarge {
                size_bytes: metadata.len(),
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ValidationError::PhotoUnreadable(format!("{}: {}", path.display(), e)))?;

        let content_type = sniff_content_type(path, &bytes);
        log::debug!(
            "Read photo {} ({} bytes, {})",
            path.display(),
            bytes.len(),
            content_type
        );
        Self::new(&content_type, &bytes)
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn data_base64(&self) -> &str {
        &self.data_base64
    }

    /// `data:` URL form accepted by chat-completion `image_url` parts.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.data_base64)
    }
}

/// Magic bytes first, file extension second.
fn sniff_content_type(path: &Path, bytes: &[u8]) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }
    image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

/// The photo attached to the next chat message, plus the photos gathered during intake.
#[derive(Debug, Clone, Default)]
pub struct PhotoStore {
    current: Option<PhotoAttachment>,
    symptom_photos: Vec<PhotoAttachment>,
}

impl PhotoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any photo already waiting for the next message.
    pub fn set_current(&mut self, photo: PhotoAttachment) {
        self.current = Some(photo);
    }

    pub fn current(&self) -> Option<&PhotoAttachment> {
        self.current.as_ref()
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    pub fn add_symptom_photo(&mut self, photo: PhotoAttachment) -> usize {
        self.symptom_photos.push(photo);
        self.symptom_photos.len() - 1
    }

    /// Later photos shift down to close the gap.
    pub fn remove_symptom_photo(&mut self, index: usize) -> Result<PhotoAttachment, ValidationError> {
        if index >= self.symptom_photos.len() {
            return Err(ValidationError::PhotoIndexOutOfRange {
                index,
                len: self.symptom_photos.len(),
            });
        }
        Ok(self.symptom_photos.remove(index))
    }

    pub fn symptom_photos(&self) -> &[PhotoAttachment] {
        &self.symptom_photos
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.symptom_photos.is_empty()
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.symptom_photos.clear();
    }
}
