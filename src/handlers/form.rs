use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use tracing::{info, warn};
use url::Url;

use crate::config::{INVALID_IMAGE_MESSAGE, MISSING_IMAGE_MESSAGE};
use crate::llm::media::{
    declared_svg_type, detect_mime_type, is_image_mime, normalize_image_mime_type,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("{}", INVALID_IMAGE_MESSAGE)]
    NotAnImage,
    #[error("{}", MISSING_IMAGE_MESSAGE)]
    MissingImage,
    #[error("an analysis request is already in flight")]
    RequestPending,
}

/// A photo that passed type validation and has been fully encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub encoded: String,
    pub preview_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub image: Option<SelectedImage>,
    pub name: String,
    pub age: String,
    pub traits: String,
}

impl FormState {
    pub fn encoded_image(&self) -> &str {
        self.image
            .as_ref()
            .map(|image| image.encoded.as_str())
            .unwrap_or("")
    }

    pub fn preview_url(&self) -> &str {
        self.image
            .as_ref()
            .map(|image| image.preview_url.as_str())
            .unwrap_or("")
    }

    pub fn has_encoded_image(&self) -> bool {
        !self.encoded_image().is_empty()
    }

    pub fn clear_image(&mut self) {
        self.image = None;
    }

    pub fn set_name(&mut self, value: &str) {
        self.name = value.to_string();
    }

    pub fn set_age(&mut self, value: &str) {
        self.age = value.to_string();
    }

    pub fn set_traits(&mut self, value: &str) {
        self.traits = value.to_string();
    }
}

fn preview_url_for(path: &Path) -> String {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| path.display().to_string())
}

/// Reads and validates a photo. Anything that cannot be read, or whose
/// content is not an image, is rejected as [`FormError::NotAnImage`].
pub async fn load_image(path: &Path) -> Result<SelectedImage, FormError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("Failed to read photo {}: {}", path.display(), err);
            return Err(FormError::NotAnImage);
        }
    };

    let mime_type = detect_mime_type(&bytes)
        .filter(|mime| is_image_mime(mime))
        .or_else(|| declared_svg_type(path, &bytes));
    let Some(mime_type) = mime_type else {
        info!(
            "Rejected non-image selection {} ({} bytes)",
            path.display(),
            bytes.len()
        );
        return Err(FormError::NotAnImage);
    };

    let absolute = tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf());
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "photo".to_string());
    let encoded = general_purpose::STANDARD.encode(&bytes);

    Ok(SelectedImage {
        file_name,
        mime_type: normalize_image_mime_type(&mime_type),
        bytes,
        encoded,
        preview_url: preview_url_for(&absolute),
    })
}
