//! Store photo uploads.
//!
//! Photos arrive in memory from a multipart form, are checked against the
//! `image/*` allow-list, resized to a fixed width and written under the
//! public uploads directory with a random filename.

use std::path::Path;

use image::{ImageFormat, imageops::FilterType};
use thiserror::Error;
use uuid::Uuid;

/// Width every stored photo is resized to.
pub const PHOTO_WIDTH: u32 = 800;

/// Errors that can occur while storing an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Content type is not `image/*`.
    #[error("That filetype isn't allowed!")]
    NotAnImage,

    /// Bytes could not be decoded as an image.
    #[error("could not read image: {0}")]
    Decode(#[from] image::ImageError),

    /// Writing the file failed.
    #[error("could not write upload: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking resize task panicked or was cancelled.
    #[error("resize task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A file part pulled out of a multipart form.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    /// Whether the form carried no file at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check the declared content type against the `image/*` allow-list.
///
/// # Errors
///
/// Returns `UploadError::NotAnImage` unless the type is `image/<subtype>`.
pub fn ensure_image(content_type: &str) -> Result<(), UploadError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.strip_prefix("image/") {
        Some(subtype) if subtype.starts_with(|c: char| c.is_ascii_alphanumeric()) => Ok(()),
        _ => Err(UploadError::NotAnImage),
    }
}

/// Extension for the format the bytes are stored in, e.g. `Jpeg` -> `jpg`.
#[must_use]
pub fn extension_for(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("img")
}

/// Height that keeps the aspect ratio at [`PHOTO_WIDTH`], never below 1.
#[must_use]
pub fn scaled_height(width: u32, height: u32) -> u32 {
    if width == 0 {
        return 1;
    }
    let scaled = u64::from(height) * u64::from(PHOTO_WIDTH) / u64::from(width);
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

/// Validate, resize and write a photo into `upload_dir`.
///
/// Returns the generated filename, whose extension follows the detected
/// image format rather than the declared type. Nothing touches the
/// filesystem unless the content type is allowed.
///
/// # Errors
///
/// Returns `UploadError::NotAnImage` for a disallowed content type,
/// `UploadError::Decode` when the bytes are not a readable image and
/// `UploadError::Io` when the file cannot be written.
pub async fn store_photo(upload_dir: &Path, upload: PhotoUpload) -> Result<String, UploadError> {
    ensure_image(&upload.content_type)?;
    let dir = upload_dir.to_path_buf();

    let filename =
        tokio::task::spawn_blocking(move || resize_and_write(&dir, &upload.bytes)).await??;

    tracing::info!(%filename, "stored photo upload");
    Ok(filename)
}

/// Delete a stored photo. A file that is already gone is not an error.
pub async fn remove_photo(upload_dir: &Path, filename: &str) {
    // Only names this module generated live here.
    if filename.contains(['/', '\\']) || filename.starts_with('.') {
        return;
    }
    match tokio::fs::remove_file(upload_dir.join(filename)).await {
        Ok(()) => tracing::debug!(%filename, "removed photo upload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(%filename, error = %e, "failed to remove photo upload"),
    }
}

fn resize_and_write(dir: &Path, bytes: &[u8]) -> Result<String, UploadError> {
    let format = image::guess_format(bytes)?;
    let photo = image::load_from_memory_with_format(bytes, format)?;
    let height = scaled_height(photo.width(), photo.height());
    let resized = photo.resize_exact(PHOTO_WIDTH, height, FilterType::Triangle);

    let filename = format!("{}.{}", Uuid::new_v4(), extension_for(format));
    let path = dir.join(&filename);

    std::fs::create_dir_all(dir)?;
    let output = match format {
        ImageFormat::Jpeg => resized.to_rgb8().save_with_format(&path, format),
        _ => resized.save_with_format(&path, format),
    };
    output?;
    Ok(filename)
}
