//! Best-effort metadata for produced files.

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use serde::Serialize;

use crate::backend::ExecutionBackend;
use crate::history::OutputFile;

/// Metadata attached to a registered asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetMetadata {
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bytes_size: Option<u64>,
}

/// MIME type guessed from the file extension.
pub fn mime_type_for(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())?
        .to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "opus" => "audio/opus",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        _ => return None,
    };
    Some(mime)
}

/// Pixel dimensions read from an image header without full decode.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Longest edge of an inline preview, in pixels.
pub const PREVIEW_MAX_DIM: u32 = 256;
/// JPEG quality used for inline previews.
pub const PREVIEW_QUALITY: u8 = 70;
/// Upper bound on the base64 payload of one preview.
pub const PREVIEW_MAX_B64_CHARS: usize = 100_000;

/// A downscaled, base64-encoded copy of an image asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlinePreview {
    pub mime_type: String,
    /// `data:` URI carrying the encoded preview.
    pub data_uri: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("Image decode/encode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Preview too large: {0} base64 chars")]
    TooLarge(usize),
}

/// Downscale `bytes` to fit [`PREVIEW_MAX_DIM`] and encode as a JPEG data URI.
pub fn encode_preview(bytes: &[u8]) -> Result<InlinePreview, PreviewError> {
    let decoded = image::load_from_memory(bytes)?;
    let thumb = if decoded.width() > PREVIEW_MAX_DIM || decoded.height() > PREVIEW_MAX_DIM {
        decoded.thumbnail(PREVIEW_MAX_DIM, PREVIEW_MAX_DIM)
    } else {
        decoded
    };

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, PREVIEW_QUALITY);
    thumb.to_rgb8().write_with_encoder(encoder)?;

    let b64 = base64::engine::general_purpose::STANDARD.encode(out.into_inner());
    if b64.len() > PREVIEW_MAX_B64_CHARS {
        return Err(PreviewError::TooLarge(b64.len()));
    }
    Ok(InlinePreview {
        mime_type: "image/jpeg".to_string(),
        data_uri: format!("data:image/jpeg;base64,{b64}"),
    })
}

/// Fetch an image output and build its inline preview.
///
/// Non-image files yield `None`. Failures are logged and also yield `None`.
pub async fn fetch_inline_preview(
    backend: &dyn ExecutionBackend,
    file: &OutputFile,
) -> Option<InlinePreview> {
    if !mime_type_for(&file.filename).is_some_and(|m| m.starts_with("image/")) {
        return None;
    }
    let bytes = match backend.view(file).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(filename = %file.filename, error = %e, "Could not fetch asset for inline preview");
            return None;
        }
    };
    match encode_preview(&bytes) {
        Ok(preview) => Some(preview),
        Err(e) => {
            tracing::warn!(filename = %file.filename, error = %e, "Failed to generate inline preview");
            None
        }
    }
}

/// Fill size and dimensions by downloading the file.
///
/// Any failure is logged and leaves the affected fields empty.
pub async fn collect_metadata(backend: &dyn ExecutionBackend, file: &OutputFile) -> AssetMetadata {
    let mime_type = mime_type_for(&file.filename);
    let mut metadata = AssetMetadata {
        mime_type: mime_type.map(str::to_string),
        ..Default::default()
    };

    match backend.view(file).await {
        Ok(bytes) => {
            metadata.bytes_size = Some(bytes.len() as u64);
            if mime_type.is_some_and(|m| m.starts_with("image/")) {
                if let Some((width, height)) = image_dimensions(&bytes) {
                    metadata.width = Some(width);
                    metadata.height = Some(height);
                }
            }
        }
        Err(e) => {
            tracing::warn!(filename = %file.filename, error = %e, "Could not fetch asset for metadata");
        }
    }

    metadata
}
