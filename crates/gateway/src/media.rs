//! Uploaded media handling for `/sendfile`.

use std::path::{Path, PathBuf};

use {
    base64::{Engine as _, engine::general_purpose::STANDARD},
    tracing::debug,
};

/// File extensions accepted for outbound media.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "avi", "mp4", "png", "jpg", "jpeg", "gif", "mp3", "doc", "docx", "pdf",
];

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("file type not allowed: {0:?}")]
    UnsupportedExtension(String),

    #[error("media is not valid base64: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reduce a client-supplied name to a safe, flat file name.
pub fn secure_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Decode a `data:<mime>;base64,<payload>` URL, or a bare base64 payload.
pub fn decode_data_url(data: &str) -> Result<Vec<u8>, MediaError> {
    let payload = data.split_once(',').map_or(data, |(_, payload)| payload);
    Ok(STANDARD.decode(payload.trim())?)
}

/// Validate, decode and write an upload under `dir`. Returns the saved path.
pub async fn save_media(dir: &Path, filename: &str, data: &str) -> Result<PathBuf, MediaError> {
    let name =
        secure_filename(filename).ok_or_else(|| MediaError::InvalidFilename(filename.into()))?;
    if !allowed_file(&name) {
        return Err(MediaError::UnsupportedExtension(name));
    }
    let bytes = decode_data_url(data)?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(&name);
    tokio::fs::write(&path, &bytes).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "media saved");
    Ok(path)
}
