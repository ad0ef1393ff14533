use std::ffi::OsString;
use std::path::{Path, PathBuf};

use illustrator_contracts::{IllustratorError, IllustratorResult, ProviderError, ProviderErrorKind};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::response::CanonicalImage;

/// A file that was fully written and renamed into place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenImage {
    pub path: PathBuf,
    pub bytes: usize,
    pub sha256: String,
    pub mime_type: String,
}

/// Validates the bytes as an image, writes `<name>.partial`, then renames it
/// over `path`. Nothing is left at `path` unless the whole image landed.
pub fn write_image(path: &Path, image: &CanonicalImage, provider: &str) -> IllustratorResult<WrittenImage> {
    let format = image::guess_format(&image.bytes).map_err(|err| {
        ProviderError::new(
            ProviderErrorKind::MalformedImage,
            provider,
            format!("decoded payload is not a recognizable image: {err}"),
        )
    })?;

    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| IllustratorError::write(parent, err))?;
    }
    let partial = partial_path(path);
    std::fs::write(&partial, &image.bytes).map_err(|err| IllustratorError::write(&partial, err))?;
    if let Err(err) = std::fs::rename(&partial, path) {
        let _ = std::fs::remove_file(&partial);
        return Err(IllustratorError::write(path, err));
    }

    let sha256 = hex::encode(Sha256::digest(&image.bytes));
    debug!(path = %path.display(), ?format, bytes = image.bytes.len(), %sha256, "wrote image");
    Ok(WrittenImage {
        path: path.to_path_buf(),
        bytes: image.bytes.len(),
        sha256,
        mime_type: image.mime_type.clone(),
    })
}

pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("image"));
    name.push(".partial");
    path.with_file_name(name)
}
