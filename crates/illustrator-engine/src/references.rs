use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use illustrator_contracts::request::{ReferenceImage, MAX_REFERENCE_IMAGES};
use illustrator_contracts::{IllustratorError, IllustratorResult};
use tracing::{debug, warn};

/// Reads and encodes up to [`MAX_REFERENCE_IMAGES`] style references.
///
/// Extra paths are dropped with a warning. A missing or unreadable file is an
/// error, raised before any generation call.
pub fn load_reference_images(paths: &[PathBuf]) -> IllustratorResult<Vec<ReferenceImage>> {
    if paths.len() > MAX_REFERENCE_IMAGES {
        let dropped: Vec<String> = paths[MAX_REFERENCE_IMAGES..]
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        warn!(
            limit = MAX_REFERENCE_IMAGES,
            dropped = %dropped.join(", "),
            "too many reference images; extra paths ignored"
        );
    }
    paths
        .iter()
        .take(MAX_REFERENCE_IMAGES)
        .map(|path| load_reference_image(path))
        .collect()
}

pub fn load_reference_image(path: &Path) -> IllustratorResult<ReferenceImage> {
    let bytes = std::fs::read(path).map_err(|err| IllustratorError::read(path, err))?;
    let mime_type = mime_for_path(path).unwrap_or("image/png");
    debug!(path = %path.display(), bytes = bytes.len(), mime_type, "loaded reference image");
    Ok(ReferenceImage {
        path: path.to_path_buf(),
        mime_type: mime_type.to_string(),
        data_base64: BASE64.encode(bytes),
    })
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
