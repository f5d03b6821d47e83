//! Object key layout.
//!
//! ```text
//! library/{uuid}.png                      generated and prepared images
//! animations/generated/{uuid}.mp4         provider clips
//! animations/stitched/{uuid}.mp4          stitched loops
//! animations/keyed/{job_id}_{uuid}.webm   transparent keyed videos
//! animations/keyed/{job_id}_{uuid}.gif    GIF exports
//! animations/keyed/{job_id}_{uuid}.tar.gz frame archives
//! previews/{uuid}.png                     single keyed preview frames
//! ```

use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

pub fn library_image_key(extension: &str) -> String {
    format!("library/{}.{}", Uuid::new_v4(), extension)
}

pub fn generated_animation_key() -> String {
    format!("animations/generated/{}.mp4", Uuid::new_v4())
}

pub fn stitched_animation_key() -> String {
    format!("animations/stitched/{}.mp4", Uuid::new_v4())
}

/// Shared stem for every keyed output of one keying pass.
///
/// The transparent video, GIF and frame archive differ only in extension.
/// Only the video's URI is stored on the job; the exports are found by
/// swapping its `.webm` extension.
pub fn keyed_output_stem(job_id: i64) -> String {
    format!("animations/keyed/{}_{}", job_id, Uuid::new_v4())
}

/// Keyed output for `job_id`; `extension` is `webm`, `gif` or `tar.gz`.
pub fn keyed_output_key(job_id: i64, extension: &str) -> String {
    format!("{}.{}", keyed_output_stem(job_id), extension)
}

pub fn keying_preview_key() -> String {
    format!("previews/{}.png", Uuid::new_v4())
}

/// Reject keys that are empty, absolute, or escape their prefix.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}

/// MIME type from the key's extension.
pub fn content_type_for(key: &str) -> &'static str {
    let lower = key.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") {
        return "application/gzip";
    }
    match lower.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("txt") => "text/plain; charset=utf-8",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert!(library_image_key("png").starts_with("library/"));
        assert!(generated_animation_key().ends_with(".mp4"));
        let keyed = keyed_output_key(42, "tar.gz");
        assert!(keyed.starts_with("animations/keyed/42_"));
        assert!(keyed.ends_with(".tar.gz"));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("library/a.png").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("library/../../etc").is_err());
        assert!(validate_key("library//a.png").is_err());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for("a/b.PNG"), "image/png");
        assert_eq!(content_type_for("x.webm"), "video/webm");
        assert_eq!(content_type_for("x.tar.gz"), "application/gzip");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
