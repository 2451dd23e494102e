use bytes::Bytes;

use crate::error::{AppError, AppResult};

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const MAX_FILENAME_LEN: usize = 100;

/// An image received from a multipart form, not yet stored.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub field: &'static str,
    pub filename: String,
    pub bytes: Bytes,
}

/// Check name, extension and size. Returns the normalised extension.
pub fn validate_upload(upload: &ImageUpload, max_bytes: usize) -> AppResult<String> {
    if upload.filename.len() > MAX_FILENAME_LEN {
        return Err(AppError::validation(upload.field, "File name too long."));
    }
    if upload.bytes.is_empty() {
        return Err(AppError::validation(upload.field, "The submitted file is empty."));
    }
    if upload.bytes.len() > max_bytes {
        return Err(AppError::validation(
            upload.field,
            format!(
                "File size too large. Maximum size is {}MB.",
                max_bytes / 1024 / 1024
            ),
        ));
    }

    let ext = upload
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(AppError::validation(
            upload.field,
            format!(
                "Unsupported file format. Supported formats: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ),
        ));
    }

    Ok(ext)
}

/// Every upload gets a fresh name so a replacement never overwrites the
/// asset it replaces.
pub fn profile_picture_path(user_id: &str, ext: &str) -> String {
    format!(
        "profile_pics/user_{}/profile_{}.{}",
        user_id,
        uuid::Uuid::now_v7().simple(),
        ext
    )
}

pub fn post_image_path(post_id: &str, ext: &str) -> String {
    format!(
        "post_images/post_{}/{}.{}",
        post_id,
        uuid::Uuid::now_v7().simple(),
        ext
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, len: usize) -> ImageUpload {
        ImageUpload {
            field: "image",
            filename: name.to_string(),
            bytes: Bytes::from(vec![0u8; len]),
        }
    }

    #[test]
    fn accepts_known_extensions_case_insensitively() {
        assert_eq!(validate_upload(&upload("me.PNG", 10), 1024).unwrap(), "png");
        assert_eq!(validate_upload(&upload("a.b.webp", 10), 1024).unwrap(), "webp");
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(validate_upload(&upload("script.exe", 10), 1024).is_err());
        assert!(validate_upload(&upload("noext", 10), 1024).is_err());
    }

    #[test]
    fn rejects_oversized_and_empty_files() {
        assert!(validate_upload(&upload("big.jpg", 2048), 1024).is_err());
        assert!(validate_upload(&upload("empty.jpg", 0), 1024).is_err());
    }

    #[test]
    fn rejects_long_file_names() {
        let name = format!("{}.png", "x".repeat(100));
        assert!(validate_upload(&upload(&name, 10), 1024).is_err());
    }

    #[test]
    fn paths_are_per_record_and_unique() {
        let a = profile_picture_path("u1", "png");
        let b = profile_picture_path("u1", "png");
        assert!(a.starts_with("profile_pics/user_u1/"));
        assert_ne!(a, b);
        assert!(post_image_path("p1", "gif").starts_with("post_images/post_p1/"));
    }
}
