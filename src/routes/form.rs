use std::collections::HashMap;

use axum::extract::Multipart;

use crate::error::{AppError, AppResult};
use crate::media::{validate_upload, ImageUpdate, ImageUpload};
use crate::state::AppState;

/// A multipart form with at most one image part.
#[derive(Debug, Default)]
pub struct ImageForm {
    fields: HashMap<String, String>,
    image: Option<ImageUpload>,
}

impl ImageForm {
    /// Read every part. `image_field` names the file part; an empty file
    /// part counts as no file.
    pub async fn read(mut multipart: Multipart, image_field: &'static str) -> AppResult<Self> {
        let mut form = ImageForm::default();

        while let Some(field) = multipart.next_field().await.map_err(|err| {
            tracing::debug!("Could not read multipart body: {}", err);
            AppError::validation("form", "Malformed multipart body.")
        })? {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_owned);
            let bytes = field.bytes().await.map_err(|err| {
                tracing::debug!("Could not read multipart field {}: {}", name, err);
                AppError::validation(image_field, "Could not read the submitted file.")
            })?;

            match filename {
                Some(filename) if name == image_field => {
                    if !filename.is_empty() || !bytes.is_empty() {
                        form.image = Some(ImageUpload {
                            field: image_field,
                            filename,
                            bytes,
                        });
                    }
                }
                _ => {
                    let value = String::from_utf8(bytes.to_vec())
                        .map_err(|_| AppError::validation(name.clone(), "Field must be UTF-8 text."))?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    /// Checkbox-style flag: `true`, `1` or `on`.
    pub fn flag(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .is_some_and(|v| matches!(v.trim(), "true" | "1" | "on"))
    }

    pub fn take_image(&mut self) -> Option<ImageUpload> {
        self.image.take()
    }
}

/// Validate and store an upload at the path chosen by `path_for(ext)`.
pub fn store_image(
    state: &AppState,
    upload: &ImageUpload,
    path_for: impl FnOnce(&str) -> String,
) -> AppResult<String> {
    let ext = validate_upload(upload, state.config.storage.max_upload_bytes)?;
    let path = path_for(&ext);
    state.media.save(&path, &upload.bytes)?;
    tracing::debug!("Stored upload {}", path);
    Ok(path)
}

/// Image change from a form: a new file wins over the clear flag.
pub fn image_update(
    state: &AppState,
    form: &mut ImageForm,
    clear_flag: &str,
    path_for: impl FnOnce(&str) -> String,
) -> AppResult<ImageUpdate> {
    if let Some(upload) = form.take_image() {
        return Ok(ImageUpdate::Replace(store_image(state, &upload, path_for)?));
    }
    if form.flag(clear_flag) {
        return Ok(ImageUpdate::Clear);
    }
    Ok(ImageUpdate::Keep)
}
