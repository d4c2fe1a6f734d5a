//! Reading the `file` part of a multipart upload into an `UploadedImage`

use super::ApiError;
use crate::analyzer::UploadedImage;
use crate::config::UPLOAD_FIELD;
use actix_multipart::{Field, Multipart};
use futures::TryStreamExt;
use tracing::debug;

/// Take the upload field out of `payload`, checking in order that it exists,
/// declares an image type, can be read, fits in `limit` and is not empty.
/// Other fields are skipped
pub async fn read_image(mut payload: Multipart, limit: usize) -> Result<UploadedImage, ApiError> {
    while let Some(field) = payload.try_next().await.map_err(read_error)? {
        if field.content_disposition().get_name() != Some(UPLOAD_FIELD) {
            debug!("skipping multipart field {:?}", field.content_disposition().get_name());
            continue;
        }

        let mime = match field.content_type() {
            Some(mime) if mime.type_() == "image" => mime.essence_str().to_string(),
            other => {
                let declared = other.map_or_else(|| "none".to_string(), |m| m.to_string());
                return Err(ApiError::BadRequest(format!(
                    "Invalid file type: {declared}. Please upload an image file."
                )));
            }
        };

        let bytes = read_field(field, limit).await?;
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("Empty file uploaded".to_string()));
        }

        debug!("read upload of {} bytes ({mime})", bytes.len());
        return Ok(UploadedImage::new(bytes, mime));
    }

    Err(ApiError::BadRequest("No file uploaded".to_string()))
}

async fn read_field(mut field: Field, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut bytes = Vec::new();

    while let Some(chunk) = field.try_next().await.map_err(read_error)? {
        if bytes.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

fn read_error(err: actix_multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Error reading file: {err}"))
}
