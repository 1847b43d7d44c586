//! Multipart upload plumbing shared by the file-taking routes.

use axum::{
    extract::{multipart::MultipartError, Multipart},
    http::StatusCode,
};

use super::ApiError;

const UPLOAD_FIELD: &str = "file";

/// Bytes of the `file` part. Other parts are skipped.
pub(super) async fn read_upload(
    request_id: &str,
    mut multipart: Multipart,
) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(request_id, &e))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| multipart_error(request_id, &e))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(ApiError::validation(
        request_id,
        format!("multipart field '{UPLOAD_FIELD}' is required"),
    ))
}

fn multipart_error(request_id: &str, error: &MultipartError) -> ApiError {
    let code = if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else {
        "bad_request"
    };
    ApiError::new(request_id, code, error.body_text())
}
