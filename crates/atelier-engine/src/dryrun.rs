use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::codec::encode_base64;
use crate::error::GenerationError;
use crate::transport::Transport;
use crate::wire::{FormField, PreparedRequest, RawResponse, RequestBody, ResponseShape};

/// Side length of offline renders. Kept small so cached data URIs stay light.
pub const DRYRUN_DIMENSION: u32 = 64;

/// Offline stand-in for the image service. Replies with a solid-colour PNG
/// whose colour is derived from the request, so identical requests render
/// identically.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryrunTransport;

impl DryrunTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for DryrunTransport {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn requires_credential(&self) -> bool {
        false
    }

    fn send(
        &self,
        url: &str,
        _api_key: Option<&str>,
        request: PreparedRequest,
    ) -> Result<RawResponse, GenerationError> {
        let digest = fingerprint(url, &request.body);
        tracing::debug!(
            url,
            fingerprint = %hex::encode(&digest[..4]),
            "dryrun render"
        );
        let (width, height) = match request.shape {
            ResponseShape::ArtifactJson => (DRYRUN_DIMENSION, DRYRUN_DIMENSION),
            ResponseShape::RawImage => upscaled_dimensions(&request.body),
        };
        let png = render_png(width, height, (digest[0], digest[1], digest[2]))?;

        match request.shape {
            ResponseShape::RawImage => Ok(RawResponse::image(png)),
            ResponseShape::ArtifactJson => {
                let seed = requested_seed(&request.body).unwrap_or_else(|| {
                    u64::from(u32::from_be_bytes([digest[4], digest[5], digest[6], digest[7]]))
                });
                Ok(RawResponse::json(
                    200,
                    &json!({
                        "artifacts": [{
                            "base64": encode_base64(&png),
                            "seed": seed,
                            "finishReason": "SUCCESS",
                        }]
                    }),
                ))
            }
        }
    }
}

fn fingerprint(url: &str, body: &RequestBody) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    match body {
        RequestBody::Json(payload) => {
            hasher.update(serde_json::to_vec(payload).unwrap_or_default());
        }
        RequestBody::Multipart(fields) => {
            for field in fields {
                hasher.update(field.name().as_bytes());
                match field {
                    FormField::Text { value, .. } => hasher.update(value.as_bytes()),
                    FormField::File { bytes, .. } => hasher.update(bytes),
                }
            }
        }
    }
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

fn requested_seed(body: &RequestBody) -> Option<u64> {
    match body {
        RequestBody::Json(payload) => payload.get("seed").and_then(Value::as_u64),
        RequestBody::Multipart(fields) => fields.iter().find_map(|field| match field {
            FormField::Text { name, value } if name == "seed" => value.parse().ok(),
            _ => None,
        }),
    }
}

/// Twice the uploaded image's size, or the default render size when the
/// upload is not a decodable image.
fn upscaled_dimensions(body: &RequestBody) -> (u32, u32) {
    let RequestBody::Multipart(fields) = body else {
        return (DRYRUN_DIMENSION, DRYRUN_DIMENSION);
    };
    fields
        .iter()
        .find_map(|field| match field {
            FormField::File { bytes, .. } => image::load_from_memory(bytes).ok(),
            FormField::Text { .. } => None,
        })
        .map(|source| (source.width().saturating_mul(2), source.height().saturating_mul(2)))
        .filter(|(width, height)| *width > 0 && *height > 0 && *width <= 4096 && *height <= 4096)
        .unwrap_or((DRYRUN_DIMENSION, DRYRUN_DIMENSION))
}

fn render_png(
    width: u32,
    height: u32,
    (r, g, b): (u8, u8, u8),
) -> Result<Vec<u8>, GenerationError> {
    let mut image = RgbImage::new(width, height);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| GenerationError::transport(None, format!("dryrun render failed: {err}")))?;
    Ok(out.into_inner())
}
