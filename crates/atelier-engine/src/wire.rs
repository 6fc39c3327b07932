use atelier_contracts::generation::{
    GenerationMode, GenerationRequest, GenerationResult, StylePreset, UpscaleMode,
    ValidationError, WeightedPrompt,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{decode_base64, encode_base64};
use crate::endpoints::endpoint_for;
use crate::error::{GenerationError, MalformedResponse};

/// Text-to-image renders are always this size.
pub const OUTPUT_DIMENSION: u32 = 1024;
pub const UPSCALE_FINISH_REASON: &str = "SUCCESS";

const JSON_ACCEPT: &str = "application/json";
const PNG_ACCEPT: &str = "image/png";
const PNG_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextToImageBody {
    pub text_prompts: Vec<WeightedPrompt>,
    pub cfg_scale: f64,
    pub height: u32,
    pub width: u32,
    pub steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    pub samples: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_preset: Option<StylePreset>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageToImageForm {
    pub init_image: Vec<u8>,
    pub image_strength: f64,
    pub text_prompts: Vec<WeightedPrompt>,
    pub cfg_scale: f64,
    pub steps: u32,
    pub seed: Option<u32>,
    pub style_preset: Option<StylePreset>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpscaleForm {
    pub image: Vec<u8>,
    pub upscale_mode: UpscaleMode,
}

/// One variant per remote operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeRequest {
    TextToImage(TextToImageBody),
    ImageToImage(ImageToImageForm),
    Upscale(UpscaleForm),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

impl FormField {
    fn text(name: impl Into<String>, value: impl ToString) -> Self {
        FormField::Text {
            name: name.into(),
            value: value.to_string(),
        }
    }

    fn png(name: &str, bytes: Vec<u8>) -> Self {
        FormField::File {
            name: name.to_string(),
            file_name: format!("{name}.png"),
            mime: PNG_MIME.to_string(),
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FormField::Text { name, .. } | FormField::File { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Multipart(Vec<FormField>),
}

/// What a successful reply looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{ "artifacts": [{ "base64", "seed", "finishReason" }] }`
    ArtifactJson,
    /// The encoded image itself.
    RawImage,
}

impl ResponseShape {
    fn failure_fallback(self) -> &'static str {
        match self {
            ResponseShape::ArtifactJson => "Failed to generate image",
            ResponseShape::RawImage => "Failed to upscale image",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub mode: GenerationMode,
    pub endpoint: &'static str,
    pub accept: &'static str,
    pub body: RequestBody,
    pub shape: ResponseShape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            content_type: Some(JSON_ACCEPT.to_string()),
            body: serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some(PNG_MIME.to_string()),
            body: bytes,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl ModeRequest {
    /// Builds the wire form of a request, decoding the init image where the
    /// mode uploads one.
    pub fn from_request(request: &GenerationRequest) -> Result<Self, GenerationError> {
        let settings = &request.settings;
        match settings.mode {
            GenerationMode::TextToImage => Ok(ModeRequest::TextToImage(TextToImageBody {
                text_prompts: request.submitted_prompts(),
                cfg_scale: settings.cfg_scale,
                height: OUTPUT_DIMENSION,
                width: OUTPUT_DIMENSION,
                steps: settings.steps,
                seed: settings.seed,
                samples: settings.samples,
                style_preset: settings.style_preset,
            })),
            GenerationMode::ImageToImage => Ok(ModeRequest::ImageToImage(ImageToImageForm {
                init_image: decode_init_image(request)?,
                image_strength: settings.effective_image_strength(),
                text_prompts: request.submitted_prompts(),
                cfg_scale: settings.cfg_scale,
                steps: settings.steps,
                seed: settings.seed,
                style_preset: settings.style_preset,
            })),
            GenerationMode::Upscale => Ok(ModeRequest::Upscale(UpscaleForm {
                image: decode_init_image(request)?,
                upscale_mode: settings.effective_upscale_mode(),
            })),
        }
    }

    pub fn mode(&self) -> GenerationMode {
        match self {
            ModeRequest::TextToImage(_) => GenerationMode::TextToImage,
            ModeRequest::ImageToImage(_) => GenerationMode::ImageToImage,
            ModeRequest::Upscale(_) => GenerationMode::Upscale,
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            ModeRequest::Upscale(form) => {
                endpoint_for(GenerationMode::Upscale, Some(form.upscale_mode))
            }
            other => endpoint_for(other.mode(), None),
        }
    }

    pub fn into_prepared(self) -> Result<PreparedRequest, GenerationError> {
        let mode = self.mode();
        let endpoint = self.endpoint();
        let prepared = match self {
            ModeRequest::TextToImage(body) => PreparedRequest {
                mode,
                endpoint,
                accept: JSON_ACCEPT,
                body: RequestBody::Json(serde_json::to_value(&body).map_err(|err| {
                    GenerationError::transport(None, format!("failed to encode request: {err}"))
                })?),
                shape: ResponseShape::ArtifactJson,
            },
            ModeRequest::ImageToImage(form) => {
                let mut fields = vec![
                    FormField::png("init_image", form.init_image),
                    FormField::text("image_strength", form.image_strength),
                ];
                for (index, prompt) in form.text_prompts.iter().enumerate() {
                    fields.push(FormField::text(
                        format!("text_prompts[{index}][text]"),
                        &prompt.text,
                    ));
                    fields.push(FormField::text(
                        format!("text_prompts[{index}][weight]"),
                        prompt.weight,
                    ));
                }
                fields.push(FormField::text("cfg_scale", form.cfg_scale));
                fields.push(FormField::text("steps", form.steps));
                if let Some(seed) = form.seed {
                    fields.push(FormField::text("seed", seed));
                }
                if let Some(style_preset) = form.style_preset {
                    fields.push(FormField::text("style_preset", style_preset.slug()));
                }
                PreparedRequest {
                    mode,
                    endpoint,
                    accept: JSON_ACCEPT,
                    body: RequestBody::Multipart(fields),
                    shape: ResponseShape::ArtifactJson,
                }
            }
            ModeRequest::Upscale(form) => PreparedRequest {
                mode,
                endpoint,
                accept: PNG_ACCEPT,
                body: RequestBody::Multipart(vec![FormField::png("image", form.image)]),
                shape: ResponseShape::RawImage,
            },
        };
        Ok(prepared)
    }
}

fn decode_init_image(request: &GenerationRequest) -> Result<Vec<u8>, GenerationError> {
    let raw = request
        .init_image()
        .ok_or(ValidationError::MissingInitImage(request.mode()))?;
    Ok(decode_base64(raw)?)
}

#[derive(Debug, Deserialize)]
struct ArtifactEnvelope {
    #[serde(default)]
    artifacts: Option<Vec<Artifact>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    #[serde(default)]
    base64: String,
    #[serde(default)]
    seed: u64,
    #[serde(default)]
    finish_reason: String,
}

/// Maps any reply, successful or not, onto the shared result type.
pub fn normalize_response(
    shape: ResponseShape,
    raw: RawResponse,
) -> Result<GenerationResult, GenerationError> {
    if !raw.is_success() {
        let message =
            service_message(&raw.body).unwrap_or_else(|| shape.failure_fallback().to_string());
        return Err(GenerationError::transport(Some(raw.status), message));
    }

    match shape {
        ResponseShape::ArtifactJson => {
            let envelope: ArtifactEnvelope = serde_json::from_slice(&raw.body)
                .map_err(|err| MalformedResponse::InvalidJson(err.to_string()))?;
            let artifact = envelope
                .artifacts
                .and_then(|rows| rows.into_iter().next())
                .filter(|artifact| !artifact.base64.trim().is_empty())
                .ok_or(MalformedResponse::NoArtifact)?;
            Ok(GenerationResult {
                image_base64: artifact.base64,
                seed: artifact.seed,
                finish_reason: artifact.finish_reason,
            })
        }
        ResponseShape::RawImage => {
            if raw.body.is_empty() {
                return Err(MalformedResponse::EmptyImage.into());
            }
            Ok(GenerationResult {
                image_base64: encode_base64(&raw.body),
                seed: 0,
                finish_reason: UPSCALE_FINISH_REASON.to_string(),
            })
        }
    }
}

/// Pulls the human-readable message out of an error body, if any.
fn service_message(body: &[u8]) -> Option<String> {
    let payload: Value = serde_json::from_slice(body).ok()?;
    payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| {
            payload
                .get("errors")
                .and_then(Value::as_array)
                .and_then(|rows| rows.first())
                .and_then(Value::as_str)
        })
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
