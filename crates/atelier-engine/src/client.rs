use atelier_contracts::generation::{GenerationRequest, GenerationResult};

use crate::config::ClientConfig;
use crate::error::GenerationError;
use crate::transport::{HttpTransport, Transport};
use crate::wire::{normalize_response, ModeRequest};

/// Anything that can turn a request into an image.
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError>;
}

impl<G: ImageGenerator + ?Sized> ImageGenerator for Box<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        (**self).generate(request)
    }
}

/// Client for the Stability REST API, generic over how bytes move.
pub struct StabilityClient<T = HttpTransport> {
    config: ClientConfig,
    transport: T,
}

impl StabilityClient<HttpTransport> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, HttpTransport::new())
    }

    pub fn from_env() -> Self {
        Self::new(ClientConfig::from_env())
    }
}

impl<T: Transport> StabilityClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> ImageGenerator for StabilityClient<T> {
    fn name(&self) -> &str {
        self.transport.name()
    }

    /// Validates, builds the mode-specific request, sends it and normalizes
    /// the reply. Nothing is sent when validation or the key check fails.
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        request.validate()?;
        let api_key = self.config.api_key();
        if self.transport.requires_credential() && api_key.is_none() {
            return Err(GenerationError::MissingCredential);
        }

        let prepared = ModeRequest::from_request(request)?.into_prepared()?;
        let url = self.config.url_for(prepared.endpoint);
        let shape = prepared.shape;
        tracing::debug!(
            transport = self.transport.name(),
            mode = %prepared.mode,
            url = %url,
            "sending generation request"
        );
        let raw = self.transport.send(&url, api_key, prepared)?;
        normalize_response(shape, raw)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use atelier_contracts::generation::{
        GenerationMode, GenerationSettings, UpscaleMode, ValidationError, WeightedPrompt,
    };
    use serde_json::json;

    use super::*;
    use crate::endpoints::UPSCALE_FAST;
    use crate::wire::{FormField, PreparedRequest, RawResponse, RequestBody};

    struct Sent {
        url: String,
        api_key: Option<String>,
        request: PreparedRequest,
    }

    struct RecordingTransport {
        reply: RawResponse,
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingTransport {
        fn replying(reply: RawResponse) -> Self {
            Self {
                reply,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().map(|sent| sent.len()).unwrap_or_default()
        }
    }

    impl Transport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        fn send(
            &self,
            url: &str,
            api_key: Option<&str>,
            request: PreparedRequest,
        ) -> Result<RawResponse, GenerationError> {
            self.sent.lock().unwrap().push(Sent {
                url: url.to_string(),
                api_key: api_key.map(str::to_string),
                request,
            });
            Ok(self.reply.clone())
        }
    }

    fn artifact_reply() -> RawResponse {
        RawResponse::json(
            200,
            &json!({"artifacts": [{"base64": "AAA", "seed": 9, "finishReason": "SUCCESS"}]}),
        )
    }

    fn client(reply: RawResponse) -> StabilityClient<RecordingTransport> {
        StabilityClient::with_transport(
            ClientConfig::new("http://stability.test", Some("sk-test".to_string())),
            RecordingTransport::replying(reply),
        )
    }

    #[test]
    fn text_to_image_round_trip() -> anyhow::Result<()> {
        let client = client(artifact_reply());
        let request = GenerationRequest::text_to_image(
            vec![WeightedPrompt::new("cat", 1.0)],
            GenerationSettings::default(),
        );
        let result = client.generate(&request)?;
        assert_eq!(result.image_base64, "AAA");
        assert_eq!(result.seed, 9);

        let sent = client.transport().sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].url,
            "http://stability.test/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image"
        );
        assert_eq!(sent[0].api_key.as_deref(), Some("sk-test"));
        Ok(())
    }

    #[test]
    fn missing_init_image_fails_before_sending() {
        let client = client(artifact_reply());
        let request = GenerationRequest {
            prompts: vec![WeightedPrompt::new("cat", 1.0)],
            settings: GenerationSettings {
                mode: GenerationMode::ImageToImage,
                ..GenerationSettings::default()
            },
            init_image: None,
        };
        assert!(matches!(
            client.generate(&request),
            Err(GenerationError::Validation(ValidationError::MissingInitImage(_)))
        ));
        assert_eq!(client.transport().sent_count(), 0);
    }

    #[test]
    fn missing_key_fails_before_sending() {
        let client = StabilityClient::with_transport(
            ClientConfig::new("http://stability.test", None),
            RecordingTransport::replying(artifact_reply()),
        );
        let request = GenerationRequest::text_to_image(
            vec![WeightedPrompt::new("cat", 1.0)],
            GenerationSettings::default(),
        );
        assert!(matches!(
            client.generate(&request),
            Err(GenerationError::MissingCredential)
        ));
        assert_eq!(client.transport().sent_count(), 0);
    }

    #[test]
    fn upscale_without_algorithm_uses_fast() -> anyhow::Result<()> {
        let client = client(RawResponse::image(vec![1, 2, 3]));
        let request = GenerationRequest {
            settings: GenerationSettings {
                mode: GenerationMode::Upscale,
                upscale_mode: None,
                ..GenerationSettings::default()
            },
            init_image: Some("data:image/png;base64,AAECAw==".to_string()),
            ..GenerationRequest::default()
        };
        let result = client.generate(&request)?;
        assert_eq!(result.seed, 0);
        assert_eq!(result.finish_reason, "SUCCESS");

        let sent = client.transport().sent.lock().unwrap();
        assert!(sent[0].url.ends_with(UPSCALE_FAST));
        assert_eq!(sent[0].request.accept, "image/png");
        Ok(())
    }

    #[test]
    fn image_to_image_uploads_the_init_image() -> anyhow::Result<()> {
        let client = client(artifact_reply());
        let request = GenerationRequest {
            prompts: vec![WeightedPrompt::new("watercolor", 0.5)],
            settings: GenerationSettings {
                mode: GenerationMode::ImageToImage,
                image_strength: Some(0.6),
                upscale_mode: Some(UpscaleMode::Creative),
                ..GenerationSettings::default()
            },
            init_image: Some("AAECAw==".to_string()),
        };
        client.generate(&request)?;

        let sent = client.transport().sent.lock().unwrap();
        let RequestBody::Multipart(fields) = &sent[0].request.body else {
            anyhow::bail!("expected multipart");
        };
        assert!(fields.contains(&FormField::Text {
            name: "image_strength".to_string(),
            value: "0.6".to_string(),
        }));
        assert!(fields.contains(&FormField::Text {
            name: "text_prompts[0][weight]".to_string(),
            value: "0.5".to_string(),
        }));
        Ok(())
    }

    #[test]
    fn service_errors_pass_through() {
        let client = client(RawResponse::json(400, &json!({"message": "bad request"})));
        let request = GenerationRequest::text_to_image(
            vec![WeightedPrompt::new("cat", 1.0)],
            GenerationSettings::default(),
        );
        let err = client.generate(&request).err();
        assert_eq!(err.map(|err| err.to_string()), Some("bad request".to_string()));
    }
}
