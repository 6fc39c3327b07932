use std::time::Duration;

use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};

use crate::error::GenerationError;
use crate::wire::{FormField, PreparedRequest, RawResponse, RequestBody};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Moves a prepared request over the wire and hands back whatever came back.
/// Non-2xx replies are returned as responses, not errors; interpreting them
/// is left to the caller.
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `send` needs an API key.
    fn requires_credential(&self) -> bool {
        true
    }

    fn send(
        &self,
        url: &str,
        api_key: Option<&str>,
        request: PreparedRequest,
    ) -> Result<RawResponse, GenerationError>;
}

pub struct HttpTransport {
    http: HttpClient,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(),
            timeout,
        }
    }

    fn attach_body(
        builder: RequestBuilder,
        body: RequestBody,
    ) -> Result<RequestBuilder, GenerationError> {
        match body {
            RequestBody::Json(payload) => Ok(builder.json(&payload)),
            RequestBody::Multipart(fields) => {
                let mut form = MultipartForm::new();
                for field in fields {
                    form = match field {
                        FormField::Text { name, value } => form.text(name, value),
                        FormField::File {
                            name,
                            file_name,
                            mime,
                            bytes,
                        } => {
                            let part = MultipartPart::bytes(bytes)
                                .file_name(file_name)
                                .mime_str(&mime)
                                .map_err(|err| {
                                    GenerationError::transport(
                                        None,
                                        format!("invalid upload type '{mime}': {err}"),
                                    )
                                })?;
                            form.part(name, part)
                        }
                    };
                }
                Ok(builder.multipart(form))
            }
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "stability"
    }

    fn send(
        &self,
        url: &str,
        api_key: Option<&str>,
        request: PreparedRequest,
    ) -> Result<RawResponse, GenerationError> {
        let mut builder = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, request.accept)
            .timeout(self.timeout);
        if let Some(api_key) = api_key {
            builder = builder.bearer_auth(api_key);
        }
        let builder = Self::attach_body(builder, request.body)?;

        let response = builder.send().map_err(|err| {
            GenerationError::transport(
                err.status().map(|status| status.as_u16()),
                format!("request to {url} failed: {err}"),
            )
        })?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase());
        let body = response
            .bytes()
            .map_err(|err| {
                GenerationError::transport(Some(status), format!("failed reading response: {err}"))
            })?
            .to_vec();
        tracing::debug!(url, status, bytes = body.len(), "image service replied");
        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}
