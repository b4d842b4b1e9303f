//! HTTP client implementing the core `Converter` trait against a remote
//! converter service (document rendering, TTS, structured analysis).
//!
//! The engine's gateway owns the deadline, so this client sends without a
//! request timeout of its own. Authentication uses a subscription key from
//! the environment, matching how deployments keep secrets out of config
//! files.
//!
//! Endpoint layout: `POST <base>/convert/<op>` with the input bytes as the
//! request body and options as query parameters; the response body is the
//! converted output.

use async_trait::async_trait;
use reqwest::StatusCode;

use docpipe_core::convert::{ConvertFailure, ConvertOp, ConvertOptions, Converter};

const DEFAULT_BASE_URL: &str = "http://localhost:8800";

pub struct HttpConverter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpConverter {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Client from config plus environment. `CONVERTER_BASE_URL` overrides
    /// the configured endpoint; `CONVERTER_API_KEY` is optional.
    pub fn from_env(configured_base_url: Option<String>) -> Self {
        let base_url = std::env::var("CONVERTER_BASE_URL")
            .ok()
            .or(configured_base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("CONVERTER_API_KEY").ok();
        tracing::info!(
            base_url = %base_url,
            api_key_set = api_key.is_some(),
            "Initialized HttpConverter from environment"
        );
        Self::new(base_url, api_key)
    }
}

#[async_trait]
impl Converter for HttpConverter {
    async fn convert(
        &self,
        op: ConvertOp,
        input: &[u8],
        options: &ConvertOptions,
    ) -> Result<Vec<u8>, ConvertFailure> {
        let url = format!("{}/convert/{}", self.base_url.trim_end_matches('/'), op);
        tracing::info!(url = %url, op = %op, input_len = input.len(), "converter request");

        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(input.to_vec());
        if let Some(voice) = &options.voice {
            request = request.query(&[("voice", voice.as_str())]);
        }
        if let Some(language) = &options.language {
            request = request.query(&[("language", language.as_str())]);
        }
        if let Some(key) = &self.api_key {
            request = request.header("Ocp-Apim-Subscription-Key", key.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConvertFailure::Failed(format!("converter unreachable: {e}")))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, op = %op, "converter rejected input: {body}");
            return Err(ConvertFailure::InvalidInput(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, op = %op, "converter returned error: {body}");
            return Err(ConvertFailure::Failed(format!(
                "converter returned {status}: {body}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ConvertFailure::Failed(format!("failed to read converter response: {e}")))?;
        tracing::info!(op = %op, output_len = bytes.len(), "converter response received");
        Ok(bytes.to_vec())
    }
}
