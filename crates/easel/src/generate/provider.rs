//! Generation provider adapter.
//!
//! The single place where provider-specific errors are interpreted.
//! Upstream components only ever see an image URL — either a real one or
//! the deterministic placeholder the queue falls back to.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;

use super::error::ProviderError;

/// One image-generation request against an external provider.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// DALL-E style images endpoint over HTTPS.
pub struct OpenAiImageProvider {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    image_size: String,
}

impl OpenAiImageProvider {
    /// Builds the provider from config, resolving the API key from the
    /// configured environment variable. A missing key is not an error
    /// here — it surfaces as `MissingApiKey` at call time, which the queue
    /// converts into a placeholder result.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
            model: config.model.clone(),
            image_size: config.image_size.clone(),
        })
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::MissingApiKey)?;

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&GenerationRequest {
                model: &self.model,
                prompt,
                n: 1,
                size: &self.image_size,
                response_format: "url",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.map(|e| e.message))
                .unwrap_or_else(|| "no error detail".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerationResponse = response.json().await?;
        body.data
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .ok_or_else(|| {
                ProviderError::MalformedResponse("response contained no image url".to_string())
            })
    }
}

/// Builds the deterministic placeholder for a prompt: a small SVG with a
/// colour derived from the prompt text, shipped as a self-contained data
/// URL. Same prompt, same URL.
pub fn placeholder_url(prompt: &str) -> String {
    let mut hasher = DefaultHasher::new();
    prompt.hash(&mut hasher);
    let color = format!("#{:06x}", hasher.finish() & 0x00ff_ffff);

    let label = xml_escape(prompt);
    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="300" viewBox="0 0 400 300"><rect width="400" height="300" fill="{}"/><text x="50%" y="50%" font-family="Arial" font-size="24" fill="white" text-anchor="middle" dominant-baseline="middle">{}</text></svg>"#,
        color, label
    );

    format!("data:image/svg+xml;base64,{}", BASE64.encode(svg.as_bytes()))
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
