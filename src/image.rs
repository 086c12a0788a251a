//! Image generation collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::{Result, ToonError},
    http::read_json,
    models::{ArtifactRef, GeneratedImage},
    prompt::with_negative,
    style::AspectRatio,
};

pub const OPENAI_IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// One request to the image generator.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub negative_prompt: Option<String>,
}

/// Renders a prompt into an image reference.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage>;
}

/// How the OpenAI Images API should return the picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Hosted URL, valid for about an hour.
    #[default]
    Url,
    /// Inline base64 PNG, kept as a `data:` URI.
    B64Json,
}

impl ResponseFormat {
    fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Url => "url",
            ResponseFormat::B64Json => "b64_json",
        }
    }
}

#[derive(Serialize, Debug)]
struct ImagesGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<&'a str>,
    response_format: &'a str,
}

#[derive(Deserialize, Debug)]
struct ImagesGenerateResponse {
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize, Debug)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

impl ImagesGenerateResponse {
    fn into_generated(self) -> Result<GeneratedImage> {
        let created = self.created;
        let first = self
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ToonError::EmptyResponse("OpenAI Images API".to_string()))?;

        let artifact = match (first.url, first.b64_json) {
            (Some(url), _) if !url.is_empty() => ArtifactRef::new(url),
            (_, Some(b64)) if !b64.is_empty() => {
                ArtifactRef::new(format!("data:image/png;base64,{b64}"))
            }
            _ => return Err(ToonError::EmptyResponse("OpenAI Images API".to_string())),
        };

        Ok(GeneratedImage {
            artifact,
            revised_prompt: first.revised_prompt,
            seed: created,
        })
    }
}

/// [`ImageGenerator`] backed by the OpenAI Images API.
#[derive(Clone)]
pub struct OpenAiImageGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    response_format: ResponseFormat,
}

impl OpenAiImageGenerator {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            endpoint: OPENAI_IMAGES_URL.to_string(),
            response_format: ResponseFormat::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at a compatible endpoint (proxy, gateway or local stub).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    fn quality(&self) -> Option<&'static str> {
        (self.model == "dall-e-3").then_some("hd")
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    #[instrument(skip_all, fields(model = %self.model, size = request.aspect_ratio.image_size()))]
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage> {
        let full_prompt = with_negative(&request.prompt, request.negative_prompt.as_deref());
        debug!(prompt = %full_prompt, "Requesting image");

        let body = ImagesGenerateRequest {
            model: &self.model,
            prompt: &full_prompt,
            n: 1,
            size: request.aspect_ratio.image_size(),
            quality: self.quality(),
            response_format: self.response_format.as_str(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let parsed: ImagesGenerateResponse = read_json("OpenAI Images", response).await?;
        parsed.into_generated()
    }
}
