//! StudioClient - talks to the generation proxy over HTTP.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

/// Environment variable overriding the proxy base URL.
pub const BASE_URL_ENV: &str = "COLLAGE_STUDIO_URL";

/// Default base URL of the generation proxy.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

pub const HARMONIZE_PATH: &str = "/api/gen/harmonize";
pub const ANIMATE_PATH: &str = "/api/gen/animate";
pub const IMAGEGEN_PATH: &str = "/api/gen/imagegen";

/// Default timeout for HTTP requests. Harmonization is a single long round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Default connection timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Validate a required free-text field before sending it anywhere.
pub fn validate_prompt(prompt: &str) -> Result<(), ServiceError> {
    if prompt.trim().is_empty() {
        return Err(ServiceError::EmptyPrompt);
    }
    Ok(())
}

/// Base64 image payload as returned by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Image {
    base64: String,
}

impl Base64Image {
    pub fn new(base64: impl Into<String>) -> Self {
        Self {
            base64: base64.into(),
        }
    }

    pub fn as_base64(&self) -> &str {
        &self.base64
    }

    /// Inline-displayable `data:` URL.
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.base64)
    }

    /// Raw encoded image bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ServiceError> {
        Ok(BASE64_STANDARD.decode(self.base64.as_bytes())?)
    }
}

/// Successful harmonization.
#[derive(Debug, Clone, PartialEq)]
pub struct Harmonized {
    pub image: Base64Image,
    /// Instructions echoed back by the proxy.
    pub instructions: String,
}

/// Token for a long-running animation on the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationTicket {
    pub prediction_id: String,
    pub status: String,
}

/// Result of a single animation status poll.
#[derive(Debug, Clone, PartialEq)]
pub enum AnimationStatus {
    /// Not finished yet. Carries the provider's raw status string.
    Running { status: String },
    Completed { video_url: String },
    Failed { error: String },
}

/// The remote generation services the orchestrator depends on.
pub trait GenerationService: Send + Sync + 'static {
    /// Submit a composite for harmonization. Single round trip.
    fn harmonize(
        &self,
        composite_png: Vec<u8>,
        instructions: &str,
    ) -> impl Future<Output = Result<Harmonized, ServiceError>> + Send;

    /// Start an animation; returns immediately with a ticket.
    fn submit_animation(
        &self,
        image_png: Vec<u8>,
        description: &str,
    ) -> impl Future<Output = Result<AnimationTicket, ServiceError>> + Send;

    /// Query the status of a previously submitted animation.
    fn poll_animation(
        &self,
        prediction_id: &str,
    ) -> impl Future<Output = Result<AnimationStatus, ServiceError>> + Send;

    /// Text-to-image generation.
    fn generate_image(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<Base64Image, ServiceError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HarmonizeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    prediction_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the stateless generation proxy.
pub struct StudioClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl StudioClient {
    /// Create a client for the URL in `COLLAGE_STUDIO_URL`, or the local default.
    pub fn new() -> Result<Self, ServiceError> {
        let base_url =
            std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_base_url(base_url)
    }

    /// Create a client against an explicit base URL. Useful against a mock server.
    pub fn with_base_url(base_url: String) -> Result<Self, ServiceError> {
        Self::with_timeouts(base_url, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a client with custom request and connect timeouts.
    pub fn with_timeouts(
        base_url: String,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ServiceError::MissingBaseUrl);
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Download a video to disk, streaming the body.
    pub async fn download_video(&self, url: &str, dest: &Path) -> Result<PathBuf, ServiceError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response, "Video download failed").await);
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();

        use futures_util::StreamExt;
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            file.write_all(&chunk).await?;
        }

        file.flush().await?;

        Ok(dest.to_path_buf())
    }
}

impl GenerationService for StudioClient {
    async fn harmonize(
        &self,
        composite_png: Vec<u8>,
        instructions: &str,
    ) -> Result<Harmonized, ServiceError> {
        if composite_png.is_empty() {
            return Err(ServiceError::MissingImage);
        }

        let form = Form::new()
            .part("image", png_part(composite_png, "collage.png")?)
            .text("instructions", instructions.to_string());

        log::info!("Submitting composite for harmonization");
        let response = self
            .http_client
            .post(self.url(HARMONIZE_PATH))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response, "Failed to generate harmonized image").await);
        }

        let body: HarmonizeResponse = response.json().await?;
        match body.image {
            Some(image) if body.success => Ok(Harmonized {
                image: Base64Image::new(image),
                instructions: body.instructions.unwrap_or_default(),
            }),
            _ => Err(ServiceError::InvalidResponse(
                body.error
                    .unwrap_or_else(|| "Failed to generate image".to_string()),
            )),
        }
    }

    async fn submit_animation(
        &self,
        image_png: Vec<u8>,
        description: &str,
    ) -> Result<AnimationTicket, ServiceError> {
        validate_prompt(description)?;
        if image_png.is_empty() {
            return Err(ServiceError::MissingImage);
        }

        let form = Form::new()
            .part("image", png_part(image_png, "harmonized.png")?)
            .text("text", description.to_string());

        let response = self
            .http_client
            .post(self.url(ANIMATE_PATH))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response, "Animation failed").await);
        }

        let body: SubmitResponse = response.json().await?;
        match body.prediction_id {
            Some(prediction_id) if body.success => {
                log::info!("Animation submitted, prediction id: {}", prediction_id);
                Ok(AnimationTicket {
                    prediction_id,
                    status: body.status.unwrap_or_else(|| "processing".to_string()),
                })
            }
            _ => Err(ServiceError::InvalidResponse(
                body.error.unwrap_or_else(|| "Animation failed".to_string()),
            )),
        }
    }

    async fn poll_animation(&self, prediction_id: &str) -> Result<AnimationStatus, ServiceError> {
        let response = self
            .http_client
            .get(self.url(ANIMATE_PATH))
            .query(&[("id", prediction_id)])
            .send()
            .await?;

        let http_status = response.status();
        let text = response.text().await?;
        let body: Option<PollResponse> = serde_json::from_str(&text).ok();

        if !http_status.is_success() {
            // A failed prediction is reported with an error status and a body.
            return match body {
                Some(PollResponse {
                    status: Some(status),
                    error,
                    ..
                }) if status == "failed" => Ok(AnimationStatus::Failed {
                    error: error.unwrap_or_else(|| "Animation generation failed".to_string()),
                }),
                Some(body) => Err(ServiceError::Api {
                    status: http_status.as_u16(),
                    message: body
                        .error
                        .unwrap_or_else(|| "Failed to check animation status".to_string()),
                }),
                None => Err(ServiceError::Api {
                    status: http_status.as_u16(),
                    message: "Failed to check animation status".to_string(),
                }),
            };
        }

        let body = body.ok_or_else(|| {
            ServiceError::InvalidResponse(format!("Unreadable status response: {}", text))
        })?;
        let status = body.status.unwrap_or_else(|| "processing".to_string());

        Ok(match (status.as_str(), body.video_url) {
            ("completed", Some(video_url)) => AnimationStatus::Completed { video_url },
            ("failed", _) => AnimationStatus::Failed {
                error: body
                    .error
                    .unwrap_or_else(|| "Animation generation failed".to_string()),
            },
            // "completed" without a URL is not usable yet
            _ => AnimationStatus::Running { status },
        })
    }

    async fn generate_image(&self, prompt: &str) -> Result<Base64Image, ServiceError> {
        let prompt = prompt.trim();
        validate_prompt(prompt)?;

        log::info!("Generating image for prompt: {}", prompt);
        let response = self
            .http_client
            .post(self.url(IMAGEGEN_PATH))
            .json(&GenerateRequest { prompt })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response, "Failed to generate image").await);
        }

        let body: GenerateResponse = response.json().await?;
        match body.image {
            Some(image) if body.success => Ok(Base64Image::new(image)),
            _ => Err(ServiceError::InvalidResponse(
                body.error
                    .unwrap_or_else(|| "Failed to generate image".to_string()),
            )),
        }
    }
}

fn png_part(bytes: Vec<u8>, file_name: &'static str) -> Result<Part, ServiceError> {
    Ok(Part::bytes(bytes).file_name(file_name).mime_str("image/png")?)
}

/// Turn a non-success response into `ServiceError::Api`, preferring the
/// proxy's `error` field over `fallback`.
async fn api_error(response: reqwest::Response, fallback: &str) -> ServiceError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody {
            error: Some(error),
            details,
        }) => match details {
            Some(details) => format!("{}: {}", error, details),
            None => error,
        },
        _ => fallback.to_string(),
    };
    log::warn!("Request failed with status {}: {}", status, message);
    ServiceError::Api { status, message }
}

/// Errors that can occur while talking to the generation proxy.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Service URL not configured")]
    MissingBaseUrl,

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{message}")]
    Api {
        /// HTTP status returned by the proxy
        status: u16,
        /// Error text from the response body
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid image payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image is required")]
    MissingImage,

    #[error("Empty prompt")]
    EmptyPrompt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_base_url_trims_trailing_slash() {
        let client = StudioClient::with_base_url("http://proxy.local/".to_string()).unwrap();
        assert_eq!(client.base_url(), "http://proxy.local");
        assert_eq!(client.url(ANIMATE_PATH), "http://proxy.local/api/gen/animate");
    }

    #[test]
    fn test_with_base_url_empty_returns_error() {
        let result = StudioClient::with_base_url("".to_string());
        assert!(matches!(result, Err(ServiceError::MissingBaseUrl)));
    }

    #[test]
    fn test_validate_prompt() {
        assert!(matches!(validate_prompt(""), Err(ServiceError::EmptyPrompt)));
        assert!(matches!(validate_prompt(" \t\n"), Err(ServiceError::EmptyPrompt)));
        assert!(validate_prompt("waves crashing").is_ok());
    }

    #[test]
    fn test_base64_image_data_url() {
        let image = Base64Image::new("AAAA");
        assert_eq!(image.data_url(), "data:image/png;base64,AAAA");
        assert_eq!(image.to_bytes().unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_base64_image_rejects_garbage() {
        let image = Base64Image::new("not base64!");
        assert!(matches!(image.to_bytes(), Err(ServiceError::Decode(_))));
    }

    #[test]
    fn test_api_error_display_is_message() {
        let error = ServiceError::Api {
            status: 500,
            message: "OpenAI processing failed".to_string(),
        };
        assert_eq!(error.to_string(), "OpenAI processing failed");
    }
}
