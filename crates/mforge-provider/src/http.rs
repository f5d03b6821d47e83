//! HTTP generation gateway client.
//!
//! One multipart POST per generation: a `request` JSON part plus one file
//! part per attached image. The gateway blocks until the model finishes and
//! answers with either output URIs or text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::GenerationProvider;
use crate::request::{Artifact, Capability, GenerationRequest, ResponseFormat};

/// Configuration for the gateway client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_token: String,
    /// Video models can take minutes
    pub request_timeout: Duration,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            request_timeout: Duration::from_secs(600),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        let base_url = std::env::var("MFORGE_PROVIDER_URL")
            .map_err(|_| ProviderError::config_error("MFORGE_PROVIDER_URL not set"))?;
        let api_token = std::env::var("MFORGE_PROVIDER_TOKEN")
            .map_err(|_| ProviderError::config_error("MFORGE_PROVIDER_TOKEN not set"))?;
        let timeout_secs = std::env::var("MFORGE_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(600);

        Ok(Self {
            request_timeout: Duration::from_secs(timeout_secs),
            ..Self::new(base_url, api_token)
        })
    }
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    capability: Capability,
    model: &'a str,
    input: &'a Map<String, Value>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    output: Option<OutputField>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OutputField {
    One(String),
    Many(Vec<String>),
}

impl OutputField {
    fn first(self) -> Option<String> {
        match self {
            OutputField::One(s) => Some(s),
            OutputField::Many(v) => v.into_iter().next(),
        }
        .filter(|s| !s.trim().is_empty())
    }
}

fn parse_artifact(request: &GenerationRequest, response: GatewayResponse) -> ProviderResult<Artifact> {
    if let Some(error) = response.error.filter(|e| !e.is_empty()) {
        return Err(ProviderError::request_failed(error));
    }

    if request.capability.returns_text() {
        return response
            .text
            .or_else(|| response.output.and_then(OutputField::first))
            .map(Artifact::Text)
            .ok_or_else(|| {
                ProviderError::empty_output(format!("{} returned no text", request.model))
            });
    }

    response
        .output
        .and_then(OutputField::first)
        .map(Artifact::Uri)
        .ok_or_else(|| {
            ProviderError::empty_output(format!("{} did not return an output URL", request.model))
        })
}

/// Generation provider backed by an HTTP gateway.
pub struct HttpGenerationProvider {
    config: ProviderConfig,
    client: Client,
}

impl HttpGenerationProvider {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Self::new(ProviderConfig::from_env()?)
    }

    fn build_form(request: &GenerationRequest) -> ProviderResult<Form> {
        let body = GatewayRequest {
            capability: request.capability,
            model: &request.model,
            input: &request.input,
            response_format: request.response_format,
        };
        let mut form = Form::new().text("request", serde_json::to_string(&body)?);

        for image in &request.images {
            let part = Part::bytes(image.bytes.clone())
                .file_name(image.filename.clone())
                .mime_str("application/octet-stream")?;
            form = form.part(image.field.clone(), part);
        }
        Ok(form)
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate(&self, request: GenerationRequest) -> ProviderResult<Artifact> {
        info!(
            capability = %request.capability,
            model = %request.model,
            "Calling generation provider with parameters: {}",
            serde_json::Value::Object(request.loggable())
        );

        let url = format!("{}/v1/generate", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .multipart(Self::build_form(&request)?)
            .send()
            .await
            .map_err(|e| ProviderError::request_failed(format!("{} request failed: {}", request.model, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!(model = %request.model, "Provider returned {}", status);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let body: GatewayResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let artifact = parse_artifact(&request, body)?;
        debug!(model = %request.model, "Generation finished: {:?}", artifact);
        Ok(artifact)
    }

    async fn fetch_artifact(&self, uri: &str) -> ProviderResult<Vec<u8>> {
        debug!("Downloading artifact {}", uri);
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| ProviderError::download_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::download_failed(format!(
                "{} returned {}",
                uri,
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> HttpGenerationProvider {
        HttpGenerationProvider::new(ProviderConfig::new(server.uri(), "secret-token")).unwrap()
    }

    #[tokio::test]
    async fn test_image_request_returns_first_uri() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(header("authorization", "Bearer secret-token"))
            .and(body_string_contains("\"model\":\"bytedance/seedream-4\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": ["https://cdn.test/a.png", "https://cdn.test/b.png"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let req = GenerationRequest::new(Capability::TextToImage, "bytedance/seedream-4")
            .with_input("prompt", "a red cube");
        let artifact = provider(&server).generate(req).await.unwrap();
        assert_eq!(artifact, Artifact::Uri("https://cdn.test/a.png".into()));
    }

    #[tokio::test]
    async fn test_image_parts_are_uploaded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(body_string_contains("name=\"image\""))
            .and(body_string_contains("filename=\"in.png\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": "https://cdn.test/clean.png"
            })))
            .mount(&server)
            .await;

        let req = GenerationRequest::new(Capability::BackgroundRemoval, "bria/remove-background")
            .with_image("image", "in.png", b"PNGDATA".to_vec());
        let artifact = provider(&server).generate(req).await.unwrap();
        assert_eq!(artifact, Artifact::Uri("https://cdn.test/clean.png".into()));
    }

    #[tokio::test]
    async fn test_vision_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(body_string_contains("\"response_format\":\"json_object\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "{\"style\": \"watercolor\"}"
            })))
            .mount(&server)
            .await;

        let req = GenerationRequest::new(Capability::VisionAnalysis, "gpt-4-turbo")
            .with_response_format(ResponseFormat::JsonObject);
        let artifact = provider(&server).generate(req).await.unwrap();
        assert_eq!(artifact, Artifact::Text("{\"style\": \"watercolor\"}".into()));
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad prompt"))
            .mount(&server)
            .await;

        let req = GenerationRequest::new(Capability::TextToImage, "m");
        match provider(&server).generate(req).await {
            Err(ProviderError::Api { status, message }) => {
                assert_eq!(status, 422);
                assert_eq!(message, "bad prompt");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_output_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": [] })))
            .mount(&server)
            .await;

        let req = GenerationRequest::new(Capability::ImageToVideo, "kwaivgi/kling-v2.1");
        let err = provider(&server).generate(req).await.unwrap_err();
        assert_eq!(err.to_string(), "kwaivgi/kling-v2.1 did not return an output URL");
    }

    #[tokio::test]
    async fn test_gateway_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "NSFW" })))
            .mount(&server)
            .await;

        let req = GenerationRequest::new(Capability::TextToImage, "m");
        let err = provider(&server).generate(req).await.unwrap_err();
        assert!(matches!(err, ProviderError::RequestFailed(ref m) if m == "NSFW"));
    }

    #[tokio::test]
    async fn test_fetch_artifact() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/out.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let p = provider(&server);
        let bytes = p
            .fetch_artifact(&format!("{}/files/out.mp4", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert!(p
            .fetch_artifact(&format!("{}/files/missing.mp4", server.uri()))
            .await
            .is_err());
    }
}
