//! Request and artifact types exchanged with a generation provider.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What kind of generation is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TextToImage,
    BackgroundRemoval,
    VisionAnalysis,
    ImageToVideo,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::TextToImage => "text_to_image",
            Capability::BackgroundRemoval => "background_removal",
            Capability::VisionAnalysis => "vision_analysis",
            Capability::ImageToVideo => "image_to_video",
        }
    }

    /// Vision analysis answers with text; everything else with a URI.
    pub fn returns_text(&self) -> bool {
        matches!(self, Capability::VisionAnalysis)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format for text answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    JsonObject,
}

/// An image attached to a request under a named input field.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub field: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageInput")
            .field("field", &self.field)
            .field("filename", &self.filename)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// One call to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub capability: Capability,
    pub model: String,
    /// Model-specific scalar inputs
    pub input: Map<String, Value>,
    pub images: Vec<ImageInput>,
    pub response_format: ResponseFormat,
}

impl GenerationRequest {
    pub fn new(capability: Capability, model: impl Into<String>) -> Self {
        Self {
            capability,
            model: model.into(),
            input: Map::new(),
            images: Vec::new(),
            response_format: ResponseFormat::default(),
        }
    }

    pub fn with_input(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.input.insert(key.to_string(), value.into());
        self
    }

    pub fn with_image(mut self, field: &str, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.images.retain(|img| img.field != field);
        self.images.push(ImageInput {
            field: field.to_string(),
            filename: filename.into(),
            bytes,
        });
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(Value::as_str)
    }

    pub fn has_image(&self, field: &str) -> bool {
        self.images.iter().any(|img| img.field == field)
    }

    /// Inputs for logging: scalar inputs plus `{field}_provided` markers.
    pub fn loggable(&self) -> Map<String, Value> {
        let mut out = self.input.clone();
        for img in &self.images {
            out.insert(format!("{}_provided", img.field), Value::Bool(true));
        }
        out
    }
}

/// What a successful generation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Remote location of binary output
    Uri(String),
    /// Inline text output
    Text(String),
}
