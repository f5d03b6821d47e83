//! Type-specific job parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::job::JobId;

/// Well-known parameter keys.
pub mod keys {
    pub const OBJECT_PROMPT: &str = "object_prompt";
    pub const STYLE_PROMPT: &str = "style_prompt";
    pub const MODEL_ID: &str = "modelId";
    pub const PRESET_STYLE: &str = "presetStyle";
    pub const IMAGE_PATH: &str = "image_path";
    pub const SYSTEM_PROMPT: &str = "system_prompt";
    pub const PROMPT: &str = "prompt";
    pub const IMAGE_URL: &str = "image_url";
    pub const END_IMAGE_URL: &str = "end_image_url";
    pub const VIDEO_MODEL: &str = "video_model";
    pub const NEGATIVE_PROMPT: &str = "negative_prompt";
    pub const KLING_DURATION: &str = "kling_duration";
    pub const KLING_MODE: &str = "kling_mode";
    pub const SEEDANCE_DURATION: &str = "seedance_duration";
    pub const SEEDANCE_RESOLUTION: &str = "seedance_resolution";
    pub const SEEDANCE_ASPECT_RATIO: &str = "seedance_aspect_ratio";
    pub const SEAMLESS_LOOP: &str = "seamless_loop";
    pub const VIDEO_A_PATH: &str = "video_a_path";
    pub const VIDEO_B_PATH: &str = "video_b_path";
    pub const BACKGROUND: &str = "background";
    pub const BOOMERANG_AUTOMATION: &str = "boomerang_automation";
    pub const ANALYSIS_JOB_IDS: &str = "analysis_job_ids";
    pub const MERGE_TARGET: &str = "merge_target";
}

/// Free-form JSON object carried by every job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct InputParams(pub Map<String, Value>);

impl InputParams {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// String value, treating blank strings as absent.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.str(key).unwrap_or(default)
    }

    pub fn bool(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "1" | "on"),
            Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
            _ => false,
        }
    }

    /// Integer value; numeric strings are accepted since form input arrives as text.
    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Upstream analysis jobs this job is gated on, in the stored order.
    pub fn analysis_job_ids(&self) -> Vec<JobId> {
        self.0
            .get(keys::ANALYSIS_JOB_IDS)
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| match v {
                        Value::Number(n) => n.as_i64(),
                        Value::String(s) => s.trim().parse().ok(),
                        _ => None,
                    })
                    .map(JobId)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Field the merged analysis text is folded into.
    pub fn merge_target(&self) -> &str {
        self.str_or(keys::MERGE_TARGET, keys::STYLE_PROMPT)
    }

    pub fn to_json_string(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

impl From<Map<String, Value>> for InputParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> InputParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_blank_strings_are_absent() {
        let p = params(json!({"negative_prompt": "   ", "prompt": "spin"}));
        assert_eq!(p.str(keys::NEGATIVE_PROMPT), None);
        assert_eq!(p.str(keys::PROMPT), Some("spin"));
    }

    #[test]
    fn test_form_style_values() {
        let p = params(json!({"seamless_loop": "true", "kling_duration": "10"}));
        assert!(p.bool(keys::SEAMLESS_LOOP));
        assert_eq!(p.u64(keys::KLING_DURATION), Some(10));
    }

    #[test]
    fn test_analysis_ids_and_merge_target() {
        let p = params(json!({"analysis_job_ids": [7, "3"]}));
        assert_eq!(p.analysis_job_ids(), vec![JobId(7), JobId(3)]);
        assert_eq!(p.merge_target(), keys::STYLE_PROMPT);

        let p = p.with(keys::MERGE_TARGET, "object_prompt");
        assert_eq!(p.merge_target(), "object_prompt");
    }
}
