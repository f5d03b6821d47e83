//! Palette analysis results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One named colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PaletteColor {
    pub hex: String,
    pub name: String,
}

/// Structured output of a palette analysis: `{"palette": [{hex, name}, ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PaletteResult {
    pub palette: Vec<PaletteColor>,
}

impl PaletteResult {
    /// Parse the analysis text, returning `None` when it is not a palette document.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str::<PaletteResult>(text.trim())
            .ok()
            .filter(|p| !p.palette.is_empty())
    }

    /// Render as `"name (hex)"` pairs joined by commas.
    pub fn render(&self) -> String {
        self.palette
            .iter()
            .map(|c| format!("{} ({})", c.name, c.hex))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Render an analysis result for merging into another job's prompt.
///
/// Palette documents become a colour list; anything else is used verbatim.
pub fn render_analysis_text(text: &str) -> String {
    match PaletteResult::parse(text) {
        Some(palette) => palette.render(),
        None => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_palette() {
        let text = r##"{"palette": [{"hex": "#2F4F4F", "name": "dark slate grey"}, {"hex": "#F08080", "name": "light coral"}]}"##;
        assert_eq!(
            render_analysis_text(text),
            "dark slate grey (#2F4F4F), light coral (#F08080)"
        );
    }

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(
            render_analysis_text("  Flat vector art, bold outlines.\n"),
            "Flat vector art, bold outlines."
        );
    }

    #[test]
    fn test_empty_palette_is_not_a_palette() {
        assert!(PaletteResult::parse(r#"{"palette": []}"#).is_none());
    }
}
