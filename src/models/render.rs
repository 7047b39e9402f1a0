//! Render configuration handed to the renderer and exported as JSON

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::aoi::AoiShape;
use crate::MapError;

/// Layers that get a legend entry, in legend order
pub const LEGEND_FEATURES: [&str; 5] = ["building", "water", "green", "park", "highway"];

/// Visual settings for one map poster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Name of the draw-settings preset
    pub style: String,
    /// Background colour as `#rrggbb`
    pub bg_color: String,
    pub shape: AoiShape,
    /// Border width, 0-10
    pub contour_width: u32,
    /// Title font size, 8-40
    pub font_size: u32,
    pub title: String,
    pub show_legend: bool,
    pub show_feature_names: bool,
    pub show_copyright: bool,
    /// Legend label per feature class
    pub legend_labels: BTreeMap<String, String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            style: "Peach".to_string(),
            bg_color: "#ffffff".to_string(),
            shape: AoiShape::Circle,
            contour_width: 2,
            font_size: 16,
            title: "My Custom Map".to_string(),
            show_legend: true,
            show_feature_names: false,
            show_copyright: false,
            legend_labels: default_legend_labels(),
        }
    }
}

/// "building" -> "Building", ...
fn default_legend_labels() -> BTreeMap<String, String> {
    LEGEND_FEATURES
        .iter()
        .map(|feature| {
            let mut chars = feature.chars();
            let title = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            };
            (feature.to_string(), title)
        })
        .collect()
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), MapError> {
        if self.contour_width > 10 {
            return Err(MapError::validation("Border width must be between 0 and 10"));
        }
        if !(8..=40).contains(&self.font_size) {
            return Err(MapError::validation("Title size must be between 8 and 40"));
        }
        let hex = self.bg_color.strip_prefix('#').unwrap_or("");
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MapError::validation(format!(
                "Background colour must look like #rrggbb, got: {}",
                self.bg_color
            )));
        }
        Ok(())
    }

    /// Legend label for a feature class, falling back to its title-cased name
    #[must_use]
    pub fn legend_label(&self, feature: &str) -> String {
        self.legend_labels
            .get(feature)
            .cloned()
            .or_else(|| default_legend_labels().get(feature).cloned())
            .unwrap_or_else(|| feature.to_string())
    }
}
