use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_api_version() -> u32 {
    2
}

/// Structured response from the change-detection service.
///
/// The geometric fields describe the displacement the service found
/// between the test image and the sensor's reference image. The image
/// size is echoed back by us, not the service, so downstream consumers
/// can interpret the pixel-space values. `match_image_id` is set only
/// when the service returned embedded match evidence that had to be
/// persisted as its own image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonOutcome {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub size_x: Option<f64>,
    #[serde(default)]
    pub size_y: Option<f64>,
    #[serde(default)]
    pub rotation: Option<f64>,
    #[serde(default)]
    pub shear: Option<f64>,
    #[serde(default)]
    pub ping: Option<bool>,
    #[serde(default = "default_api_version")]
    pub api_version: u32,
    #[serde(default)]
    pub match_image_id: Option<Uuid>,
    #[serde(default)]
    pub image_width: Option<u32>,
    #[serde(default)]
    pub image_height: Option<u32>,
    /// Base64 match evidence as returned by the service.
    #[serde(default)]
    pub matches: Option<String>,
}

impl Default for ComparisonOutcome {
    fn default() -> Self {
        Self {
            x: None,
            y: None,
            size_x: None,
            size_y: None,
            rotation: None,
            shear: None,
            ping: None,
            api_version: default_api_version(),
            match_image_id: None,
            image_width: None,
            image_height: None,
            matches: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_sparse_service_response() {
        let outcome: ComparisonOutcome =
            serde_json::from_str(r#"{"x": 12.5, "y": -3.0, "rotation": 0.1}"#).unwrap();
        assert_eq!(outcome.x, Some(12.5));
        assert_eq!(outcome.api_version, 2);
        assert!(outcome.match_image_id.is_none());
        assert!(outcome.matches.is_none());
    }

    #[test]
    fn default_carries_api_version() {
        assert_eq!(ComparisonOutcome::default().api_version, 2);
    }
}
