//! Renderer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits and helper settings for a [`Renderer`](crate::Renderer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Deepest allowed nesting of inlined implementations; the root is depth 1.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Wall-clock budget for one render call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Image of the helper that downloads and captures Type-instances.
    #[serde(default = "default_helper_image")]
    pub helper_image: String,
}

fn default_max_depth() -> usize {
    16
}

fn default_timeout_ms() -> u64 {
    300_000
}

fn default_helper_image() -> String {
    "quasar/type-instance-helper:latest".to_owned()
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            timeout_ms: default_timeout_ms(),
            helper_image: default_helper_image(),
        }
    }
}

impl RenderConfig {
    /// Render timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let cfg = RenderConfig::default();
        assert_eq!(cfg.max_depth, 16);
        assert_eq!(cfg.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: RenderConfig = serde_json::from_str(r#"{ "max_depth": 3 }"#).unwrap();
        assert_eq!(cfg.max_depth, 3);
        assert_eq!(cfg.timeout_ms, 300_000);
        assert_eq!(cfg.helper_image, RenderConfig::default().helper_image);
    }
}
