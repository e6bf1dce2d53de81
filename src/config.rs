//! Shield configuration
//!
//! Policy knobs for the sanitization pipeline. Defaults reproduce the
//! strict behaviour: only JPEG is cleaned, everything else becomes the
//! placeholder, and the stripper is never timed out.

use crate::error::{MetaSafeError, Result};
use crate::types::mime_essence;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default placeholder file name
pub const PLACEHOLDER_NAME: &str = "sanitized.txt";

/// Default placeholder MIME type
pub const PLACEHOLDER_TYPE: &str = "text/plain";

/// Default placeholder content
pub const PLACEHOLDER_MESSAGE: &str = "This file was blocked by MetaSafe because its type is not yet supported for metadata cleaning.";

/// Configuration for the metasafe shield
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldConfig {
    /// MIME types handed to the metadata stripper; everything else is blocked
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,

    /// Name of the placeholder that replaces blocked files
    #[serde(default = "default_placeholder_name")]
    pub placeholder_name: String,

    /// MIME type of the placeholder
    #[serde(default = "default_placeholder_type")]
    pub placeholder_type: String,

    /// Text content of the placeholder
    #[serde(default = "default_placeholder_message")]
    pub placeholder_message: String,

    /// Upper bound for a single strip call in milliseconds
    ///
    /// `None` waits indefinitely. An expired strip blocks the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_timeout_ms: Option<u64>,
}

fn default_allowed_types() -> Vec<String> {
    vec!["image/jpeg".to_string(), "image/jpg".to_string()]
}

fn default_placeholder_name() -> String {
    PLACEHOLDER_NAME.to_string()
}

fn default_placeholder_type() -> String {
    PLACEHOLDER_TYPE.to_string()
}

fn default_placeholder_message() -> String {
    PLACEHOLDER_MESSAGE.to_string()
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            allowed_types: default_allowed_types(),
            placeholder_name: default_placeholder_name(),
            placeholder_type: default_placeholder_type(),
            placeholder_message: default_placeholder_message(),
            strip_timeout_ms: None,
        }
    }
}

impl ShieldConfig {
    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.placeholder_name.trim().is_empty() {
            return Err(MetaSafeError::Config(
                "Placeholder name cannot be empty".to_string(),
            ));
        }
        if self.placeholder_name.contains('/') || self.placeholder_name.contains('\\') {
            return Err(MetaSafeError::Config(format!(
                "Placeholder name must not contain path separators: {}",
                self.placeholder_name
            )));
        }
        if self.strip_timeout_ms == Some(0) {
            return Err(MetaSafeError::Config(
                "Strip timeout must be > 0 ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a MIME type is handed to the stripper
    pub fn is_allowed(&self, mime_type: &str) -> bool {
        let essence = mime_essence(mime_type);
        !essence.is_empty()
            && self
                .allowed_types
                .iter()
                .any(|allowed| mime_essence(allowed) == essence)
    }

    /// Strip timeout as a `Duration`
    pub fn strip_timeout(&self) -> Option<Duration> {
        self.strip_timeout_ms.map(Duration::from_millis)
    }
}
