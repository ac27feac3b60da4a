//! User settings consumed by the orchestrator.

use crate::ModelRole;
use serde::{Deserialize, Serialize};

/// Snapshot of the user's model preferences.
///
/// Persisting and editing these is the UI layer's job; the core only reads them.
///
/// # Examples
///
/// ```
/// use deepdraft_core::{ModelRole, Settings};
///
/// let settings: Settings = serde_json::from_str(
///     r#"{"thinkingModel": "gemini-2.5-pro", "language": "de"}"#,
/// ).unwrap();
///
/// assert_eq!(settings.model_for(ModelRole::Thinking), "gemini-2.5-pro");
/// assert_eq!(settings.model_for(ModelRole::Networking), "gemini-2.5-flash");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Model used for drafting and reasoning
    #[serde(default = "default_thinking_model")]
    pub thinking_model: String,
    /// Model used for search-grounded research
    #[serde(default = "default_networking_model")]
    pub networking_model: String,
    /// Output language code
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_thinking_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_networking_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thinking_model: default_thinking_model(),
            networking_model: default_networking_model(),
            language: default_language(),
        }
    }
}

impl Settings {
    /// Preferred model for a role.
    pub fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Thinking => &self.thinking_model,
            ModelRole::Networking => &self.networking_model,
        }
    }
}
