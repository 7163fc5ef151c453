//! Provider identifiers and `provider:model` selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::PilotError;

/// Supported model vendors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    #[strum(to_string = "anthropic", serialize = "claude")]
    Anthropic,
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
    #[strum(to_string = "google", serialize = "gemini")]
    Google,
}

impl ProviderKind {
    /// Key used for API key and base URL lookups in [`PilotConfig`](crate::config::PilotConfig).
    pub const fn config_key(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
        }
    }

    /// Environment variable holding this provider's API key.
    pub const fn api_key_env(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Google => "GEMINI_API_KEY",
        }
    }

    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-5",
            Self::OpenAi => "gpt-4o",
            Self::Google => "gemini-2.5-flash",
        }
    }

    /// Guess the vendor from a bare model id.
    pub fn infer(model_id: &str) -> Option<Self> {
        let id = model_id.to_ascii_lowercase();
        if id.starts_with("claude") {
            Some(Self::Anthropic)
        } else if id.starts_with("gpt") || id.starts_with("o1") || id.starts_with("o3") || id.starts_with("o4") {
            Some(Self::OpenAi)
        } else if id.starts_with("gemini") {
            Some(Self::Google)
        } else {
            None
        }
    }
}

/// A concrete model: vendor plus the vendor's model id.
///
/// Parses from `provider:model` (e.g. `anthropic:claude-sonnet-4-5`), a bare
/// provider name (uses its default model) or a bare model id whose vendor
/// can be inferred.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model_id: String,
}

impl ModelSpec {
    pub fn new(provider: ProviderKind, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::new(
            ProviderKind::Anthropic,
            ProviderKind::Anthropic.default_model(),
        )
    }
}

impl FromStr for ModelSpec {
    type Err = PilotError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PilotError::ModelNotFound("empty model string".to_string()));
        }

        if let Some((provider, model)) = raw.split_once(':') {
            let provider = ProviderKind::from_str(provider.trim())
                .map_err(|_| PilotError::ModelNotFound(format!("unknown provider '{provider}'")))?;
            let model = model.trim();
            if model.is_empty() {
                return Ok(Self::new(provider, provider.default_model()));
            }
            return Ok(Self::new(provider, model));
        }

        if let Ok(provider) = ProviderKind::from_str(raw) {
            return Ok(Self::new(provider, provider.default_model()));
        }

        ProviderKind::infer(raw)
            .map(|provider| Self::new(provider, raw))
            .ok_or_else(|| {
                PilotError::ModelNotFound(format!(
                    "cannot infer provider for '{raw}'; use provider:model"
                ))
            })
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model_id)
    }
}
