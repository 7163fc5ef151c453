//! Configuration: provider credentials (code > env > `.env`) and engine
//! settings (TOML file + env overrides).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PilotError;
use crate::models::ModelSpec;
use crate::types::GenerationSettings;

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<PilotConfig> = OnceLock::new();

/// Provider credentials and endpoint overrides.
///
/// Keys are provider config keys (`anthropic`, `openai`, `google`).
#[derive(Clone, Default)]
pub struct PilotConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
}

impl fmt::Debug for PilotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<String> = self
            .api_keys
            .read()
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("PilotConfig")
            .field("api_keys", &providers)
            .field("base_urls", &self.base_urls)
            .finish()
    }
}

impl PilotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables (ANTHROPIC_API_KEY, OPENAI_API_KEY, ...),
    /// reading a `.env` file first when one is present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let config = Self::new();

        let env_mappings = [
            ("ANTHROPIC_API_KEY", "anthropic"),
            ("OPENAI_API_KEY", "openai"),
            ("GOOGLE_API_KEY", "google"),
            ("GEMINI_API_KEY", "google"),
        ];
        for (env_var, provider) in &env_mappings {
            if let Some(key) = lookup(env_var).filter(|k| !k.is_empty()) {
                config.set_api_key(provider, key);
            }
        }

        let url_mappings = [
            ("ANTHROPIC_BASE_URL", "anthropic"),
            ("OPENAI_BASE_URL", "openai"),
            ("GEMINI_BASE_URL", "google"),
        ];
        for (env_var, provider) in &url_mappings {
            if let Some(url) = lookup(env_var).filter(|u| !u.is_empty()) {
                config.set_base_url(provider, url);
            }
        }

        config
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static PilotConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    pub fn set_api_key(&self, provider: &str, key: String) {
        self.api_keys
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(provider.to_string(), key);
    }

    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys.read().ok()?.get(provider).cloned()
    }

    pub fn set_base_url(&self, provider: &str, url: String) {
        self.base_urls
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(provider.to_string(), url);
    }

    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls.read().ok()?.get(provider).cloned()
    }

    pub fn has_credentials(&self, provider: &str) -> bool {
        self.get_api_key(provider).is_some()
    }
}

/// Engine behaviour knobs, loadable from `settings.toml`.
///
/// ```toml
/// model = "anthropic:claude-sonnet-4-5"
/// system_prompt = "You operate the host application."
/// max_tool_rounds = 25
/// tool_timeout_secs = 30
///
/// [generation]
/// max_tokens = 4096
/// temperature = 0.2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// `provider:model` string.
    pub model: String,
    pub system_prompt: Option<String>,
    pub max_tool_rounds: usize,
    pub tool_timeout_secs: u64,
    pub generation: GenerationSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            model: ModelSpec::default().to_string(),
            system_prompt: None,
            max_tool_rounds: crate::agent_loop::DEFAULT_MAX_TOOL_ROUNDS,
            tool_timeout_secs: crate::bridge::DEFAULT_TOOL_TIMEOUT.as_secs(),
            generation: GenerationSettings::default(),
        }
    }
}

impl EngineSettings {
    /// `<config dir>/hostpilot/settings.toml`, when a home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "hostpilot", "hostpilot")
            .map(|dirs| dirs.config_dir().join("settings.toml"))
    }

    /// Parse a TOML settings file.
    pub fn load(path: &Path) -> Result<Self, PilotError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw).map_err(|err| match err {
            PilotError::Configuration(msg) => {
                PilotError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, PilotError> {
        let settings: Self =
            toml::from_str(raw).map_err(|err| PilotError::Configuration(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `path` (or the default path) if it exists, else defaults; then
    /// apply `HOSTPILOT_*` environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self, PilotError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut settings = match path {
            Some(ref p) if p.exists() => {
                debug!(path = %p.display(), "loading engine settings");
                Self::load(p)?
            }
            _ => Self::default(),
        };
        settings.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    /// Apply `HOSTPILOT_MODEL`, `HOSTPILOT_MAX_TOOL_ROUNDS` and
    /// `HOSTPILOT_TOOL_TIMEOUT_SECS` from `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), PilotError> {
        if let Some(model) = lookup("HOSTPILOT_MODEL").filter(|m| !m.is_empty()) {
            self.model = model;
        }
        if let Some(raw) = lookup("HOSTPILOT_MAX_TOOL_ROUNDS") {
            self.max_tool_rounds = parse_env("HOSTPILOT_MAX_TOOL_ROUNDS", &raw)?;
        }
        if let Some(raw) = lookup("HOSTPILOT_TOOL_TIMEOUT_SECS") {
            self.tool_timeout_secs = parse_env("HOSTPILOT_TOOL_TIMEOUT_SECS", &raw)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), PilotError> {
        if self.max_tool_rounds == 0 {
            return Err(PilotError::Configuration(
                "max_tool_rounds must be at least 1".to_string(),
            ));
        }
        if self.tool_timeout_secs == 0 {
            return Err(PilotError::Configuration(
                "tool_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.model_spec().map(|_| ())
    }

    pub fn model_spec(&self) -> Result<ModelSpec, PilotError> {
        self.model.parse()
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, PilotError> {
    raw.trim()
        .parse()
        .map_err(|_| PilotError::Configuration(format!("{name} has invalid value '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn credentials_from_lookup() {
        let config = PilotConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("GEMINI_API_KEY", "g-key"),
            ("OPENAI_API_KEY", ""),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1"),
        ]));
        assert_eq!(config.get_api_key("anthropic").as_deref(), Some("sk-ant"));
        assert_eq!(config.get_api_key("google").as_deref(), Some("g-key"));
        assert!(!config.has_credentials("openai"));
        assert_eq!(
            config.get_base_url("openai").as_deref(),
            Some("http://localhost:8080/v1")
        );
    }

    #[test]
    fn debug_hides_key_values() {
        let config = PilotConfig::new();
        config.set_api_key("anthropic", "sk-secret".into());
        let rendered = format!("{config:?}");
        assert!(rendered.contains("anthropic"));
        assert!(!rendered.contains("sk-secret"));
    }

    #[test]
    fn settings_file_with_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            r#"
model = "openai:gpt-4o"
system_prompt = "Operate the host."
max_tool_rounds = 8

[generation]
max_tokens = 1024
"#,
        )
        .unwrap();

        let mut settings = EngineSettings::load(&path).unwrap();
        assert_eq!(settings.max_tool_rounds, 8);
        assert_eq!(settings.tool_timeout_secs, 30);
        assert_eq!(settings.generation.max_tokens, Some(1024));
        assert_eq!(settings.system_prompt.as_deref(), Some("Operate the host."));

        settings
            .apply_overrides(lookup(&[
                ("HOSTPILOT_MODEL", "google:gemini-2.5-pro"),
                ("HOSTPILOT_TOOL_TIMEOUT_SECS", "5"),
            ]))
            .unwrap();
        let spec = settings.model_spec().unwrap();
        assert_eq!(spec.provider, ProviderKind::Google);
        assert_eq!(settings.tool_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let err = EngineSettings::from_toml("max_tool_rounds = 0").unwrap_err();
        assert!(matches!(err, PilotError::Configuration(_)));

        let err = EngineSettings::from_toml("model = \"acme:thing\"").unwrap_err();
        assert!(matches!(err, PilotError::ModelNotFound(_)));

        let mut settings = EngineSettings::default();
        let err = settings
            .apply_overrides(lookup(&[("HOSTPILOT_MAX_TOOL_ROUNDS", "many")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: HOSTPILOT_MAX_TOOL_ROUNDS has invalid value 'many'"
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EngineSettings::load(&dir.path().join("absent.toml"));
        assert!(matches!(settings, Err(PilotError::Io(_))));
        assert_eq!(EngineSettings::default().max_tool_rounds, 25);
    }
}
