use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{CredentialSource, CrewSearchError, DelegationMode, SecretValue, require_env};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "CREWSEARCH_CONFIG";
const MODEL_OVERRIDE_ENV: &str = "CREWSEARCH_MODEL";
const BASE_URL_OVERRIDE_ENV: &str = "CREWSEARCH_MODEL_BASE_URL";

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the model API key, if one is configured. Local runtimes such as
    /// Ollama run without one.
    pub fn model_api_key(&self) -> Result<Option<SecretValue>, CrewSearchError> {
        match self.model.api_key_env.as_deref() {
            Some(var) if !var.trim().is_empty() => require_env(var).map(Some),
            _ => Ok(None),
        }
    }

    /// Search credential looked up lazily from the configured variable.
    pub fn search_credential(&self) -> CredentialSource {
        CredentialSource::env(self.search.api_key_env.clone())
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `CREWSEARCH_CONFIG` environment variable.
    /// 3. `config.toml` in the current working directory.
    /// 4. Built-in defaults when none of the above exists.
    pub fn load(path: Option<PathBuf>) -> Result<Config, CrewSearchError> {
        let mut config = match resolve_path(path) {
            Some(candidate) => {
                let raw = fs::read_to_string(&candidate)
                    .map_err(|err| CrewSearchError::config_io(candidate.clone(), err))?;
                Self::parse(&raw)?
            }
            None => Config::default(),
        };

        apply_env_overrides(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Config, CrewSearchError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| CrewSearchError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), CrewSearchError> {
        if config.model.base_url.trim().is_empty() {
            return Err(CrewSearchError::InvalidConfiguration(
                "model.base_url must not be empty".into(),
            ));
        }
        if config.model.model.trim().is_empty() {
            return Err(CrewSearchError::InvalidConfiguration(
                "model.model must name a model".into(),
            ));
        }
        if !(0.0..=2.0).contains(&config.model.temperature) {
            return Err(CrewSearchError::InvalidConfiguration(format!(
                "model.temperature must be within 0.0..=2.0, got {}",
                config.model.temperature
            )));
        }
        if config.search.api_key_env.trim().is_empty() {
            return Err(CrewSearchError::InvalidConfiguration(
                "search.api_key_env must reference an environment variable".into(),
            ));
        }
        if config.pipeline.max_iterations == 0 {
            return Err(CrewSearchError::InvalidConfiguration(
                "pipeline.max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(path);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return Some(PathBuf::from(from_env));
        }
    }

    let default = Path::new(DEFAULT_CONFIG_PATH);
    default.exists().then(|| default.to_path_buf())
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(model) = env::var(MODEL_OVERRIDE_ENV) {
        if !model.trim().is_empty() {
            config.model.model = model;
        }
    }
    if let Ok(base_url) = env::var(BASE_URL_OVERRIDE_ENV) {
        if !base_url.trim().is_empty() {
            config.model.base_url = base_url;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key_env: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434/v1".to_string(),
            model: "deepseek-r1:7b".to_string(),
            api_key_env: None,
            temperature: 0.7,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key_env: String,
    pub depth: String,
    pub output_type: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.linkup.so/v1/search".to_string(),
            api_key_env: "API_KEY".to_string(),
            depth: "standard".to_string(),
            output_type: "searchResults".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub delegation: DelegationMode,
    pub max_delegations: u32,
    pub max_iterations: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delegation: DelegationMode::Enforced,
            max_delegations: 3,
            max_iterations: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_target_local_ollama_and_linkup() {
        let config = ConfigLoader::parse("").expect("empty config is valid");
        assert_eq!(config.model.provider, "ollama");
        assert_eq!(config.model.model, "deepseek-r1:7b");
        assert_eq!(config.search.api_key_env, "API_KEY");
        assert_eq!(config.search.depth, "standard");
        assert_eq!(config.search.output_type, "searchResults");
        assert_eq!(config.pipeline.delegation, DelegationMode::Enforced);
        assert!(config.model_api_key().unwrap().is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = ConfigLoader::parse(
            r#"
            [model]
            model = "llama3.1:8b"

            [pipeline]
            delegation = "advisory"
            max_delegations = 1
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.model.model, "llama3.1:8b");
        assert_eq!(config.model.base_url, "http://localhost:11434/v1");
        assert_eq!(config.pipeline.delegation, DelegationMode::Advisory);
        assert_eq!(config.pipeline.max_delegations, 1);
        assert_eq!(config.pipeline.max_iterations, 8);
    }

    #[test]
    fn rejects_zero_iterations() {
        let err = ConfigLoader::parse("[pipeline]\nmax_iterations = 0\n").unwrap_err();
        assert!(matches!(err, CrewSearchError::InvalidConfiguration(_)));
    }

    #[test]
    fn rejects_blank_search_key_variable() {
        let err = ConfigLoader::parse("[search]\napi_key_env = \" \"\n").unwrap_err();
        assert!(err.to_string().contains("search.api_key_env"));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[search]\nendpoint = \"http://127.0.0.1:9/search\"").unwrap();

        let config = ConfigLoader::load(Some(file.path().to_path_buf())).expect("config loads");
        assert_eq!(config.search.endpoint, "http://127.0.0.1:9/search");
    }

    #[test]
    fn missing_explicit_path_is_an_io_error() {
        let err = ConfigLoader::load(Some(PathBuf::from("/nonexistent/crewsearch.toml")))
            .unwrap_err();
        assert!(matches!(err, CrewSearchError::ConfigIo { .. }));
    }
}
