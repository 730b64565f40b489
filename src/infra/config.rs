// src/infra/config.rs — Runtime settings and model registry

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::cost::Pricing;
use crate::infra::errors::PipelineError;

/// Runtime settings, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub default_n: usize,
    pub default_workers: usize,
    pub temperature: f32,
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            google_api_key: None,
            default_n: 50,
            default_workers: 5,
            temperature: 0.7,
            seed: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            google_api_key: std::env::var("GOOGLE_API_KEY").ok(),
            default_n: std::env::var("DEFAULT_N")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_n),
            default_workers: std::env::var("DEFAULT_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_workers),
            temperature: std::env::var("TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.temperature),
            seed: std::env::var("SEED").ok().and_then(|v| v.parse().ok()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub display_name: String,
    pub pricing: Pricing,
}

/// Model definitions per provider and size class, loaded from
/// `configs/models.yaml` with built-in defaults when the file is absent.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, BTreeMap<String, ModelEntry>>,
}

impl ModelRegistry {
    pub fn load(config_path: &Path) -> Result<Self, PipelineError> {
        if !config_path.exists() {
            return Ok(Self::default_registry());
        }
        let raw = std::fs::read_to_string(config_path)?;
        let models: BTreeMap<String, BTreeMap<String, ModelEntry>> = serde_yml::from_str(&raw)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", config_path.display())))?;
        Ok(Self { models })
    }

    pub fn default_registry() -> Self {
        let mut models: BTreeMap<String, BTreeMap<String, ModelEntry>> = BTreeMap::new();

        let mut openai = BTreeMap::new();
        openai.insert(
            "small".into(),
            ModelEntry {
                id: "gpt-4o-mini".into(),
                display_name: "GPT-4o Mini".into(),
                pricing: Pricing::new(0.15, 0.60),
            },
        );
        openai.insert(
            "large".into(),
            ModelEntry {
                id: "gpt-4o".into(),
                display_name: "GPT-4o".into(),
                pricing: Pricing::new(2.50, 10.00),
            },
        );
        models.insert("openai".into(), openai);

        let mut anthropic = BTreeMap::new();
        anthropic.insert(
            "small".into(),
            ModelEntry {
                id: "claude-3-5-haiku-20241022".into(),
                display_name: "Claude 3.5 Haiku".into(),
                pricing: Pricing::new(1.00, 5.00),
            },
        );
        anthropic.insert(
            "large".into(),
            ModelEntry {
                id: "claude-3-5-sonnet-20241022".into(),
                display_name: "Claude 3.5 Sonnet".into(),
                pricing: Pricing::new(3.00, 15.00),
            },
        );
        models.insert("anthropic".into(), anthropic);

        let mut google = BTreeMap::new();
        google.insert(
            "small".into(),
            ModelEntry {
                id: "gemini-2.0-flash-exp".into(),
                display_name: "Gemini 2.0 Flash".into(),
                pricing: Pricing::new(0.075, 0.30),
            },
        );
        google.insert(
            "large".into(),
            ModelEntry {
                id: "gemini-1.5-pro".into(),
                display_name: "Gemini 1.5 Pro".into(),
                pricing: Pricing::new(1.25, 5.00),
            },
        );
        models.insert("google".into(), google);

        Self { models }
    }

    pub fn get_model(&self, provider: &str, size: &str) -> Option<&ModelEntry> {
        self.models.get(provider).and_then(|m| m.get(size))
    }

    pub fn get_model_id(&self, provider: &str, size: &str) -> Option<&str> {
        self.get_model(provider, size).map(|m| m.id.as_str())
    }

    pub fn get_pricing(&self, provider: &str, size: &str) -> Option<Pricing> {
        self.get_model(provider, size).map(|m| m.pricing.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_registry_covers_all_providers() {
        let registry = ModelRegistry::default_registry();
        for provider in ["openai", "anthropic", "google"] {
            for size in ["small", "large"] {
                assert!(registry.get_model(provider, size).is_some(), "{provider}/{size}");
            }
        }
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let registry = ModelRegistry::load(Path::new("/nonexistent/models.yaml")).unwrap();
        assert_eq!(registry.get_model_id("openai", "small"), Some("gpt-4o-mini"));
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.yaml");
        std::fs::write(
            &path,
            "openai:\n  small:\n    id: test-model\n    display_name: Test\n    pricing:\n      input_per_1m: 0.5\n      output_per_1m: 1.5\n",
        )
        .unwrap();
        let registry = ModelRegistry::load(&path).unwrap();
        assert_eq!(registry.get_model_id("openai", "small"), Some("test-model"));
        let pricing = registry.get_pricing("openai", "small").unwrap();
        assert_eq!(pricing.input_per_1m, 0.5);
        assert_eq!(pricing.output_per_1m, 1.5);
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.yaml");
        std::fs::write(&path, ":: not yaml ::").unwrap();
        let err = ModelRegistry::load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_unknown_provider_is_none() {
        let registry = ModelRegistry::default_registry();
        assert!(registry.get_model("azure", "small").is_none());
    }

    #[test]
    fn test_settings_defaults() {
        let s = Settings::default();
        assert_eq!(s.default_n, 50);
        assert_eq!(s.default_workers, 5);
        assert!(s.seed.is_none());
    }
}
