//! Configuração carregada a partir de `sora.toml`.
//!
//! A struct [`SoraConfig`] contém os defaults de lote e de polling.
//! Valores ausentes no arquivo usam defaults sensíveis. As variáveis de
//! ambiente `OPENAI_API_KEY` e `OPENAI_BASE_URL` têm precedência sobre o
//! arquivo; flags da CLI têm precedência sobre ambos.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILE: &str = "sora.toml";

/// Configuração de nível superior carregada de `sora.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SoraConfig {
    /// Chave da API OpenAI.
    #[serde(default)]
    pub api_key: String,

    /// URL base alternativa (proxy, servidor de testes).
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_size")]
    pub size: String,

    /// Duração do vídeo em segundos (4, 8 ou 12).
    #[serde(default = "default_seconds")]
    pub seconds: u32,

    /// Intervalo entre consultas de status, em segundos.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,

    /// Máximo de chamadas de criação simultâneas em um lote.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Tentativas por job, incluindo a primeira.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_model() -> String {
    "sora-2".to_string()
}

fn default_size() -> String {
    "1280x720".to_string()
}

fn default_seconds() -> u32 {
    4
}

fn default_poll_interval_secs() -> f64 {
    10.0
}

fn default_concurrency() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for SoraConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: default_model(),
            size: default_size(),
            seconds: default_seconds(),
            poll_interval_secs: default_poll_interval_secs(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl SoraConfig {
    /// Carrega `sora.toml` do diretório atual, se existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de `path`; usa os defaults se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<SoraConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    // Variáveis de ambiente vazias são ignoradas.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = key;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|u| !u.is_empty()) {
            self.base_url = Some(url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = SoraConfig::default();
        assert_eq!(config.model, "sora-2");
        assert_eq!(config.size, "1280x720");
        assert_eq!(config.seconds, 4);
        assert_eq!(config.poll_interval_secs, 10.0);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.max_attempts, 3);
        assert!(config.api_key.is_empty());
        assert!(config.base_url.is_none());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            api_key = "sk-test-123"
            concurrency = 5
            model = "sora-2-pro"
        "#;
        let config: SoraConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_key, "sk-test-123");
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.model, "sora-2-pro");
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<SoraConfig>("concurrancy = 4").is_err());
    }

    #[test]
    fn load_from_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SoraConfig::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn load_from_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "concurrency = \"lots\"").unwrap();
        let err = SoraConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = SoraConfig {
            api_key: "from-file".into(),
            ..Default::default()
        };
        config.apply_env(|name| match name {
            "OPENAI_API_KEY" => Some("from-env".into()),
            "OPENAI_BASE_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.base_url, None);
    }
}
