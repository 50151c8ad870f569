use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub completion: CompletionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "crmd.db".to_string()
}

/// Identity-provider collaborator. The daemon trusts it to turn an opaque
/// credential into a stable subject id.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub verify_url: String,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}

/// Object-storage collaborator for avatar uploads. Optional: without it,
/// profile updates accept plain http(s) avatar URLs only.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub upload_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [auth]
            verify_url = "https://id.example.com/verify"

            [completion]
            api_key = "sk-test"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.server.port, 5000);
        assert_eq!(cfg.state.db_path, "crmd.db");
        assert_eq!(cfg.completion.base_url, "https://api.openai.com/v1");
        assert_eq!(cfg.completion.model, "gpt-4o-mini");
        assert!((cfg.completion.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.completion.max_tokens, 1000);
        assert!(cfg.storage.is_none());
    }

    #[test]
    fn storage_section_is_optional_but_parsed() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [auth]
            verify_url = "https://id.example.com/verify"

            [completion]
            api_key = "sk-test"
            model = "gpt-4o"

            [storage]
            upload_url = "https://media.example.com/upload"
            api_key = "media-key"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.completion.model, "gpt-4o");
        let storage = cfg.storage.unwrap();
        assert_eq!(storage.upload_url, "https://media.example.com/upload");
        assert_eq!(storage.api_key, "media-key");
    }

    #[test]
    fn missing_completion_section_is_an_error() {
        let parsed: Result<AppConfig, _> = toml::from_str(
            r#"
            [auth]
            verify_url = "https://id.example.com/verify"
            "#,
        );
        assert!(parsed.is_err());
    }
}
