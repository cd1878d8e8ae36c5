//! Configuration model loaded from the process environment.

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Deserializer};

/// Process-wide settings, constructed once at startup and injected into
/// every component. Environment variables (case-insensitive names) override
/// values supplied by a `.env` file, which override the defaults below.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default, deserialize_with = "de_bool")]
    pub api_reload: bool,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub anthropic_api_key: String,
    #[serde(default)]
    pub lava_secret_key: String,
    #[serde(default)]
    pub lava_connection_secret: String,
    #[serde(default)]
    pub lava_product_secret: String,
    #[serde(default, deserialize_with = "de_bool")]
    pub enable_lava: bool,
    #[serde(default = "default_max_upload_size_mb")]
    pub max_upload_size_mb: u64,
    #[serde(default = "default_max_concurrent_processing")]
    pub max_concurrent_processing: usize,
    #[serde(default, deserialize_with = "de_bool")]
    pub enable_llm_extraction: bool,
    #[serde(default = "default_scispacy_model")]
    pub scispacy_model: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_database_url() -> String {
    "sqlite:///./synapse_mapper.db".to_string()
}

fn default_max_upload_size_mb() -> u64 {
    50
}

fn default_max_concurrent_processing() -> usize {
    2
}

fn default_scispacy_model() -> String {
    "en_ner_bionlp13cg_md".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
        "https://synapse-mapper-frontend.onrender.com".to_string(),
    ]
}

/// Accepts native booleans as well as the usual truthy/falsy strings in any
/// case ("true"/"1"/"yes"/"on" and their negatives).
fn de_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct BoolVisitor;

    impl serde::de::Visitor<'_> for BoolVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a boolean or a truthy/falsy string")
        }

        fn visit_bool<E>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::custom(format!("invalid boolean value: {v}"))),
            }
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<bool, E> {
            self.visit_i64(v as i64)
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<bool, E> {
            match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" | "" => Ok(false),
                other => Err(E::custom(format!("invalid boolean value: {other:?}"))),
            }
        }

        fn visit_string<E: serde::de::Error>(self, v: String) -> Result<bool, E> {
            self.visit_str(&v)
        }
    }

    deserializer.deserialize_any(BoolVisitor)
}

impl Settings {
    /// Build settings from the process environment. Malformed values fail
    /// here, at startup, not at first use.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(env_source())
    }

    fn from_environment(source: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize::<Settings>()
    }

    #[cfg(test)]
    pub(crate) fn from_vars(vars: &[(&str, &str)]) -> Result<Self, ConfigError> {
        let map: std::collections::HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::from_environment(env_source().source(Some(map)))
    }
}

fn env_source() -> Environment {
    Environment::default()
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("cors_origins")
}
