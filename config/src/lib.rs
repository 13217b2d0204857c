use serde::{Deserialize, Serialize};

/// Settings read from `$HOME/.config/wikibench/config.toml`.
///
/// Every section is optional; missing keys fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BenchConfig {
    pub ai: AIConfig,
    pub database: DatabaseConfig,
    pub benchmark: BenchmarkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AIConfig {
    /// Model id handed to `mistralrs`.
    pub model: String,
    /// Upper bound on tool-call round trips per generated statement.
    pub max_tool_rounds: usize,
}

impl Default for AIConfig {
    fn default() -> Self {
        Self {
            model: "qwen3:8b".to_string(),
            max_tool_rounds: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/wikisql".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Where predictions are written, one JSON object per line.
    pub output: String,
    /// Generated SQL keyed by table and question, reused across runs.
    pub cache: Option<String>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            output: "predictions.jsonl".to_string(),
            cache: Some("sql_cache.json".to_string()),
        }
    }
}

impl BenchConfig {
    #[must_use]
    pub fn get_or_default() -> Self {
        let Ok(home_dir) = std::env::var("HOME") else {
            return BenchConfig::default();
        };

        let path = format!("{home_dir}/.config/wikibench/config.toml");
        let Ok(config_file) = std::fs::read_to_string(&path) else {
            return BenchConfig::default();
        };

        Self::from_toml_str(&config_file).unwrap_or_else(|err| {
            log::warn!("ignoring {path}: {err}");
            BenchConfig::default()
        })
    }

    /// Parse a config document.
    ///
    /// # Errors
    ///
    /// Fails when `source` is not valid TOML for this layout.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}
