use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::settings::IndexSettings;

/// Configuration for an [`Engine`](crate::Engine) session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Settings of the underlying index.
    pub settings: IndexSettings,
    /// Storage name the index is persisted under. `None` keeps the index in
    /// memory only.
    #[serde(default)]
    pub index_file: Option<String>,
    /// Maximum number of results returned by a search.
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
    /// Results whose summed score exceeds this are dropped.
    #[serde(default = "default_max_score")]
    pub max_score: i32,
}

fn default_result_limit() -> usize {
    10_000
}

fn default_max_score() -> i32 {
    i32::MAX
}

impl EngineConfig {
    pub fn new(settings: IndexSettings) -> Self {
        Self {
            settings,
            index_file: None,
            result_limit: default_result_limit(),
            max_score: default_max_score(),
        }
    }

    pub fn builder(settings: IndexSettings) -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::new(settings),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.settings.validate()?;
        Ok(config)
    }
}

pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn index_file(mut self, name: impl Into<String>) -> Self {
        self.config.index_file = Some(name.into());
        self
    }

    pub fn result_limit(mut self, limit: usize) -> Self {
        self.config.result_limit = limit;
        self
    }

    pub fn max_score(mut self, max_score: i32) -> Self {
        self.config.max_score = max_score;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}
