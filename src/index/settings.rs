//! Typed index settings.

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::util::glob::GlobPattern;

/// Settings for one index.
///
/// # Example
///
/// ```
/// use quarry::IndexSettings;
///
/// let settings = IndexSettings::from_json(r#"{ "name": "assets", "roots": ["Assets"] }"#).unwrap();
/// assert_eq!(settings.min_variations, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Index name, used in progress reports and persisted file names.
    pub name: String,
    /// Seed locations handed to document adapters.
    pub roots: Vec<String>,
    /// Glob patterns a document must match (empty = everything).
    pub includes: Vec<String>,
    /// Glob patterns that exclude a document.
    pub excludes: Vec<String>,
    /// Shortest prefix variation stored for words and property values.
    pub min_variations: usize,
    /// Longest prefix variation; longer text also gets one full-length entry.
    pub max_variations: usize,
    /// Score given to ordinary entries. Lower ranks higher.
    pub base_score: i32,
    /// Values stored as a single exact token instead of prefix variations.
    pub exact_literals: Vec<String>,
    pub index_words: bool,
    pub index_properties: bool,
    pub index_numbers: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        IndexSettings {
            name: "default".to_string(),
            roots: Vec::new(),
            includes: Vec::new(),
            excludes: Vec::new(),
            min_variations: 2,
            max_variations: 12,
            base_score: 100,
            exact_literals: vec!["true".to_string(), "false".to_string()],
            index_words: true,
            index_properties: true,
            index_numbers: true,
        }
    }
}

impl IndexSettings {
    pub fn new(name: impl Into<String>) -> Self {
        IndexSettings {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let settings: IndexSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_variations(mut self, min: usize, max: usize) -> Self {
        self.min_variations = min;
        self.max_variations = max;
        self
    }

    pub fn with_includes(mut self, patterns: Vec<String>) -> Self {
        self.includes = patterns;
        self
    }

    pub fn with_excludes(mut self, patterns: Vec<String>) -> Self {
        self.excludes = patterns;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_variations == 0 {
            return Err(QuarryError::invalid_config(
                "min_variations must be at least 1",
            ));
        }
        if self.max_variations < self.min_variations {
            return Err(QuarryError::invalid_config(format!(
                "max_variations ({}) is smaller than min_variations ({})",
                self.max_variations, self.min_variations
            )));
        }
        if self.base_score <= 1 {
            return Err(QuarryError::invalid_config("base_score must be above 1"));
        }
        self.include_patterns()?;
        self.exclude_patterns()?;
        Ok(())
    }

    /// Whether `value` is stored exactly rather than as prefix variations.
    pub fn is_exact_literal(&self, value: &str) -> bool {
        self.exact_literals
            .iter()
            .any(|literal| literal.eq_ignore_ascii_case(value))
    }

    pub fn include_patterns(&self) -> Result<Vec<GlobPattern>> {
        self.includes.iter().map(|p| GlobPattern::new(p)).collect()
    }

    pub fn exclude_patterns(&self) -> Result<Vec<GlobPattern>> {
        self.excludes.iter().map(|p| GlobPattern::new(p)).collect()
    }
}
