//! Glob patterns for include/exclude rules.
//!
//! `*` matches within a path segment, `**` across segments, `?` a single
//! character. Patterns without a `/` match against the file name only.

use regex::Regex;

use crate::error::{QuarryError, Result};

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    regex: Regex,
    name_only: bool,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let normalized = pattern.replace('\\', "/");
        let regex_pattern = Self::compile_pattern(&normalized);
        let regex = Regex::new(&regex_pattern).map_err(|e| {
            QuarryError::invalid_config(format!("Invalid glob pattern '{pattern}': {e}"))
        })?;

        Ok(GlobPattern {
            name_only: !normalized.contains('/'),
            pattern: normalized,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Test a `/`-separated path against this pattern.
    pub fn matches(&self, path: &str) -> bool {
        if self.name_only {
            let name = path.rsplit('/').next().unwrap_or(path);
            self.regex.is_match(name)
        } else {
            self.regex.is_match(path)
        }
    }

    fn compile_pattern(pattern: &str) -> String {
        let mut regex_pattern = String::with_capacity(pattern.len() * 2);
        regex_pattern.push_str("(?i)^");

        let chars: Vec<char> = pattern.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '*' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                    regex_pattern.push_str(".*");
                    i += 1;
                    // "**/" also matches zero directories
                    if i + 1 < chars.len() && chars[i + 1] == '/' {
                        regex_pattern.push_str("/?");
                        i += 1;
                    }
                }
                '*' => regex_pattern.push_str("[^/]*"),
                '?' => regex_pattern.push_str("[^/]"),
                c => regex_pattern.push_str(&regex::escape(&c.to_string())),
            }
            i += 1;
        }

        regex_pattern.push('$');
        regex_pattern
    }
}

/// Returns true if any pattern in the list matches the path.
pub fn any_match(patterns: &[GlobPattern], path: &str) -> bool {
    patterns.iter().any(|p| p.matches(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_only_pattern() {
        let glob = GlobPattern::new("*.png").unwrap();
        assert!(glob.matches("Assets/Textures/wood.png"));
        assert!(glob.matches("wood.PNG"));
        assert!(!glob.matches("Assets/wood.png.meta"));
    }

    #[test]
    fn test_path_pattern() {
        let glob = GlobPattern::new("Assets/**/Editor/*").unwrap();
        assert!(glob.matches("Assets/Editor/tool.cs"));
        assert!(glob.matches("Assets/Plugins/Foo/Editor/tool.cs"));
        assert!(!glob.matches("Packages/Editor/tool.cs"));
    }

    #[test]
    fn test_question_mark_and_escaping() {
        let glob = GlobPattern::new("file?.(txt)").unwrap();
        assert!(glob.matches("file1.(txt)"));
        assert!(!glob.matches("file12.(txt)"));
    }
}
