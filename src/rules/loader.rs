//! JSON rule loader.
//!
//! Extra rules live in `*.json` files inside the configured rules directory:
//!
//! ```json
//! {
//!   "target": "prompt",
//!   "category": "jailbreak",
//!   "description": "Attempts to bypass safety restrictions",
//!   "rules": [{ "id": "dan_prompt", "weight": 0.8, "pattern": "\\bDAN mode\\b" }]
//! }
//! ```

use super::{PatternRule, RuleTarget};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// JSON structure for a rule file.
#[derive(Debug, Deserialize)]
struct RuleFile {
    target: RuleTarget,
    category: String,
    #[serde(default)]
    description: String,
    rules: Vec<JsonRule>,
}

/// JSON structure for a single rule.
#[derive(Debug, Deserialize)]
struct JsonRule {
    id: String,
    pattern: String,
    #[serde(default)]
    weight: f64,
    description: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

impl JsonRule {
    fn into_rule(self, file: &RuleFile) -> PatternRule {
        PatternRule {
            id: self.id,
            category: file.category.clone(),
            description: self.description.unwrap_or_else(|| file.description.clone()),
            target: file.target,
            weight: self.weight,
            pattern: self.pattern,
            enabled: self.enabled,
        }
    }
}

/// Load rules from a JSON file.
pub fn load_rules_from_file(path: &Path) -> Result<Vec<PatternRule>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rule file {}", path.display()))?;
    let mut rule_file: RuleFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse rule file {}", path.display()))?;

    let json_rules = std::mem::take(&mut rule_file.rules);
    Ok(json_rules
        .into_iter()
        .map(|r| r.into_rule(&rule_file))
        .collect())
}

/// Load all rules from JSON files in a directory. Files that fail to parse
/// are skipped with a warning.
pub fn load_rules_from_directory(dir: &Path) -> Result<Vec<PatternRule>> {
    let mut all_rules = Vec::new();

    if !dir.exists() {
        tracing::warn!("Rules directory {:?} does not exist", dir);
        return Ok(all_rules);
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list rules directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();

    for path in paths {
        match load_rules_from_file(&path) {
            Ok(rules) => {
                tracing::debug!("Loaded {} rules from {:?}", rules.len(), path);
                all_rules.extend(rules);
            }
            Err(e) => {
                tracing::warn!("Failed to load rules from {:?}: {:#}", path, e);
            }
        }
    }

    Ok(all_rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const JAILBREAK_FILE: &str = r#"{
        "target": "prompt",
        "category": "jailbreak",
        "description": "Attempts to bypass safety restrictions",
        "rules": [
            {"id": "dan_mode", "weight": 0.8, "pattern": "\\bdan mode\\b"},
            {"id": "dev_mode", "weight": 0.6, "pattern": "developer mode", "enabled": false}
        ]
    }"#;

    #[test]
    fn test_load_rule_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jailbreak.json");
        fs::write(&path, JAILBREAK_FILE).unwrap();

        let rules = load_rules_from_file(&path).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, "dan_mode");
        assert_eq!(rules[0].target, RuleTarget::Prompt);
        assert_eq!(rules[0].category, "jailbreak");
        assert_eq!(rules[0].description, "Attempts to bypass safety restrictions");
        assert!(!rules[1].enabled);
    }

    #[test]
    fn test_directory_skips_broken_and_non_json_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.json"), JAILBREAK_FILE).unwrap();
        fs::write(tmp.path().join("broken.json"), "{ not json").unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let rules = load_rules_from_directory(tmp.path()).unwrap();
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_missing_directory_yields_no_rules() {
        let tmp = TempDir::new().unwrap();
        let rules = load_rules_from_directory(&tmp.path().join("absent")).unwrap();
        assert!(rules.is_empty());
    }
}
