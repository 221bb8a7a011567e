//! Weighted regex rules used by the text-oriented analyzers.

pub mod loader;
pub mod patterns;

use crate::error::ConstructionError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a rule is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    /// LLM prompts; a match raises the abuse score.
    Prompt,
    /// LLM prompts; a match marks the prompt as a known benign context.
    PromptAllowlist,
    /// HTML page bodies inspected for phishing.
    Html,
}

impl fmt::Display for RuleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleTarget::Prompt => write!(f, "prompt"),
            RuleTarget::PromptAllowlist => write!(f, "prompt_allowlist"),
            RuleTarget::Html => write!(f, "html"),
        }
    }
}

/// A detection rule that contributes a weight to a risk score when it matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    /// Unique identifier, reported as the indicator kind.
    pub id: String,
    /// Category the rule belongs to, e.g. `jailbreak`.
    pub category: String,
    /// What the category or rule detects.
    pub description: String,
    pub target: RuleTarget,
    /// Score contribution; may be negative for signals of legitimacy.
    #[serde(default)]
    pub weight: f64,
    /// Regex pattern, matched case-insensitively.
    pub pattern: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl PatternRule {
    /// Compile the regex pattern for this rule.
    pub fn compile(&self) -> Result<CompiledRule, ConstructionError> {
        let regex = RegexBuilder::new(&self.pattern)
            .case_insensitive(true)
            .dot_matches_new_line(self.target == RuleTarget::Html)
            .build()
            .map_err(|source| ConstructionError::InvalidRule {
                id: self.id.clone(),
                source,
            })?;
        Ok(CompiledRule {
            rule: self.clone(),
            regex,
        })
    }
}

/// A rule with its compiled regex.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: PatternRule,
    pub regex: Regex,
}

impl CompiledRule {
    pub fn is_match(&self, content: &str) -> bool {
        self.regex.is_match(content)
    }

    /// Up to `limit` matched snippets, for reporting context.
    pub fn snippets(&self, content: &str, limit: usize) -> Vec<String> {
        self.regex
            .find_iter(content)
            .take(limit)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

/// Collection of compiled rules.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Load the built-in rules.
    pub fn with_builtin_rules(mut self) -> Result<Self, ConstructionError> {
        for rule in patterns::builtin_rules() {
            if rule.enabled {
                self.rules.push(rule.compile()?);
            }
        }
        Ok(self)
    }

    /// Add a custom rule. Disabled rules are skipped.
    pub fn add_rule(&mut self, rule: PatternRule) -> Result<(), ConstructionError> {
        if rule.enabled {
            self.rules.push(rule.compile()?);
        }
        Ok(())
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Rules that apply to a given target.
    pub fn for_target(&self, target: RuleTarget) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(move |r| r.rule.target == target)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
