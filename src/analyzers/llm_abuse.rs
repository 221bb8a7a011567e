//! Detection of abusive or unsafe LLM prompts.
//!
//! Prompts are matched against the weighted `prompt` rules. A match on any
//! `prompt_allowlist` rule (security education, help-seeking) short-circuits
//! the analysis as a known false positive.

use super::{Analyzer, AnalyzerInfo, AnalyzerStats, LLM_ABUSE_DETECTOR};
use crate::config::LlmAbuseSettings;
use crate::error::{AnalysisFailure, ConstructionError, ValidationError};
use crate::rules::{RuleSet, RuleTarget};
use crate::types::{clamp_score, count_by_risk, Assessment, Indicator, ThreatLevel, ThreatThresholds};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

const VERSION: &str = "1.0.0";

/// Prompt abuse is escalated earlier than the other analyzers.
const THRESHOLDS: ThreatThresholds = ThreatThresholds {
    critical: 0.8,
    high: 0.5,
    medium: 0.2,
};

/// Multiplier applied when the caller marks the user's context as elevated.
const CONTEXT_MULTIPLIER: f64 = 1.5;
const CONTEXT_MARKERS: &[&str] = &["concerning", "history"];

const MAX_SNIPPETS: usize = 3;

#[derive(Debug, Deserialize)]
struct PromptRequest {
    prompt: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    context: Option<Value>,
}

impl PromptRequest {
    fn parse(request: &Value) -> Result<Self, ValidationError> {
        let parsed = PromptRequest::deserialize(request)?;
        if parsed.prompt.trim().is_empty() {
            return Err(ValidationError::field("prompt", "must not be empty"));
        }
        Ok(parsed)
    }

    fn elevated_context(&self) -> bool {
        let text = match &self.context {
            None | Some(Value::Null) => return false,
            Some(Value::String(s)) => s.to_lowercase(),
            Some(other) => other.to_string().to_lowercase(),
        };
        CONTEXT_MARKERS.iter().any(|marker| text.contains(marker))
    }
}

/// The moderation action recommended for a given threat level.
pub fn recommended_action(level: ThreatLevel) -> &'static str {
    match level {
        ThreatLevel::Critical => "block",
        ThreatLevel::High => "review",
        ThreatLevel::Medium => "flag",
        ThreatLevel::Low | ThreatLevel::None => "allow",
    }
}

/// Scores prompts for harmful instructions, jailbreaks and similar abuse.
pub struct LlmAbuseDetector {
    settings: LlmAbuseSettings,
    rules: RuleSet,
    stats: AnalyzerStats,
}

impl LlmAbuseDetector {
    pub fn new(settings: LlmAbuseSettings, rules: RuleSet) -> Result<Self, ConstructionError> {
        if rules.for_target(RuleTarget::Prompt).next().is_none() {
            return Err(ConstructionError::MissingDependency(
                "no prompt rules are loaded".to_string(),
            ));
        }
        Ok(Self {
            settings,
            rules,
            stats: AnalyzerStats::default(),
        })
    }

    fn allowlisted(&self, prompt: &str) -> Option<&str> {
        self.rules
            .for_target(RuleTarget::PromptAllowlist)
            .find(|r| r.is_match(prompt))
            .map(|r| r.rule.id.as_str())
    }

    fn score_prompt(&self, prompt: &str) -> (f64, Vec<Indicator>) {
        let mut score = 0.0;
        let mut indicators = Vec::new();

        for compiled in self.rules.for_target(RuleTarget::Prompt) {
            let snippets = compiled.snippets(prompt, MAX_SNIPPETS);
            if snippets.is_empty() {
                continue;
            }
            let weight = compiled.rule.weight;
            score += weight;
            let risk = if weight >= 0.8 {
                ThreatLevel::High
            } else if weight >= 0.6 {
                ThreatLevel::Medium
            } else {
                ThreatLevel::Low
            };
            indicators.push(
                Indicator::new(
                    compiled.rule.id.as_str(),
                    risk,
                    format!("{}: {}", compiled.rule.category, compiled.rule.description),
                )
                .with_metadata("category", compiled.rule.category.as_str())
                .with_metadata("weight", weight)
                .with_metadata("matches", snippets),
            );
        }

        let length = prompt.chars().count();
        if length > self.settings.max_prompt_length {
            score += 0.2;
            indicators.push(
                Indicator::new(
                    "excessive_length",
                    ThreatLevel::Low,
                    format!(
                        "Prompt is {} characters, over the {} character limit",
                        length, self.settings.max_prompt_length
                    ),
                )
                .with_metadata("length", length),
            );
        }

        if !prompt.is_ascii() {
            score += 0.1;
            indicators.push(Indicator::new(
                "non_ascii_characters",
                ThreatLevel::Low,
                "Prompt contains non-ASCII characters, possibly used for obfuscation",
            ));
        }

        (clamp_score(score), indicators)
    }
}

impl Analyzer for LlmAbuseDetector {
    fn info(&self) -> AnalyzerInfo {
        AnalyzerInfo {
            name: LLM_ABUSE_DETECTOR.to_string(),
            version: VERSION.to_string(),
            description: "Detection of abusive or unsafe LLM prompts".to_string(),
            analyses: self.stats.analyses(),
        }
    }

    fn validate(&self, request: &Value) -> Result<(), ValidationError> {
        PromptRequest::parse(request).map(|_| ())
    }

    fn analyze(&self, request: &Value) -> Result<Assessment, AnalysisFailure> {
        let parsed = PromptRequest::parse(request)?;
        self.stats.record();

        let prompt = parsed.prompt.to_lowercase();
        let fingerprint = format!("{:x}", Sha256::digest(parsed.prompt.as_bytes()));
        let user_id = parsed.user_id.clone().unwrap_or_else(|| "anonymous".to_string());

        let (threat_level, risk_score, mut indicators) = match self.allowlisted(&prompt) {
            Some(rule_id) => {
                tracing::debug!(rule = rule_id, "Prompt matched a benign context");
                let indicator = Indicator::new(
                    "false_positive",
                    ThreatLevel::None,
                    "Prompt matches a known benign context",
                )
                .with_metadata("rule", rule_id);
                (ThreatLevel::None, 0.0, vec![indicator])
            }
            None => {
                let (mut score, mut indicators) = self.score_prompt(&prompt);
                if parsed.elevated_context() && score > 0.0 {
                    score = clamp_score(score * CONTEXT_MULTIPLIER);
                    indicators.push(Indicator::new(
                        "elevated_risk_context",
                        ThreatLevel::Medium,
                        "User context indicates elevated risk",
                    ));
                }
                (THRESHOLDS.classify(score, indicators.len()), score, indicators)
            }
        };

        let by_risk = count_by_risk(&indicators);
        let total = indicators.len();
        indicators.truncate(self.settings.max_findings);

        Ok(Assessment::new(threat_level, risk_score)
            .with_confidence(if total > 0 { 0.85 } else { 0.75 })
            .with_detail("action", recommended_action(threat_level))
            .with_detail("user_id", user_id)
            .with_detail("prompt_length", parsed.prompt.chars().count())
            .with_detail("prompt_sha256", fingerprint)
            .with_detail("findings_count", total)
            .with_detail("findings_by_risk", json!(by_risk))
            .with_detail("findings", json!(indicators))
            .with_detail("model_version", VERSION))
    }
}
