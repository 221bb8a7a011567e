//! Pluggable analysis modules.
//!
//! Every analyzer implements [`Analyzer`] and is registered under a string key
//! in the [`AnalyzerRegistry`](crate::registry::AnalyzerRegistry).

pub mod apk;
pub mod llm_abuse;
pub mod network_ids;
pub mod phishing;

pub use apk::ApkAnalyzer;
pub use llm_abuse::LlmAbuseDetector;
pub use network_ids::NetworkIdsAnalyzer;
pub use phishing::PhishingDetector;

use crate::config::AnalyzersConfig;
use crate::error::{AnalysisFailure, RegistryError, ValidationError};
use crate::registry::AnalyzerRegistry;
use crate::rules::loader::load_rules_from_directory;
use crate::rules::{PatternRule, RuleSet};
use crate::types::Assessment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

pub const NETWORK_IDS: &str = "network_ids";
pub const APK_ANALYZER: &str = "apk_analyzer";
pub const PHISHING_DETECTOR: &str = "phishing_detector";
pub const LLM_ABUSE_DETECTOR: &str = "llm_abuse_detector";

/// Keys of all built-in analyzers.
pub const BUILTIN_KEYS: [&str; 4] = [NETWORK_IDS, APK_ANALYZER, PHISHING_DETECTOR, LLM_ABUSE_DETECTOR];

/// Descriptive metadata about an analyzer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Analyses performed by this instance since it was constructed.
    pub analyses: u64,
}

/// The capability contract every analysis module satisfies.
pub trait Analyzer: Send + Sync {
    fn info(&self) -> AnalyzerInfo;

    /// Structural check of the request. Rejects missing or ill-typed
    /// required fields; business-level risk is never a validation error.
    fn validate(&self, request: &Value) -> Result<(), ValidationError>;

    /// Analyze a request that passed [`Analyzer::validate`]. A clean input
    /// is an `Ok` assessment with threat level `none`.
    fn analyze(&self, request: &Value) -> Result<Assessment, AnalysisFailure>;

    /// Cheap liveness probe.
    fn health_check(&self) -> bool {
        true
    }
}

/// Per-instance counters.
#[derive(Debug, Default)]
pub struct AnalyzerStats {
    analyses: AtomicU64,
}

impl AnalyzerStats {
    pub fn record(&self) -> u64 {
        self.analyses.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn analyses(&self) -> u64 {
        self.analyses.load(Ordering::Relaxed)
    }
}

/// Confidence derived from how many of the optional signals were supplied.
pub(crate) fn coverage_confidence(present: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.5;
    }
    0.5 + 0.5 * (present.min(total) as f64 / total as f64)
}

/// Register the built-in analyzers enabled in `config`.
///
/// Extra rules from `config.rules_dir` are read once here; each analyzer
/// compiles them when it is first constructed.
pub fn register_builtin(
    registry: &mut AnalyzerRegistry,
    config: &AnalyzersConfig,
) -> Result<(), RegistryError> {
    let custom_rules = load_custom_rules(config);

    for key in &config.enabled {
        match key.as_str() {
            NETWORK_IDS => {
                let settings = config.network_ids.clone();
                registry.register(NETWORK_IDS, move || NetworkIdsAnalyzer::new(settings.clone()))?;
            }
            APK_ANALYZER => {
                let settings = config.apk_analyzer.clone();
                registry.register(APK_ANALYZER, move || Ok(ApkAnalyzer::new(settings.clone())))?;
            }
            PHISHING_DETECTOR => {
                let settings = config.phishing_detector.clone();
                let rules = custom_rules.clone();
                registry.register(PHISHING_DETECTOR, move || {
                    PhishingDetector::new(settings.clone(), build_rule_set(&rules)?)
                })?;
            }
            LLM_ABUSE_DETECTOR => {
                let settings = config.llm_abuse_detector.clone();
                let rules = custom_rules.clone();
                registry.register(LLM_ABUSE_DETECTOR, move || {
                    LlmAbuseDetector::new(settings.clone(), build_rule_set(&rules)?)
                })?;
            }
            other => {
                tracing::warn!(analyzer = other, "Unknown analyzer in config, skipping");
            }
        }
    }

    Ok(())
}

fn load_custom_rules(config: &AnalyzersConfig) -> Vec<PatternRule> {
    let Some(dir) = config.rules_dir.as_deref() else {
        return Vec::new();
    };
    match load_rules_from_directory(dir) {
        Ok(rules) => {
            tracing::info!("Loaded {} custom rules from {:?}", rules.len(), dir);
            rules
        }
        Err(e) => {
            tracing::warn!("Failed to load custom rules: {:#}", e);
            Vec::new()
        }
    }
}

fn build_rule_set(custom: &[PatternRule]) -> Result<RuleSet, crate::error::ConstructionError> {
    let mut rules = RuleSet::new().with_builtin_rules()?;
    for rule in custom {
        rules.add_rule(rule.clone())?;
    }
    Ok(rules)
}
