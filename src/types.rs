//! Core types shared by the registry, the facade and every analyzer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Ordinal threat level attached to a successful analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub const ALL: [ThreatLevel; 5] = [
        ThreatLevel::None,
        ThreatLevel::Low,
        ThreatLevel::Medium,
        ThreatLevel::High,
        ThreatLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::None => "none",
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(ThreatLevel::None),
            "low" => Ok(ThreatLevel::Low),
            "medium" | "med" => Ok(ThreatLevel::Medium),
            "high" => Ok(ThreatLevel::High),
            "critical" | "crit" => Ok(ThreatLevel::Critical),
            _ => Err(format!("Unknown threat level: {}", s)),
        }
    }
}

/// Score boundaries used to map a risk score onto a [`ThreatLevel`].
///
/// A score strictly above `critical` is critical, strictly above `high` is
/// high, and so on. A zero score with no indicators maps to `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreatThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl ThreatThresholds {
    pub const STANDARD: ThreatThresholds = ThreatThresholds {
        critical: 0.7,
        high: 0.4,
        medium: 0.2,
    };

    pub fn classify(&self, risk_score: f64, indicators: usize) -> ThreatLevel {
        if indicators == 0 && risk_score <= 0.0 {
            ThreatLevel::None
        } else if risk_score > self.critical {
            ThreatLevel::Critical
        } else if risk_score > self.high {
            ThreatLevel::High
        } else if risk_score > self.medium {
            ThreatLevel::Medium
        } else {
            ThreatLevel::Low
        }
    }
}

impl Default for ThreatThresholds {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Clamp a raw score into `[0.0, 1.0]`. NaN collapses to zero.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Outcome of a facade call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Ok,
    Error,
}

/// Machine-readable reason attached to every error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// No analyzer is registered under the requested key.
    UnsupportedModule,
    /// The request payload failed structural validation.
    InvalidInput,
    /// The analyzer failed internally.
    AnalysisFailed,
    /// The analyzer could not be constructed.
    AnalyzerUnavailable,
    /// The analysis did not finish within the configured deadline.
    Timeout,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::UnsupportedModule => "unsupported_module",
            ErrorReason::InvalidInput => "invalid_input",
            ErrorReason::AnalysisFailed => "analysis_failed",
            ErrorReason::AnalyzerUnavailable => "analyzer_unavailable",
            ErrorReason::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observation made by an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    /// Short machine-readable kind, e.g. `suspicious_tld`.
    pub kind: String,
    /// How much this observation contributes to the overall threat.
    pub risk: ThreatLevel,
    /// Human-readable description.
    pub description: String,
    /// Extra analyzer-specific context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Indicator {
    pub fn new(kind: impl Into<String>, risk: ThreatLevel, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            risk,
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Count indicators per risk level, keeping the keys stable for consumers.
pub fn count_by_risk(indicators: &[Indicator]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = [
        ThreatLevel::Critical,
        ThreatLevel::High,
        ThreatLevel::Medium,
        ThreatLevel::Low,
    ]
    .iter()
    .map(|level| (level.to_string(), 0))
    .collect();

    for indicator in indicators {
        if let Some(count) = counts.get_mut(indicator.risk.as_str()) {
            *count += 1;
        }
    }
    counts
}

/// What an analyzer produces on success. The facade wraps it in an
/// [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub threat_level: ThreatLevel,
    pub risk_score: f64,
    pub confidence: Option<f64>,
    pub details: Map<String, Value>,
}

impl Assessment {
    pub fn new(threat_level: ThreatLevel, risk_score: f64) -> Self {
        Self {
            threat_level,
            risk_score: clamp_score(risk_score),
            confidence: None,
            details: Map::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(clamp_score(confidence));
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Normalized envelope returned for every analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    /// The module key that was requested.
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_level: Option<ThreatLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisResult {
    /// Successful envelope built from an analyzer assessment.
    pub fn ok(module: impl Into<String>, assessment: Assessment) -> Self {
        Self {
            status: AnalysisStatus::Ok,
            module: module.into(),
            threat_level: Some(assessment.threat_level),
            risk_score: Some(assessment.risk_score),
            confidence: assessment.confidence,
            details: Some(assessment.details),
            reason: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Error envelope.
    pub fn error(module: impl Into<String>, reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            status: AnalysisStatus::Error,
            module: module.into(),
            threat_level: None,
            risk_score: None,
            confidence: None,
            details: None,
            reason: Some(reason),
            error: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == AnalysisStatus::Ok
    }
}
