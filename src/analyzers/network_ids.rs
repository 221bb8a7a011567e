//! Network intrusion detection over summarized traffic features.
//!
//! The input is a flow summary (packet/byte counters, duration, or the
//! already-derived packet size and connection rate). Rates and sizes are
//! compared against thresholds that indicate floods, scans and bulk
//! transfers.

use super::{coverage_confidence, Analyzer, AnalyzerInfo, AnalyzerStats, NETWORK_IDS};
use crate::config::NetworkIdsSettings;
use crate::error::{AnalysisFailure, ConstructionError, ValidationError};
use crate::types::{clamp_score, Assessment, Indicator, ThreatLevel, ThreatThresholds};
use serde::Deserialize;
use serde_json::{json, Value};

const VERSION: &str = "1.0.0";

/// Floor applied to durations to avoid dividing by near-zero windows.
const MIN_DURATION_SECS: f64 = 0.1;

/// Average packet size below which a high packet rate looks like scanning.
const SMALL_PACKET_BYTES: f64 = 100.0;

#[derive(Debug, Deserialize)]
struct TrafficSample {
    protocol: String,
    #[serde(default)]
    source_ip: Option<String>,
    #[serde(default)]
    dest_ip: Option<String>,
    #[serde(default)]
    source_port: Option<u16>,
    #[serde(default)]
    dest_port: Option<u16>,
    #[serde(default)]
    packet_count: Option<f64>,
    #[serde(default)]
    byte_count: Option<f64>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    packet_size: Option<f64>,
    #[serde(default)]
    connection_rate: Option<f64>,
}

impl TrafficSample {
    fn parse(request: &Value) -> Result<Self, ValidationError> {
        let sample = TrafficSample::deserialize(request)?;

        if sample.protocol.trim().is_empty() {
            return Err(ValidationError::field("protocol", "must not be empty"));
        }

        let metrics = [
            ("packet_count", sample.packet_count),
            ("byte_count", sample.byte_count),
            ("duration", sample.duration),
            ("packet_size", sample.packet_size),
            ("connection_rate", sample.connection_rate),
        ];
        for (name, value) in metrics {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(ValidationError::field(name, "must be a non-negative number"));
                }
            }
        }

        if sample.packet_count.is_none()
            && sample.byte_count.is_none()
            && sample.packet_size.is_none()
            && sample.connection_rate.is_none()
        {
            return Err(ValidationError::new(
                "at least one traffic metric is required \
                 (packet_count, byte_count, packet_size or connection_rate)",
            ));
        }

        Ok(sample)
    }

    fn window(&self) -> f64 {
        self.duration.unwrap_or(1.0).max(MIN_DURATION_SECS)
    }

    fn packets_per_second(&self) -> f64 {
        self.connection_rate
            .or_else(|| self.packet_count.map(|count| count / self.window()))
            .unwrap_or(0.0)
    }

    fn avg_packet_size(&self) -> f64 {
        self.packet_size
            .or_else(|| {
                self.byte_count
                    .map(|bytes| bytes / self.packet_count.unwrap_or(1.0).max(1.0))
            })
            .unwrap_or(0.0)
    }

    fn bytes_per_second(&self) -> f64 {
        match self.byte_count {
            Some(bytes) => bytes / self.window(),
            None => self.packets_per_second() * self.avg_packet_size(),
        }
    }

    fn supplied_signals(&self) -> usize {
        [
            self.packet_count.is_some(),
            self.byte_count.is_some(),
            self.duration.is_some(),
            self.packet_size.is_some() || self.connection_rate.is_some(),
            self.dest_port.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Flags floods, scans and bulk transfers in flow summaries.
pub struct NetworkIdsAnalyzer {
    settings: NetworkIdsSettings,
    stats: AnalyzerStats,
}

impl NetworkIdsAnalyzer {
    /// Thresholds must be positive; a zero rate would flag every flow.
    pub fn new(settings: NetworkIdsSettings) -> Result<Self, ConstructionError> {
        let thresholds = [
            ("high_packet_rate", settings.high_packet_rate),
            ("oversized_packet_bytes", settings.oversized_packet_bytes),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConstructionError::InvalidSettings(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        Ok(Self {
            settings,
            stats: AnalyzerStats::default(),
        })
    }

    fn threat_type(level: ThreatLevel, indicators: &[Indicator]) -> &'static str {
        let has = |kind: &str| indicators.iter().any(|i| i.kind == kind);
        match level {
            ThreatLevel::Critical if has("small_packet_flood") => "Port Scan",
            ThreatLevel::Critical if has("oversized_packets") => "Data Exfiltration",
            ThreatLevel::Critical => "DDoS",
            ThreatLevel::High if has("small_packet_flood") => "Port Scan",
            ThreatLevel::High => "Brute Force",
            ThreatLevel::Medium => "Suspicious Traffic",
            ThreatLevel::Low | ThreatLevel::None => "Normal",
        }
    }
}

impl Default for NetworkIdsAnalyzer {
    fn default() -> Self {
        Self {
            settings: NetworkIdsSettings::default(),
            stats: AnalyzerStats::default(),
        }
    }
}

impl Analyzer for NetworkIdsAnalyzer {
    fn info(&self) -> AnalyzerInfo {
        AnalyzerInfo {
            name: NETWORK_IDS.to_string(),
            version: VERSION.to_string(),
            description: "Network intrusion detection over traffic flow summaries".to_string(),
            analyses: self.stats.analyses(),
        }
    }

    fn validate(&self, request: &Value) -> Result<(), ValidationError> {
        TrafficSample::parse(request).map(|_| ())
    }

    fn analyze(&self, request: &Value) -> Result<Assessment, AnalysisFailure> {
        let sample = TrafficSample::parse(request)?;
        self.stats.record();

        let pps = sample.packets_per_second();
        let avg_size = sample.avg_packet_size();
        let bps = sample.bytes_per_second();

        let mut score = 0.0;
        let mut indicators = Vec::new();

        if pps > self.settings.high_packet_rate {
            score += 0.4;
            indicators.push(
                Indicator::new(
                    "high_packet_rate",
                    ThreatLevel::High,
                    format!("Packet rate of {:.0}/s exceeds {:.0}/s", pps, self.settings.high_packet_rate),
                )
                .with_metadata("packets_per_second", pps),
            );
        }

        if pps > self.settings.high_packet_rate / 2.0 && avg_size < SMALL_PACKET_BYTES {
            score += 0.3;
            indicators.push(
                Indicator::new(
                    "small_packet_flood",
                    ThreatLevel::High,
                    "Many small packets in a short window, typical of scanning",
                )
                .with_metadata("avg_packet_size", avg_size),
            );
        }

        if avg_size > self.settings.oversized_packet_bytes {
            score += 0.2;
            indicators.push(
                Indicator::new(
                    "oversized_packets",
                    ThreatLevel::Medium,
                    format!("Average packet size of {:.0} bytes suggests bulk transfer", avg_size),
                )
                .with_metadata("avg_packet_size", avg_size),
            );
        }

        let risk_score = clamp_score(score);
        let threat_level = ThreatThresholds::STANDARD.classify(risk_score, indicators.len());

        let features: Vec<&String> = request
            .as_object()
            .map(|obj| obj.keys().collect())
            .unwrap_or_default();

        Ok(Assessment::new(threat_level, risk_score)
            .with_confidence(coverage_confidence(sample.supplied_signals(), 5))
            .with_detail("protocol", sample.protocol.to_uppercase())
            .with_detail("threat_type", Self::threat_type(threat_level, &indicators))
            .with_detail("source_ip", sample.source_ip.clone())
            .with_detail("dest_ip", sample.dest_ip.clone())
            .with_detail("source_port", sample.source_port)
            .with_detail("dest_port", sample.dest_port)
            .with_detail(
                "anomaly_scores",
                json!({
                    "packet_rate": (pps / self.settings.high_packet_rate).min(1.0),
                    "byte_rate": (bps / (1024.0 * 1024.0)).min(1.0),
                    "avg_packet_size": (avg_size / 2000.0).min(1.0),
                }),
            )
            .with_detail("features_analyzed", json!(features))
            .with_detail("findings", json!(indicators))
            .with_detail("model_version", VERSION))
    }
}
