//! Android package risk assessment from manifest metadata.

use super::{coverage_confidence, Analyzer, AnalyzerInfo, AnalyzerStats, APK_ANALYZER};
use crate::config::ApkSettings;
use crate::error::{AnalysisFailure, ValidationError};
use crate::types::{clamp_score, count_by_risk, Assessment, Indicator, ThreatLevel, ThreatThresholds};
use serde::Deserialize;
use serde_json::{json, Value};

const VERSION: &str = "1.0.0";

/// Each analysis section contributes at most this much before weighting.
const SECTION_CAP: f64 = 0.5;

const SUSPICIOUS_PERMISSIONS: &[&str] = &[
    "android.permission.SEND_SMS",
    "android.permission.CALL_PHONE",
    "android.permission.READ_CONTACTS",
    "android.permission.READ_SMS",
    "android.permission.RECORD_AUDIO",
    "android.permission.ACCESS_FINE_LOCATION",
    "android.permission.CAMERA",
    "android.permission.READ_CALENDAR",
    "android.permission.READ_CALL_LOG",
];

const HIGH_RISK_PERMISSIONS: &[&str] = &["android.permission.SEND_SMS", "android.permission.RECORD_AUDIO"];

/// Android 4.4
const MIN_SAFE_MIN_SDK: u32 = 19;
/// Android 6.0, runtime permissions
const MIN_SAFE_TARGET_SDK: u32 = 23;

#[derive(Debug, Deserialize)]
struct Component {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    exported: bool,
    #[serde(default)]
    permission: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApkManifest {
    package_name: String,
    permissions: Vec<String>,
    #[serde(default)]
    version_name: Option<String>,
    #[serde(default)]
    version_code: Option<u64>,
    #[serde(default)]
    min_sdk_version: Option<u32>,
    #[serde(default)]
    target_sdk_version: Option<u32>,
    #[serde(default)]
    debuggable: bool,
    #[serde(default = "default_true")]
    allow_backup: bool,
    #[serde(default)]
    test_only: bool,
    #[serde(default)]
    activities: Vec<Component>,
    #[serde(default)]
    services: Vec<Component>,
    #[serde(default)]
    receivers: Vec<Component>,
    #[serde(default)]
    providers: Vec<Component>,
}

fn default_true() -> bool {
    true
}

impl ApkManifest {
    fn parse(request: &Value) -> Result<Self, ValidationError> {
        let manifest = ApkManifest::deserialize(request)?;
        if manifest.package_name.trim().is_empty() {
            return Err(ValidationError::field("package_name", "must not be empty"));
        }
        Ok(manifest)
    }

    fn components(&self) -> [(&'static str, &[Component]); 4] {
        [
            ("activity", self.activities.as_slice()),
            ("service", self.services.as_slice()),
            ("receiver", self.receivers.as_slice()),
            ("provider", self.providers.as_slice()),
        ]
    }
}

struct Section {
    score: f64,
    indicators: Vec<Indicator>,
}

impl Section {
    fn new() -> Self {
        Self {
            score: 0.0,
            indicators: Vec::new(),
        }
    }

    fn add(&mut self, weight: f64, indicator: Indicator) {
        self.score += weight;
        self.indicators.push(indicator);
    }

    fn capped(&self) -> f64 {
        self.score.min(SECTION_CAP)
    }
}

/// Scores permissions, manifest flags and exported components of an APK.
pub struct ApkAnalyzer {
    settings: ApkSettings,
    stats: AnalyzerStats,
}

impl ApkAnalyzer {
    pub fn new(settings: ApkSettings) -> Self {
        Self {
            settings,
            stats: AnalyzerStats::default(),
        }
    }

    fn is_suspicious(&self, permission: &str) -> bool {
        SUSPICIOUS_PERMISSIONS.contains(&permission)
            || self
                .settings
                .extra_suspicious_permissions
                .iter()
                .any(|p| p == permission)
    }

    fn permissions(&self, manifest: &ApkManifest) -> Section {
        let mut section = Section::new();
        for permission in &manifest.permissions {
            if !self.is_suspicious(permission) {
                continue;
            }
            let risk = if HIGH_RISK_PERMISSIONS.contains(&permission.as_str()) {
                ThreatLevel::High
            } else {
                ThreatLevel::Medium
            };
            section.add(
                0.1,
                Indicator::new(
                    "dangerous_permission",
                    risk,
                    format!("Potentially dangerous permission: {}", permission),
                )
                .with_metadata("permission", permission.as_str()),
            );
        }
        section
    }

    fn flags(&self, manifest: &ApkManifest) -> Section {
        let mut section = Section::new();

        if manifest.debuggable {
            section.add(
                0.2,
                Indicator::new(
                    "debuggable",
                    ThreatLevel::High,
                    "App is marked as debuggable which can expose sensitive information",
                ),
            );
        }
        if manifest.allow_backup {
            section.add(
                0.1,
                Indicator::new(
                    "backup_allowed",
                    ThreatLevel::Medium,
                    "App data can be backed up, potentially exposing sensitive information",
                ),
            );
        }
        if manifest.test_only {
            section.add(
                0.15,
                Indicator::new(
                    "test_only",
                    ThreatLevel::High,
                    "App is marked as testOnly and should not be in production",
                ),
            );
        }

        let min_sdk = manifest.min_sdk_version.unwrap_or(1);
        if min_sdk < MIN_SAFE_MIN_SDK {
            section.add(
                0.1,
                Indicator::new(
                    "low_min_sdk",
                    ThreatLevel::Medium,
                    format!(
                        "minSdkVersion {} targets very old Android versions with known vulnerabilities",
                        min_sdk
                    ),
                )
                .with_metadata("min_sdk_version", min_sdk),
            );
        }

        let target_sdk = manifest.target_sdk_version.unwrap_or(1);
        if target_sdk < MIN_SAFE_TARGET_SDK {
            section.add(
                0.1,
                Indicator::new(
                    "low_target_sdk",
                    ThreatLevel::Medium,
                    format!(
                        "targetSdkVersion {} does not opt into recent Android security features",
                        target_sdk
                    ),
                )
                .with_metadata("target_sdk_version", target_sdk),
            );
        }

        section
    }

    fn exported_components(&self, manifest: &ApkManifest) -> Section {
        let mut section = Section::new();
        for (kind, components) in manifest.components() {
            for component in components {
                let protected = component
                    .permission
                    .as_deref()
                    .map(|p| !p.trim().is_empty())
                    .unwrap_or(false);
                if component.exported && !protected {
                    section.add(
                        0.1,
                        Indicator::new(
                            "unprotected_export",
                            ThreatLevel::High,
                            format!("Exported {} is not protected by a permission", kind),
                        )
                        .with_metadata("component", component.name.as_deref().unwrap_or("unknown"))
                        .with_metadata("component_type", kind),
                    );
                }
            }
        }
        section
    }
}

impl Default for ApkAnalyzer {
    fn default() -> Self {
        Self::new(ApkSettings::default())
    }
}

impl Analyzer for ApkAnalyzer {
    fn info(&self) -> AnalyzerInfo {
        AnalyzerInfo {
            name: APK_ANALYZER.to_string(),
            version: VERSION.to_string(),
            description: "Android package risk from permissions, flags and components".to_string(),
            analyses: self.stats.analyses(),
        }
    }

    fn validate(&self, request: &Value) -> Result<(), ValidationError> {
        ApkManifest::parse(request).map(|_| ())
    }

    fn analyze(&self, request: &Value) -> Result<Assessment, AnalysisFailure> {
        let manifest = ApkManifest::parse(request)?;
        self.stats.record();

        let permissions = self.permissions(&manifest);
        let flags = self.flags(&manifest);
        let components = self.exported_components(&manifest);

        let risk_score = clamp_score(
            permissions.capped() * 0.4 + flags.capped() * 0.3 + components.capped() * 0.3,
        );

        let suspicious_permissions = permissions.indicators.len();
        let mut indicators = permissions.indicators;
        indicators.extend(flags.indicators);
        indicators.extend(components.indicators);

        let threat_level = ThreatThresholds::STANDARD.classify(risk_score, indicators.len());
        let by_risk = count_by_risk(&indicators);
        let total = indicators.len();
        indicators.truncate(self.settings.max_findings);

        let components_analyzed: usize = manifest.components().iter().map(|(_, c)| c.len()).sum();
        let supplied = [
            manifest.min_sdk_version.is_some(),
            manifest.target_sdk_version.is_some(),
            components_analyzed > 0,
            manifest.version_code.is_some() || manifest.version_name.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        Ok(Assessment::new(threat_level, risk_score)
            .with_confidence(coverage_confidence(supplied, 4))
            .with_detail("package_name", manifest.package_name.clone())
            .with_detail(
                "version_name",
                manifest.version_name.clone().unwrap_or_else(|| "unknown".to_string()),
            )
            .with_detail("version_code", manifest.version_code)
            .with_detail("findings_count", total)
            .with_detail("findings_by_risk", json!(by_risk))
            .with_detail("findings", json!(indicators))
            .with_detail("permissions_analyzed", manifest.permissions.len())
            .with_detail("suspicious_permissions", suspicious_permissions)
            .with_detail("components_analyzed", components_analyzed)
            .with_detail("model_version", VERSION))
    }
}
