//! Phishing detection for URLs and HTML pages.

use super::{Analyzer, AnalyzerInfo, AnalyzerStats, PHISHING_DETECTOR};
use crate::config::PhishingSettings;
use crate::error::{AnalysisFailure, ConstructionError, ValidationError};
use crate::rules::{RuleSet, RuleTarget};
use crate::types::{clamp_score, count_by_risk, Assessment, Indicator, ThreatLevel, ThreatThresholds};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

const VERSION: &str = "1.0.0";

const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "login", "signin", "account", "verify", "secure", "banking", "paypal", "ebay", "amazon",
    "apple", "microsoft", "update", "confirm", "billing", "invoice", "payment", "urgent",
    "action",
];

const SUSPICIOUS_TLDS: &[&str] = &[
    ".xyz", ".top", ".gq", ".ml", ".cf", ".tk", ".ga", ".cc", ".club", ".online", ".site",
    ".website", ".space", ".tech",
];

const TRUSTED_DOMAINS: &[&str] = &[
    "google.com", "paypal.com", "microsoft.com", "apple.com", "amazon.com", "ebay.com",
    "netflix.com", "linkedin.com", "facebook.com", "twitter.com", "instagram.com",
];

const URL_SHORTENERS: &[&str] = &["bit.ly", "goo.gl", "tinyurl.com", "t.co", "ow.ly", "is.gd"];

/// Weight of the URL score when both a URL and a page body are supplied.
const URL_WEIGHT: f64 = 0.6;
const HTML_WEIGHT: f64 = 0.4;

#[derive(Debug, Deserialize)]
struct PhishingRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    html: Option<String>,
}

impl PhishingRequest {
    fn parse(request: &Value) -> Result<Self, ValidationError> {
        let parsed = PhishingRequest::deserialize(request)?;
        if parsed.url().is_none() && parsed.html().is_none() {
            return Err(ValidationError::new("either `url` or `html` must be provided"));
        }
        Ok(parsed)
    }

    fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    fn html(&self) -> Option<&str> {
        self.html.as_deref().filter(|h| !h.trim().is_empty())
    }
}

/// Lowercase a configured domain or TLD, dropping blank entries.
fn normalize_entry(entry: &str) -> Option<String> {
    let entry = entry.trim().trim_start_matches('.').to_lowercase();
    (!entry.is_empty()).then_some(entry)
}

/// The pieces of a URL the detector inspects, all lowercased.
#[derive(Debug, PartialEq)]
struct UrlParts {
    scheme: String,
    host: String,
    path: String,
    query: String,
}

/// Scores URLs and page bodies against known phishing traits.
pub struct PhishingDetector {
    settings: PhishingSettings,
    rules: RuleSet,
    /// Built-in and configured domains, lowercased, blanks dropped.
    trusted_domains: Vec<String>,
    /// Built-in and configured TLDs, each with a leading dot.
    suspicious_tlds: Vec<String>,
    url_pattern: Regex,
    ip_host: Regex,
    external_src: Regex,
    form_action: Regex,
    stats: AnalyzerStats,
}

impl PhishingDetector {
    pub fn new(settings: PhishingSettings, rules: RuleSet) -> Result<Self, ConstructionError> {
        let compile = |id: &str, pattern: &str| {
            Regex::new(pattern).map_err(|source| ConstructionError::InvalidRule {
                id: id.to_string(),
                source,
            })
        };

        let trusted_domains = TRUSTED_DOMAINS
            .iter()
            .map(|d| d.to_string())
            .chain(settings.trusted_domains.iter().filter_map(|d| normalize_entry(d)))
            .collect();
        let suspicious_tlds = SUSPICIOUS_TLDS
            .iter()
            .map(|t| t.to_string())
            .chain(
                settings
                    .suspicious_tlds
                    .iter()
                    .filter_map(|t| normalize_entry(t))
                    .map(|t| format!(".{}", t)),
            )
            .collect();

        Ok(Self {
            trusted_domains,
            suspicious_tlds,
            url_pattern: compile(
                "url_parts",
                r"^([a-z][a-z0-9+.\-]*)://([^/?#\s]+)([^?#\s]*)(?:\?([^#\s]*))?(?:#\S*)?$",
            )?,
            ip_host: compile("ip_host", r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}(:\d+)?$")?,
            external_src: compile("external_src", r#"src=["'](https?://[^"']+)["']"#)?,
            form_action: compile("form_action", r#"<form[^>]*action=["'](https?://[^"']+)["']"#)?,
            settings,
            rules,
            stats: AnalyzerStats::default(),
        })
    }

    fn split_url(&self, url: &str) -> Option<UrlParts> {
        let lowered = url.to_lowercase();
        let caps = self.url_pattern.captures(&lowered)?;
        let authority = caps.get(2)?.as_str();
        // Drop any userinfo; the host is what follows the last '@'.
        let host_port = authority.rsplit('@').next().unwrap_or(authority);
        Some(UrlParts {
            scheme: caps.get(1)?.as_str().to_string(),
            host: host_port.to_string(),
            path: caps.get(3).map(|m| m.as_str()).unwrap_or("").to_string(),
            query: caps.get(4).map(|m| m.as_str()).unwrap_or("").to_string(),
        })
    }

    fn has_suspicious_tld(&self, host: &str) -> bool {
        let bare = host.split(':').next().unwrap_or(host);
        self.suspicious_tlds.iter().any(|tld| bare.ends_with(tld.as_str()))
    }

    fn analyze_url(&self, url: &str) -> (f64, Vec<Indicator>) {
        let mut score = 0.0;
        let mut indicators = Vec::new();

        let Some(parts) = self.split_url(url) else {
            indicators.push(Indicator::new(
                "url_parsing_error",
                ThreatLevel::Medium,
                "URL could not be parsed",
            ));
            return (0.2, indicators);
        };
        let host = parts.host.split(':').next().unwrap_or(&parts.host).to_string();

        if self.ip_host.is_match(&parts.host) {
            score += 0.3;
            indicators.push(Indicator::new(
                "ip_address_in_url",
                ThreatLevel::High,
                "URL contains an IP address instead of a domain name",
            ));
        }

        if self.has_suspicious_tld(&host) {
            score += 0.2;
            indicators.push(
                Indicator::new(
                    "suspicious_tld",
                    ThreatLevel::Medium,
                    format!("URL uses a suspicious TLD: {}", host),
                )
                .with_metadata("host", host.as_str()),
            );
        }

        if url.contains('@') {
            score += 0.4;
            indicators.push(Indicator::new(
                "credentials_in_url",
                ThreatLevel::High,
                "URL contains an '@', which hides the real destination behind userinfo",
            ));
        }

        for trusted in &self.trusted_domains {
            let genuine = host == *trusted || host.ends_with(&format!(".{}", trusted));
            if host.contains(trusted.as_str()) && !genuine {
                score += 0.5;
                indicators.push(
                    Indicator::new(
                        "brand_impersonation",
                        ThreatLevel::High,
                        format!("URL may be trying to impersonate {}", trusted),
                    )
                    .with_metadata("brand", trusted.as_str()),
                );
            }
        }

        if URL_SHORTENERS
            .iter()
            .any(|s| host == *s || host.ends_with(&format!(".{}", s)))
        {
            score += 0.3;
            indicators.push(Indicator::new(
                "url_shortener",
                ThreatLevel::Medium,
                "URL uses a shortening service which can hide the actual destination",
            ));
        }

        for keyword in SUSPICIOUS_KEYWORDS {
            if parts.path.contains(keyword) || parts.query.contains(keyword) {
                score += 0.1;
                indicators.push(
                    Indicator::new(
                        "suspicious_keyword",
                        ThreatLevel::Low,
                        format!("URL contains suspicious keyword: {}", keyword),
                    )
                    .with_metadata("keyword", *keyword),
                );
            }
        }

        if parts.scheme == "https" {
            score -= 0.1;
        }

        (clamp_score(score), indicators)
    }

    fn analyze_html(&self, html: &str) -> (f64, Vec<Indicator>) {
        let mut score = 0.0;
        let mut indicators = Vec::new();

        for compiled in self.rules.for_target(RuleTarget::Html) {
            if !compiled.is_match(html) {
                continue;
            }
            let weight = compiled.rule.weight;
            score += weight;
            // Non-positive weights mark signs of a legitimate page.
            let risk = if weight >= 0.5 {
                ThreatLevel::High
            } else if weight >= 0.3 {
                ThreatLevel::Medium
            } else if weight > 0.0 {
                ThreatLevel::Low
            } else {
                ThreatLevel::None
            };
            indicators.push(
                Indicator::new(
                    compiled.rule.id.as_str(),
                    risk,
                    format!("Found {} in HTML", compiled.rule.id.replace('_', " ")),
                )
                .with_metadata("weight", weight),
            );
        }

        let lowered = html.to_lowercase();

        let external = self.external_src.find_iter(&lowered).count();
        if external > 0 {
            score += 0.1;
            indicators.push(
                Indicator::new(
                    "external_resources",
                    ThreatLevel::Low,
                    format!("Page loads {} external resources", external),
                )
                .with_metadata("count", external),
            );
        }

        for caps in self.form_action.captures_iter(&lowered) {
            let action = &caps[1];
            if action.starts_with("http://") {
                score += 0.3;
                indicators.push(
                    Indicator::new(
                        "insecure_form_submission",
                        ThreatLevel::High,
                        format!("Form submits to non-HTTPS URL: {}", action),
                    )
                    .with_metadata("action", action),
                );
            }
        }

        (clamp_score(score), indicators)
    }
}

impl Analyzer for PhishingDetector {
    fn info(&self) -> AnalyzerInfo {
        AnalyzerInfo {
            name: PHISHING_DETECTOR.to_string(),
            version: VERSION.to_string(),
            description: "Phishing detection for URLs and HTML pages".to_string(),
            analyses: self.stats.analyses(),
        }
    }

    fn validate(&self, request: &Value) -> Result<(), ValidationError> {
        PhishingRequest::parse(request).map(|_| ())
    }

    fn analyze(&self, request: &Value) -> Result<Assessment, AnalysisFailure> {
        let parsed = PhishingRequest::parse(request)?;
        self.stats.record();

        let url = parsed.url();
        let html = parsed.html();
        let (url_score, mut indicators) = url.map(|u| self.analyze_url(u)).unwrap_or_default();
        let (html_score, html_indicators) = html.map(|h| self.analyze_html(h)).unwrap_or_default();
        indicators.extend(html_indicators);

        let risk_score = clamp_score(match (url, html) {
            (Some(_), Some(_)) => url_score * URL_WEIGHT + html_score * HTML_WEIGHT,
            (Some(_), None) => url_score,
            _ => html_score,
        });

        let risky = indicators.iter().filter(|i| i.risk > ThreatLevel::None).count();
        let threat_level = ThreatThresholds::STANDARD.classify(risk_score, risky);
        let by_risk = count_by_risk(&indicators);
        let total = indicators.len();
        indicators.truncate(self.settings.max_findings);

        let confidence = match (url, html) {
            (Some(_), Some(_)) => 0.9,
            _ => 0.7,
        };

        Ok(Assessment::new(threat_level, risk_score)
            .with_confidence(confidence)
            .with_detail("url_analyzed", url.is_some())
            .with_detail("html_analyzed", html.is_some())
            .with_detail("url_score", url_score)
            .with_detail("html_score", html_score)
            .with_detail("findings_count", total)
            .with_detail("findings_by_risk", json!(by_risk))
            .with_detail("findings", json!(indicators))
            .with_detail("model_version", VERSION))
    }
}
