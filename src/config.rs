//! TOML configuration for the service and the built-in analyzers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the working directory by [`Config::load_default`].
pub const DEFAULT_CONFIG_FILE: &str = "threatlens.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub analyzers: AnalyzersConfig,
}

/// HTTP service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
    /// Upper bound on a single analysis, in milliseconds.
    pub analysis_timeout_ms: u64,
    /// Buffered scan events per feed subscriber before it starts lagging.
    pub feed_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            cors_origins: Vec::new(),
            analysis_timeout_ms: 10_000,
            feed_capacity: 256,
        }
    }
}

/// Which analyzers are registered and how they are tuned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzersConfig {
    /// Analyzer keys to register at startup.
    pub enabled: Vec<String>,
    /// Construct every analyzer before accepting traffic instead of on first use.
    pub preload: bool,
    /// Directory with extra JSON pattern rules.
    pub rules_dir: Option<PathBuf>,
    pub network_ids: NetworkIdsSettings,
    pub apk_analyzer: ApkSettings,
    pub phishing_detector: PhishingSettings,
    pub llm_abuse_detector: LlmAbuseSettings,
}

impl Default for AnalyzersConfig {
    fn default() -> Self {
        Self {
            enabled: crate::analyzers::BUILTIN_KEYS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            preload: false,
            rules_dir: None,
            network_ids: NetworkIdsSettings::default(),
            apk_analyzer: ApkSettings::default(),
            phishing_detector: PhishingSettings::default(),
            llm_abuse_detector: LlmAbuseSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkIdsSettings {
    /// Packets per second above which traffic counts as a flood.
    pub high_packet_rate: f64,
    /// Average packet size (bytes) above which traffic looks like bulk exfiltration.
    pub oversized_packet_bytes: f64,
}

impl Default for NetworkIdsSettings {
    fn default() -> Self {
        Self {
            high_packet_rate: 1000.0,
            oversized_packet_bytes: 1500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApkSettings {
    pub max_findings: usize,
    /// Permissions flagged in addition to the built-in list.
    pub extra_suspicious_permissions: Vec<String>,
}

impl Default for ApkSettings {
    fn default() -> Self {
        Self {
            max_findings: 50,
            extra_suspicious_permissions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhishingSettings {
    pub max_findings: usize,
    /// Brands whose look-alike hosts are flagged, in addition to the built-in list.
    pub trusted_domains: Vec<String>,
    /// Top-level domains flagged in addition to the built-in list.
    pub suspicious_tlds: Vec<String>,
}

impl Default for PhishingSettings {
    fn default() -> Self {
        Self {
            max_findings: 50,
            trusted_domains: Vec::new(),
            suspicious_tlds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmAbuseSettings {
    pub max_findings: usize,
    /// Prompts longer than this many characters are flagged.
    pub max_prompt_length: usize,
}

impl Default for LlmAbuseSettings {
    fn default() -> Self {
        Self {
            max_findings: 20,
            max_prompt_length: 1000,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load `./threatlens.toml`, then `<config dir>/threatlens/config.toml`,
    /// falling back to defaults.
    pub fn load_default() -> Self {
        for candidate in Self::default_locations() {
            if !candidate.exists() {
                continue;
            }
            match Self::load(&candidate) {
                Ok(config) => {
                    tracing::debug!("Loaded config from {:?}", candidate);
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Ignoring config {:?}: {:#}", candidate, e);
                }
            }
        }
        Self::default()
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            locations.push(dir.join("threatlens").join("config.toml"));
        }
        locations
    }
}

/// Render the default configuration as a commented TOML document.
pub fn generate_default_config() -> Result<String> {
    let body =
        toml::to_string_pretty(&Config::default()).context("failed to serialize default config")?;
    Ok(format!(
        "# threatlens configuration\n\
         #\n\
         # [analyzers].enabled lists the analyzer keys registered at startup.\n\
         # Set [analyzers].rules_dir to load extra JSON pattern rules.\n\n{}",
        body
    ))
}
