//! Single entry point for running analyses.
//!
//! [`SecurityAnalyzer::run_analysis`] never fails: every outcome, including a
//! panicking analyzer, is normalized into an [`AnalysisResult`] envelope.

use crate::analyzers::{register_builtin, AnalyzerInfo};
use crate::config::AnalyzersConfig;
use crate::error::RegistryError;
use crate::events::{EventBus, ScanEvent};
use crate::registry::AnalyzerRegistry;
use crate::types::{AnalysisResult, ErrorReason};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

const GENERIC_FAILURE: &str = "analysis failed due to an internal error";

/// Health of one registered analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerHealth {
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate health of every registered analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub analyzers: BTreeMap<String, AnalyzerHealth>,
}

/// A registered module and whether it has been constructed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub key: String,
    pub loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<AnalyzerInfo>,
}

/// Resolves, validates and runs analyzers from a shared registry.
#[derive(Clone)]
pub struct SecurityAnalyzer {
    registry: Arc<AnalyzerRegistry>,
    events: Option<EventBus>,
}

impl SecurityAnalyzer {
    pub fn new(registry: AnalyzerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            events: None,
        }
    }

    /// Build a facade over the built-in analyzers enabled in `config`.
    pub fn from_config(config: &AnalyzersConfig) -> Result<Self, RegistryError> {
        let mut registry = AnalyzerRegistry::new();
        register_builtin(&mut registry, config)?;
        let analyzer = Self::new(registry);
        if config.preload {
            analyzer.registry.warm_up();
        }
        Ok(analyzer)
    }

    /// Publish a [`ScanEvent`] for every analysis to `bus`.
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    pub fn events(&self) -> Option<&EventBus> {
        self.events.as_ref()
    }

    /// Run the analyzer registered under `key` against `request`.
    pub fn run_analysis(&self, key: &str, request: &Value) -> AnalysisResult {
        let started = Instant::now();
        let result = self.dispatch(key, request);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if result.is_ok() {
            tracing::debug!(
                module = key,
                threat_level = ?result.threat_level,
                elapsed_ms,
                "Analysis complete"
            );
        } else {
            tracing::debug!(module = key, reason = ?result.reason, elapsed_ms, "Analysis rejected");
        }

        self.publish(&result, elapsed_ms);
        result
    }

    /// Fail a call that never reached the analyzer, e.g. an undecodable body
    /// or an expired deadline. Module resolution still comes first, so an
    /// unknown key reports `unsupported_module` regardless of `reason`.
    pub fn reject(&self, key: &str, reason: ErrorReason, message: impl Into<String>) -> AnalysisResult {
        let result = if self.registry.contains(key) {
            AnalysisResult::error(key, reason, message)
        } else {
            AnalysisResult::error(key, ErrorReason::UnsupportedModule, self.unknown_module(key))
        };
        tracing::debug!(module = key, reason = ?result.reason, "Analysis rejected");
        self.publish(&result, 0);
        result
    }

    fn unknown_module(&self, key: &str) -> String {
        RegistryError::UnknownAnalyzer {
            key: key.to_string(),
            available: self.registry.keys().join(", "),
        }
        .to_string()
    }

    fn dispatch(&self, key: &str, request: &Value) -> AnalysisResult {
        let analyzer = match self.registry.get(key) {
            Ok(analyzer) => analyzer,
            Err(e @ RegistryError::UnknownAnalyzer { .. }) => {
                return AnalysisResult::error(key, ErrorReason::UnsupportedModule, e.to_string());
            }
            Err(e) => {
                tracing::error!(module = key, error = %e, "Analyzer unavailable");
                return AnalysisResult::error(
                    key,
                    ErrorReason::AnalyzerUnavailable,
                    format!("analyzer '{}' is unavailable", key),
                );
            }
        };

        match panic::catch_unwind(AssertUnwindSafe(|| analyzer.validate(request))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return AnalysisResult::error(key, ErrorReason::InvalidInput, e.message),
            Err(payload) => {
                tracing::error!(module = key, panic = panic_message(&*payload), "Validation panicked");
                return AnalysisResult::error(key, ErrorReason::AnalysisFailed, GENERIC_FAILURE);
            }
        }

        match panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(request))) {
            Ok(Ok(assessment)) => AnalysisResult::ok(key, assessment),
            Ok(Err(e)) => {
                tracing::error!(module = key, error = %e, "Analysis failed");
                AnalysisResult::error(key, ErrorReason::AnalysisFailed, GENERIC_FAILURE)
            }
            Err(payload) => {
                tracing::error!(module = key, panic = panic_message(&*payload), "Analysis panicked");
                AnalysisResult::error(key, ErrorReason::AnalysisFailed, GENERIC_FAILURE)
            }
        }
    }

    fn publish(&self, result: &AnalysisResult, elapsed_ms: u64) {
        if let Some(bus) = &self.events {
            bus.publish(ScanEvent::from_result(result, elapsed_ms));
        }
    }

    /// Construct every analyzer and run its health probe.
    pub fn health(&self) -> HealthReport {
        let mut analyzers = BTreeMap::new();
        for key in self.registry.keys() {
            let health = match self.registry.get(&key) {
                Ok(analyzer) => {
                    let healthy = panic::catch_unwind(AssertUnwindSafe(|| analyzer.health_check()))
                        .unwrap_or(false);
                    AnalyzerHealth {
                        healthy,
                        error: (!healthy).then(|| "health check failed".to_string()),
                    }
                }
                Err(e) => AnalyzerHealth {
                    healthy: false,
                    error: Some(e.to_string()),
                },
            };
            analyzers.insert(key, health);
        }

        HealthReport {
            healthy: analyzers.values().all(|h| h.healthy),
            analyzers,
        }
    }

    /// Registered modules. Analyzers that are not loaded yet stay unloaded.
    pub fn modules(&self) -> Vec<ModuleSummary> {
        self.registry
            .keys()
            .into_iter()
            .map(|key| {
                let cached = self.registry.cached(&key);
                ModuleSummary {
                    loaded: cached.is_some(),
                    info: cached.map(|a| a.info()),
                    key,
                }
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::{Analyzer, AnalyzerStats, NetworkIdsAnalyzer, NETWORK_IDS};
    use crate::error::{AnalysisFailure, ConstructionError, ValidationError};
    use crate::types::{AnalysisStatus, Assessment, ThreatLevel};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test analyzer whose behaviour is picked by the `mode` field.
    #[derive(Default)]
    struct ScriptedAnalyzer {
        analyze_calls: Arc<AtomicUsize>,
        stats: AnalyzerStats,
    }

    impl Analyzer for ScriptedAnalyzer {
        fn info(&self) -> AnalyzerInfo {
            AnalyzerInfo {
                name: "scripted".to_string(),
                version: "0.0.1".to_string(),
                description: "test analyzer".to_string(),
                analyses: self.stats.analyses(),
            }
        }

        fn validate(&self, request: &Value) -> Result<(), ValidationError> {
            match request.get("mode").and_then(Value::as_str) {
                Some(_) => Ok(()),
                None => Err(ValidationError::field("mode", "is required")),
            }
        }

        fn analyze(&self, request: &Value) -> Result<Assessment, AnalysisFailure> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            self.stats.record();
            match request["mode"].as_str() {
                Some("fail") => Err(AnalysisFailure::InvalidState("secret internals".to_string())),
                Some("panic") => panic!("analyzer exploded"),
                _ => Ok(Assessment::new(ThreatLevel::Low, 0.1).with_detail("seen", true)),
            }
        }

        fn health_check(&self) -> bool {
            false
        }
    }

    fn facade(calls: Arc<AtomicUsize>) -> SecurityAnalyzer {
        let mut registry = AnalyzerRegistry::new();
        registry
            .register(NETWORK_IDS, || Ok(NetworkIdsAnalyzer::default()))
            .unwrap();
        registry
            .register("scripted", move || {
                Ok(ScriptedAnalyzer {
                    analyze_calls: Arc::clone(&calls),
                    ..Default::default()
                })
            })
            .unwrap();
        registry
            .register("broken", || -> Result<NetworkIdsAnalyzer, ConstructionError> {
                Err(ConstructionError::MissingDependency("model file".to_string()))
            })
            .unwrap();
        SecurityAnalyzer::new(registry)
    }

    #[test]
    fn test_network_scenario() {
        let result = facade(Arc::default()).run_analysis(
            NETWORK_IDS,
            &json!({"protocol": "TCP", "packet_size": 1000, "connection_rate": 50}),
        );
        assert_eq!(result.status, AnalysisStatus::Ok);
        assert_eq!(result.module, NETWORK_IDS);
        assert_eq!(result.threat_level, Some(ThreatLevel::None));
        assert!(result.details.is_some());
    }

    #[test]
    fn test_unsupported_module() {
        let result = facade(Arc::default()).run_analysis("nonexistent_module", &json!({}));
        assert_eq!(result.status, AnalysisStatus::Error);
        assert_eq!(result.reason, Some(ErrorReason::UnsupportedModule));
        assert!(result.error.unwrap().contains("nonexistent_module"));
    }

    #[test]
    fn test_invalid_input_skips_analysis() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = facade(Arc::clone(&calls)).run_analysis("scripted", &json!({}));
        assert_eq!(result.reason, Some(ErrorReason::InvalidInput));
        assert_eq!(result.error.as_deref(), Some("field `mode` is required"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_analysis_error_is_normalized() {
        let result = facade(Arc::default()).run_analysis("scripted", &json!({"mode": "fail"}));
        assert_eq!(result.reason, Some(ErrorReason::AnalysisFailed));
        assert!(!result.error.unwrap().contains("secret internals"));
    }

    #[test]
    fn test_panicking_analyzer_is_contained() {
        let analyzer = facade(Arc::default());
        let result = analyzer.run_analysis("scripted", &json!({"mode": "panic"}));
        assert_eq!(result.reason, Some(ErrorReason::AnalysisFailed));

        // The analyzer stays usable after a panic.
        let result = analyzer.run_analysis("scripted", &json!({"mode": "ok"}));
        assert!(result.is_ok());
        assert_eq!(result.details.unwrap()["seen"], true);
    }

    #[test]
    fn test_construction_failure_is_unavailable() {
        let result = facade(Arc::default()).run_analysis("broken", &json!({}));
        assert_eq!(result.reason, Some(ErrorReason::AnalyzerUnavailable));
    }

    #[test]
    fn test_events_are_published() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let analyzer = facade(Arc::default()).with_events(bus);

        analyzer.run_analysis("scripted", &json!({"mode": "ok"}));
        analyzer.run_analysis("nonexistent_module", &json!({}));

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.module, "scripted");
        assert_eq!(first.threat_level, Some(ThreatLevel::Low));
        assert_eq!(second.reason, Some(ErrorReason::UnsupportedModule));
    }

    #[test]
    fn test_reject_resolves_module_first() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let analyzer = facade(Arc::default()).with_events(bus);

        let known = analyzer.reject("scripted", ErrorReason::InvalidInput, "body is not JSON");
        assert_eq!(known.reason, Some(ErrorReason::InvalidInput));
        assert_eq!(known.error.as_deref(), Some("body is not JSON"));

        let unknown = analyzer.reject("nonexistent_module", ErrorReason::InvalidInput, "body is not JSON");
        assert_eq!(unknown.reason, Some(ErrorReason::UnsupportedModule));
        assert!(unknown.error.unwrap().contains("nonexistent_module"));

        assert_eq!(rx.try_recv().unwrap().reason, Some(ErrorReason::InvalidInput));
        assert_eq!(rx.try_recv().unwrap().reason, Some(ErrorReason::UnsupportedModule));
        assert!(!analyzer.registry().is_loaded("scripted"));
    }

    #[test]
    fn test_modules_do_not_instantiate() {
        let analyzer = facade(Arc::default());
        let modules = analyzer.modules();
        assert_eq!(modules.len(), 3);
        assert!(modules.iter().all(|m| !m.loaded && m.info.is_none()));
        assert_eq!(analyzer.registry().loaded_count(), 0);
    }

    #[test]
    fn test_health_reports_each_analyzer() {
        let report = facade(Arc::default()).health();
        assert!(!report.healthy);
        assert!(report.analyzers[NETWORK_IDS].healthy);
        assert!(!report.analyzers["scripted"].healthy);
        assert!(report.analyzers["broken"].error.is_some());
    }

    #[test]
    fn test_builtin_facade_is_healthy() {
        let analyzer = SecurityAnalyzer::from_config(&AnalyzersConfig::default()).unwrap();
        let report = analyzer.health();
        assert!(report.healthy);
        assert_eq!(report.analyzers.len(), 4);
    }
}
