//! Keyed analyzer registry with lazy, cached construction.

use crate::analyzers::Analyzer;
use crate::error::{ConstructionError, RegistryError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// Builds a fresh analyzer instance.
pub type AnalyzerConstructor =
    Box<dyn Fn() -> Result<Arc<dyn Analyzer>, ConstructionError> + Send + Sync>;

struct Binding {
    constructor: AnalyzerConstructor,
    /// Serializes first construction for this key.
    creation: Mutex<()>,
}

/// Maps analyzer keys to constructors and caches the instances they build.
///
/// Constructors are bound at startup through `&mut self`; lookups go through
/// `&self` and are safe to share across threads. An instance is built at
/// most once per key until [`AnalyzerRegistry::reset`], and failed
/// constructions are never cached.
pub struct AnalyzerRegistry {
    bindings: HashMap<String, Binding>,
    cache: RwLock<HashMap<String, Arc<dyn Analyzer>>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Bind `key` to a constructor. Fails if the key is already bound.
    pub fn register<A, F>(&mut self, key: impl Into<String>, constructor: F) -> Result<(), RegistryError>
    where
        A: Analyzer + 'static,
        F: Fn() -> Result<A, ConstructionError> + Send + Sync + 'static,
    {
        let key = key.into();
        if self.bindings.contains_key(&key) {
            return Err(RegistryError::DuplicateKey(key));
        }

        let constructor: AnalyzerConstructor =
            Box::new(move || constructor().map(|a| Arc::new(a) as Arc<dyn Analyzer>));
        tracing::debug!(analyzer = %key, "Registered analyzer");
        self.bindings.insert(
            key,
            Binding {
                constructor,
                creation: Mutex::new(()),
            },
        );
        Ok(())
    }

    /// Return the cached instance for `key`, constructing it on first use.
    pub fn get(&self, key: &str) -> Result<Arc<dyn Analyzer>, RegistryError> {
        if let Some(analyzer) = self.cached(key) {
            return Ok(analyzer);
        }

        let binding = self
            .bindings
            .get(key)
            .ok_or_else(|| RegistryError::UnknownAnalyzer {
                key: key.to_string(),
                available: self.keys().join(", "),
            })?;

        let _guard = binding.creation.lock().unwrap_or_else(|e| e.into_inner());

        // Another caller may have finished construction while we waited.
        if let Some(analyzer) = self.cached(key) {
            return Ok(analyzer);
        }

        let started = Instant::now();
        let analyzer = (binding.constructor)().map_err(|source| {
            tracing::error!(analyzer = key, error = %source, "Failed to initialize analyzer");
            RegistryError::Construction {
                key: key.to_string(),
                source,
            }
        })?;
        tracing::info!(
            analyzer = key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Initialized analyzer"
        );

        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), Arc::clone(&analyzer));
        Ok(analyzer)
    }

    /// Construct every registered analyzer. Returns the failures; successful
    /// ones stay cached.
    pub fn warm_up(&self) -> Vec<RegistryError> {
        self.keys()
            .iter()
            .filter_map(|key| self.get(key).err())
            .inspect(|e| tracing::warn!("Skipping analyzer during warm-up: {}", e))
            .collect()
    }

    /// Drop every cached instance. Constructors stay registered.
    pub fn reset(&self) {
        self.cache.write().unwrap_or_else(|e| e.into_inner()).clear();
        tracing::info!("Cleared analyzer cache");
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.bindings.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.cached(key).is_some()
    }

    /// The cached instance, without constructing it.
    pub fn cached(&self, key: &str) -> Option<Arc<dyn Analyzer>> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn loaded_count(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::{AnalyzerInfo, AnalyzerStats};
    use crate::error::{AnalysisFailure, ValidationError};
    use crate::types::{Assessment, ThreatLevel};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingAnalyzer {
        stats: AnalyzerStats,
    }

    impl Analyzer for CountingAnalyzer {
        fn info(&self) -> AnalyzerInfo {
            AnalyzerInfo {
                name: "counting".to_string(),
                version: "0.0.1".to_string(),
                description: "test analyzer".to_string(),
                analyses: self.stats.analyses(),
            }
        }

        fn validate(&self, _request: &Value) -> Result<(), ValidationError> {
            Ok(())
        }

        fn analyze(&self, _request: &Value) -> Result<Assessment, AnalysisFailure> {
            self.stats.record();
            Ok(Assessment::new(ThreatLevel::None, 0.0))
        }
    }

    fn registry_with_counter(builds: Arc<AtomicUsize>) -> AnalyzerRegistry {
        let mut registry = AnalyzerRegistry::new();
        registry
            .register("counting", move || {
                builds.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                Ok(CountingAnalyzer::default())
            })
            .unwrap();
        registry
    }

    #[test]
    fn test_get_returns_same_instance() {
        let registry = registry_with_counter(Arc::new(AtomicUsize::new(0)));
        let first = registry.get("counting").ok().unwrap();
        let second = registry.get("counting").ok().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first.analyze(&Value::Null).unwrap();
        assert_eq!(second.info().analyses, 1);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let registry = registry_with_counter(Arc::new(AtomicUsize::new(0)));
        let err = registry.get("nonexistent").err().unwrap();
        match err {
            RegistryError::UnknownAnalyzer { key, available } => {
                assert_eq!(key, "nonexistent");
                assert_eq!(available, "counting");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = registry_with_counter(Arc::new(AtomicUsize::new(0)));
        let err = registry
            .register("counting", || Ok(CountingAnalyzer::default()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateKey(ref k) if k == "counting"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_first_get_constructs_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let registry = registry_with_counter(Arc::clone(&builds));

        let instances: Vec<Arc<dyn Analyzer>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.get("counting").ok().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_reset_forces_reconstruction() {
        let builds = Arc::new(AtomicUsize::new(0));
        let registry = registry_with_counter(Arc::clone(&builds));

        let before = registry.get("counting").ok().unwrap();
        registry.reset();
        assert!(!registry.is_loaded("counting"));
        assert!(registry.contains("counting"));

        let after = registry.get("counting").ok().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_construction_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let mut registry = AnalyzerRegistry::new();
        registry
            .register("flaky", move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ConstructionError::MissingDependency("model weights".to_string()))
                } else {
                    Ok(CountingAnalyzer::default())
                }
            })
            .unwrap();

        let err = registry.get("flaky").err().unwrap();
        assert!(matches!(err, RegistryError::Construction { ref key, .. } if key == "flaky"));
        assert!(!registry.is_loaded("flaky"));

        assert!(registry.get("flaky").is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_warm_up_reports_failures_and_keeps_successes() {
        let mut registry = AnalyzerRegistry::new();
        registry
            .register("good", || Ok(CountingAnalyzer::default()))
            .unwrap();
        registry
            .register("broken", || -> Result<CountingAnalyzer, ConstructionError> {
                Err(ConstructionError::InvalidSettings("bad".to_string()))
            })
            .unwrap();

        let failures = registry.warm_up();
        assert_eq!(failures.len(), 1);
        assert!(registry.is_loaded("good"));
        assert_eq!(registry.loaded_count(), 1);
    }
}
