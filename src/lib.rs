//! threatlens: pluggable threat analysis behind a single facade.
//!
//! Analyzers for network flows, Android packages, phishing URLs/pages and
//! LLM prompts are registered in an [`AnalyzerRegistry`], constructed lazily
//! on first use, and invoked through [`SecurityAnalyzer`], which turns every
//! outcome into an [`AnalysisResult`] envelope.

pub mod analyzers;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod facade;
pub mod registry;
pub mod reporters;
pub mod rules;
pub mod server;
pub mod types;

pub use analyzers::{Analyzer, AnalyzerInfo};
pub use config::Config;
pub use error::{AnalysisFailure, ConstructionError, RegistryError, ValidationError};
pub use events::{EventBus, ScanEvent};
pub use facade::{HealthReport, ModuleSummary, SecurityAnalyzer};
pub use registry::AnalyzerRegistry;
pub use types::{AnalysisResult, AnalysisStatus, Assessment, ErrorReason, Indicator, ThreatLevel};
