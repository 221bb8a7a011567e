//! Output formatting for the CLI.

use crate::facade::{HealthReport, ModuleSummary};
use crate::types::{AnalysisResult, ThreatLevel};
use anyhow::Result;
use colored::{ColoredString, Colorize};
use serde_json::Value;
use std::io::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {} (expected text or json)", s)),
        }
    }
}

fn colored_level(level: ThreatLevel) -> ColoredString {
    let label = level.as_str().to_uppercase();
    match level {
        ThreatLevel::Critical => label.bright_red().bold(),
        ThreatLevel::High => label.red(),
        ThreatLevel::Medium => label.yellow(),
        ThreatLevel::Low => label.blue(),
        ThreatLevel::None => label.green(),
    }
}

/// Write an analysis result in the requested format.
pub fn report<W: Write>(result: &AnalysisResult, format: OutputFormat, writer: &mut W) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *writer, result)?;
            writeln!(writer)?;
        }
        OutputFormat::Text => report_text(result, writer)?,
    }
    Ok(())
}

fn report_text<W: Write>(result: &AnalysisResult, writer: &mut W) -> Result<()> {
    if !result.is_ok() {
        let reason = result.reason.map(|r| r.to_string()).unwrap_or_default();
        writeln!(
            writer,
            "{} {} ({})",
            result.module.bold(),
            "ERROR".red().bold(),
            reason
        )?;
        if let Some(ref message) = result.error {
            writeln!(writer, "  {}", message)?;
        }
        return Ok(());
    }

    let level = result.threat_level.unwrap_or(ThreatLevel::None);
    writeln!(writer, "{} {}", result.module.bold(), "OK".green().bold())?;
    write!(
        writer,
        "Threat level: {}   Risk score: {:.2}",
        colored_level(level),
        result.risk_score.unwrap_or(0.0)
    )?;
    if let Some(confidence) = result.confidence {
        write!(writer, "   Confidence: {:.2}", confidence)?;
    }
    writeln!(writer)?;

    let Some(ref details) = result.details else {
        return Ok(());
    };

    for (key, value) in details {
        if matches!(key.as_str(), "findings" | "findings_by_risk" | "anomaly_scores") {
            continue;
        }
        match value {
            Value::Null => {}
            Value::String(s) => writeln!(writer, "  {:<20} {}", key.dimmed(), s)?,
            other => writeln!(writer, "  {:<20} {}", key.dimmed(), other)?,
        }
    }

    let findings = details
        .get("findings")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if findings.is_empty() {
        writeln!(writer, "\n{}", "No findings.".green())?;
        return Ok(());
    }

    writeln!(writer, "\n{}", "Findings".bold().underline())?;
    for finding in findings {
        let risk = finding
            .get("risk")
            .and_then(Value::as_str)
            .and_then(|r| r.parse::<ThreatLevel>().ok())
            .unwrap_or(ThreatLevel::Low);
        writeln!(
            writer,
            "  [{}] {} - {}",
            colored_level(risk),
            finding.get("kind").and_then(Value::as_str).unwrap_or("unknown").bright_cyan(),
            finding.get("description").and_then(Value::as_str).unwrap_or("")
        )?;
    }
    Ok(())
}

/// Write the module listing.
pub fn report_modules<W: Write>(modules: &[ModuleSummary], json: bool, writer: &mut W) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *writer, modules)?;
        writeln!(writer)?;
        return Ok(());
    }

    writeln!(writer, "{}", "Available Modules".bold().underline())?;
    writeln!(writer)?;
    for module in modules {
        let state = if module.loaded { "loaded".green() } else { "not loaded".dimmed() };
        writeln!(writer, "  {} [{}]", module.key.bright_cyan(), state)?;
    }
    writeln!(writer)?;
    writeln!(writer, "Total: {} modules", modules.len())?;
    Ok(())
}

/// Write a health report.
pub fn report_health<W: Write>(health: &HealthReport, format: OutputFormat, writer: &mut W) -> Result<()> {
    if format == OutputFormat::Json {
        serde_json::to_writer_pretty(&mut *writer, health)?;
        writeln!(writer)?;
        return Ok(());
    }

    for (key, status) in &health.analyzers {
        let label = if status.healthy { "healthy".green() } else { "unhealthy".red() };
        write!(writer, "  {:<20} {}", key, label)?;
        if let Some(ref error) = status.error {
            write!(writer, " ({})", error.dimmed())?;
        }
        writeln!(writer)?;
    }
    let overall = if health.healthy { "healthy".green().bold() } else { "degraded".red().bold() };
    writeln!(writer, "\nOverall: {}", overall)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Assessment, ErrorReason, Indicator};
    use serde_json::json;

    fn render(result: &AnalysisResult, format: OutputFormat) -> String {
        colored::control::set_override(false);
        let mut out = Vec::new();
        report(result, format, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_text_report_lists_findings() {
        let indicator = Indicator::new("suspicious_tld", ThreatLevel::Medium, "URL uses a suspicious TLD");
        let assessment = Assessment::new(ThreatLevel::Medium, 0.3)
            .with_detail("findings", json!([indicator]))
            .with_detail("url_analyzed", true);
        let text = render(&AnalysisResult::ok("phishing_detector", assessment), OutputFormat::Text);
        assert!(text.contains("Threat level: MEDIUM"));
        assert!(text.contains("[MEDIUM] suspicious_tld - URL uses a suspicious TLD"));
        assert!(text.contains("url_analyzed"));
    }

    #[test]
    fn test_text_report_error() {
        let result = AnalysisResult::error("apk_analyzer", ErrorReason::InvalidInput, "field `permissions` missing");
        let text = render(&result, OutputFormat::Text);
        assert!(text.contains("ERROR (invalid_input)"));
        assert!(text.contains("field `permissions` missing"));
    }

    #[test]
    fn test_json_report_is_envelope() {
        let result = AnalysisResult::ok("network_ids", Assessment::new(ThreatLevel::None, 0.0));
        let parsed: Value = serde_json::from_str(&render(&result, OutputFormat::Json)).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["threat_level"], "none");
    }
}
