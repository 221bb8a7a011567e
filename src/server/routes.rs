use super::AppState;
use crate::analyzers::{APK_ANALYZER, LLM_ABUSE_DETECTOR, NETWORK_IDS, PHISHING_DETECTOR};
use crate::types::{AnalysisResult, ErrorReason};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

type Body = Result<Json<Value>, JsonRejection>;

/// Map a short module alias to its registry key. Unknown names pass through.
pub fn resolve_module(name: &str) -> &str {
    match name {
        "network" => NETWORK_IDS,
        "apk" => APK_ANALYZER,
        "phishing" => PHISHING_DETECTOR,
        "llm" => LLM_ABUSE_DETECTOR,
        other => other,
    }
}

/// HTTP status for an envelope.
pub fn status_for(result: &AnalysisResult) -> StatusCode {
    match result.reason {
        None => StatusCode::OK,
        Some(ErrorReason::UnsupportedModule) => StatusCode::NOT_FOUND,
        Some(ErrorReason::InvalidInput) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(ErrorReason::AnalysisFailed) => StatusCode::INTERNAL_SERVER_ERROR,
        Some(ErrorReason::AnalyzerUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
        Some(ErrorReason::Timeout) => StatusCode::GATEWAY_TIMEOUT,
    }
}

async fn run(state: &AppState, key: &str, body: Body) -> (StatusCode, Json<AnalysisResult>) {
    let result = match body {
        Ok(Json(request)) => run_blocking(state, key, request).await,
        Err(rejection) => state
            .analyzer
            .reject(key, ErrorReason::InvalidInput, rejection.body_text()),
    };
    (status_for(&result), Json(result))
}

async fn run_blocking(state: &AppState, key: &str, request: Value) -> AnalysisResult {
    let analyzer = state.analyzer.clone();
    let module = key.to_string();
    let task = tokio::task::spawn_blocking(move || analyzer.run_analysis(&module, &request));

    match tokio::time::timeout(state.timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            tracing::error!(module = key, error = %e, "Analysis task failed");
            state
                .analyzer
                .reject(key, ErrorReason::AnalysisFailed, "analysis task failed")
        }
        Err(_) => {
            tracing::warn!(module = key, timeout_ms = state.timeout.as_millis() as u64, "Analysis timed out");
            // The blocking task keeps running; its own completion event follows this one.
            state.analyzer.reject(
                key,
                ErrorReason::Timeout,
                format!("analysis did not finish within {} ms", state.timeout.as_millis()),
            )
        }
    }
}

pub async fn analyze(
    State(state): State<AppState>,
    Path(module): Path<String>,
    body: Body,
) -> (StatusCode, Json<AnalysisResult>) {
    run(&state, resolve_module(&module), body).await
}

pub async fn detect_phishing(State(state): State<AppState>, body: Body) -> (StatusCode, Json<AnalysisResult>) {
    run(&state, PHISHING_DETECTOR, body).await
}

pub async fn detect_llm_abuse(State(state): State<AppState>, body: Body) -> (StatusCode, Json<AnalysisResult>) {
    run(&state, LLM_ABUSE_DETECTOR, body).await
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let analyzer = state.analyzer.clone();
    match tokio::task::spawn_blocking(move || analyzer.health()).await {
        Ok(report) => {
            let status = if report.healthy {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(json!(report)))
        }
        Err(e) => {
            tracing::error!(error = %e, "Health check task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "healthy": false, "error": "health check failed" })),
            )
        }
    }
}

pub async fn models(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "modules": state.analyzer.modules() }))
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_module_aliases() {
        assert_eq!(resolve_module("network"), NETWORK_IDS);
        assert_eq!(resolve_module("llm"), LLM_ABUSE_DETECTOR);
        assert_eq!(resolve_module("apk_analyzer"), APK_ANALYZER);
        assert_eq!(resolve_module("unknown"), "unknown");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ErrorReason::UnsupportedModule, StatusCode::NOT_FOUND),
            (ErrorReason::InvalidInput, StatusCode::UNPROCESSABLE_ENTITY),
            (ErrorReason::AnalysisFailed, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorReason::AnalyzerUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (ErrorReason::Timeout, StatusCode::GATEWAY_TIMEOUT),
        ];
        for (reason, status) in cases {
            assert_eq!(status_for(&AnalysisResult::error("m", reason, "x")), status);
        }
    }
}
