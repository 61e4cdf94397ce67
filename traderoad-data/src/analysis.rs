//! Boundary to the external analysis provider producing [`AnnotationDocument`]s.

use crate::{error::DataError, overlay::document::AnnotationDocument, subscription::Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::Debug;
use tracing::{debug, warn};
use url::Url;

/// Market snapshot submitted for analysis.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Human readable symbol (eg/ `BTC/USDT`).
    pub symbol: SmolStr,
    /// Uppercase timeframe (eg/ `4H`).
    pub timeframe: SmolStr,
    pub current_price: f64,
    pub latest_volume: Option<f64>,
}

impl AnalysisRequest {
    pub fn new(context: &Context, current_price: f64, latest_volume: Option<f64>) -> Self {
        Self {
            symbol: context.display_symbol(),
            timeframe: context.timeframe.label(),
            current_price,
            latest_volume,
        }
    }
}

/// Produces an [`AnnotationDocument`] for an [`AnalysisRequest`]. Prompt construction and model
/// invocation are the implementor's concern.
#[async_trait]
pub trait AnalysisProvider: Debug + Send + Sync {
    async fn analyse(&self, request: &AnalysisRequest) -> Result<AnnotationDocument, DataError>;
}

/// [`AnalysisProvider`] that POSTs the [`AnalysisRequest`] as JSON to an HTTP endpoint and parses
/// the response body with [`parse_analysis_response`].
#[derive(Clone, Debug)]
pub struct HttpAnalysisProvider {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpAnalysisProvider {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    async fn analyse(&self, request: &AnalysisRequest) -> Result<AnnotationDocument, DataError> {
        debug!(endpoint = %self.endpoint, ?request, "requesting analysis");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| DataError::Analysis(error.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|error| DataError::Analysis(error.to_string()))?;

        parse_analysis_response(&body)
    }
}

/// Parse a free-form provider response into an [`AnnotationDocument`].
///
/// The JSON is taken from the first markdown code fence if one is present and non-empty,
/// otherwise from the first `{` to the last `}`.
pub fn parse_analysis_response(text: &str) -> Result<AnnotationDocument, DataError> {
    let json = extract_json(text);

    let value = serde_json::from_str::<serde_json::Value>(json)
        .map_err(|error| DataError::Analysis(format!("response is not valid JSON: {error}")))?;

    if !value.is_object() {
        return Err(DataError::Analysis(format!(
            "response is not a JSON object: {value}"
        )));
    }

    if value.get("analisis_general").is_none() || value.get("escenarios_probables").is_none() {
        warn!("analysis response is missing key sections");
    }

    serde_json::from_value(value)
        .map_err(|error| DataError::Analysis(format!("response is not an analysis document: {error}")))
}

fn extract_json(text: &str) -> &str {
    const FENCE: &str = "```";

    let trimmed = text.trim();

    if let Some(start) = trimmed.find(FENCE) {
        let after = &trimmed[start + FENCE.len()..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find(FENCE) {
            let inner = after[..end].trim();
            if !inner.is_empty() {
                return inner;
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(first), Some(last)) if last > first => trimmed[first..=last].trim(),
        _ => trimmed,
    }
}
