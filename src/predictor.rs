// Predictor client (C8)
//
// POSTs a stats snapshot to a remote predictor and applies its per-source
// target-index response. Any I/O or decode failure is swallowed by the
// caller (the allocator core), which falls back to the greedy algorithm.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::layer::EndpointId;

/// RL fallback default when a peer is missing from the predictor's
/// response; interpreted as a conservative mid layer index (spec.md §6).
pub const DEFAULT_TARGET_INDEX: i64 = 5;

#[derive(Debug, Clone)]
pub struct PredictorResponse {
    pub use_rl: bool,
    pub target_indices: HashMap<EndpointId, i64>,
}

impl PredictorResponse {
    pub fn target_for(&self, endpoint: &EndpointId) -> i64 {
        self.target_indices.get(endpoint).copied().unwrap_or(DEFAULT_TARGET_INDEX)
    }
}

/// Parses the predictor's wire response:
/// `{ "useRL": 0|1, "<peer_endpoint_id>": <int>, ... }`.
pub fn parse_predictor_response(body: &Value) -> Option<PredictorResponse> {
    let object = body.as_object()?;
    let use_rl = object.get("useRL")?.as_i64()? == 1;

    let mut target_indices = HashMap::new();
    for (key, value) in object {
        if key == "useRL" {
            continue;
        }
        if let Some(index) = value.as_i64() {
            target_indices.insert(EndpointId::new(key.clone()), index);
        }
    }

    Some(PredictorResponse { use_rl, target_indices })
}

/// Client contract for delegating the allocation decision to a remote
/// predictor. A trait so tests can stub network behavior.
#[async_trait]
pub trait PredictorClient: Send + Sync {
    async fn predict(&self, document: Value) -> Option<PredictorResponse>;
}

/// Production implementation: blocking-equivalent POST with a strict
/// wall-clock timeout, so the allocator's critical section (§5) stays
/// bounded.
pub struct HttpPredictorClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpPredictorClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self { client: reqwest::Client::new(), url: url.into(), timeout }
    }
}

#[async_trait]
impl PredictorClient for HttpPredictorClient {
    async fn predict(&self, document: Value) -> Option<PredictorResponse> {
        let request = self.client.post(&self.url).json(&document).send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                tracing::debug!("predictor request failed: {}", err);
                return None;
            }
            Err(_) => {
                tracing::debug!("predictor request timed out after {:?}", self.timeout);
                return None;
            }
        };

        let body = match tokio::time::timeout(self.timeout, response.json::<Value>()).await {
            Ok(Ok(body)) => body,
            Ok(Err(err)) => {
                tracing::info!("predictor response decode failed: {}", err);
                return None;
            }
            Err(_) => {
                tracing::debug!("predictor response read timed out after {:?}", self.timeout);
                return None;
            }
        };

        match parse_predictor_response(&body) {
            Some(parsed) if parsed.use_rl => Some(parsed),
            _ => None,
        }
    }
}

/// A predictor that never returns a prediction; used when no predictor
/// URL is configured, so the allocator always takes the greedy path.
pub struct NoPredictor;

#[async_trait]
impl PredictorClient for NoPredictor {
    async fn predict(&self, _document: Value) -> Option<PredictorResponse> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_use_rl_and_peer_targets() {
        let body = json!({ "useRL": 1, "ep-a": 2, "ep-b": 0 });
        let parsed = parse_predictor_response(&body).unwrap();
        assert!(parsed.use_rl);
        assert_eq!(parsed.target_for(&EndpointId::new("ep-a")), 2);
        assert_eq!(parsed.target_for(&EndpointId::new("ep-b")), 0);
    }

    #[test]
    fn missing_peer_defaults_to_mid_layer() {
        let body = json!({ "useRL": 1 });
        let parsed = parse_predictor_response(&body).unwrap();
        assert_eq!(parsed.target_for(&EndpointId::new("ep-missing")), DEFAULT_TARGET_INDEX);
    }

    #[test]
    fn use_rl_zero_is_parsed_but_callers_should_ignore() {
        let body = json!({ "useRL": 0, "ep-a": 2 });
        let parsed = parse_predictor_response(&body).unwrap();
        assert!(!parsed.use_rl);
    }

    #[test]
    fn malformed_body_returns_none() {
        let body = json!([1, 2, 3]);
        assert!(parse_predictor_response(&body).is_none());
    }

    #[tokio::test]
    async fn no_predictor_always_falls_back() {
        let client = NoPredictor;
        assert!(client.predict(json!({})).await.is_none());
    }
}
