// src/lambda/mod.rs

//! AWS Lambda handler for log write events.
//!
//! Each invocation carries one write to `climbs/{climbId}/logs/{logId}`:
//! 1. Parses the change event (invalid payloads are rejected, not retried)
//! 2. Recomputes the climb's stats from all of its logs
//! 3. Reports the outcome; transient failures are returned as errors so the
//!    platform redelivers the event

use std::time::Instant;

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use tracing::{Span, error, field, info, instrument, warn};

use crate::aggregator::{AggregateOutcome, StatAggregator};
use crate::config::{RemoteConfigLoader, env_config, open_store};
use crate::error::Result;
use crate::feed::ChangeEvent;
use crate::models::{Config, StoreConfig};
use crate::storage::s3::S3Store;

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogWriteResponse {
    /// Whether the event was handled
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub climb_id: Option<String>,

    /// `updated`, `orphaned` or `purged`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ascent_count: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_rating: Option<f64>,

    /// Error message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl LogWriteResponse {
    fn from_outcome(outcome: &AggregateOutcome) -> Self {
        let stats = outcome.stats();
        Self {
            success: true,
            climb_id: Some(outcome.climb_id().to_string()),
            outcome: Some(outcome.label().to_string()),
            ascent_count: stats.map(|s| s.ascent_count),
            avg_rating: stats.map(|s| s.avg_rating),
            ..Default::default()
        }
    }
}

/// Configuration for this Lambda instance.
///
/// Reads `{CONFIG_S3_PREFIX}/config.toml` from `S3_BUCKET` when the prefix is
/// set, otherwise starts from defaults. Environment overrides apply either way.
pub async fn load_lambda_config() -> Result<Config> {
    match std::env::var("CONFIG_S3_PREFIX") {
        Ok(prefix) => {
            let base = env_config();
            let config_store = S3Store::from_config(&StoreConfig {
                prefix: String::new(),
                ..base.store
            })
            .await?;
            Ok(RemoteConfigLoader::new(config_store, &prefix)
                .load_or_default()
                .await)
        }
        Err(_) => Ok(env_config()),
    }
}

/// Build the aggregator for this Lambda instance.
pub async fn init_aggregator(config: Config) -> Result<StatAggregator> {
    config.validate()?;

    info!(
        "Store backend {:?}, orphan policy {}, serialize per climb {}",
        config.store.backend, config.aggregator.orphan_policy, config.aggregator.serialize_per_climb
    );

    let store = open_store(&config.store).await?;
    Ok(StatAggregator::new(store, config.aggregator))
}

/// Main Lambda handler function.
#[instrument(skip(aggregator, event), fields(request_id = field::Empty, climb_id = field::Empty))]
pub async fn handler(
    aggregator: &StatAggregator,
    event: LambdaEvent<Value>,
) -> std::result::Result<LogWriteResponse, LambdaError> {
    let (payload, context) = event.into_parts();
    Span::current().record("request_id", context.request_id.as_str());
    process_event(aggregator, payload).await
}

/// Handle one raw event payload.
pub async fn process_event(
    aggregator: &StatAggregator,
    payload: Value,
) -> std::result::Result<LogWriteResponse, LambdaError> {
    let start = Instant::now();

    let event: ChangeEvent = match serde_json::from_value(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!("Rejecting invalid log write event: {}", e);
            return Ok(LogWriteResponse {
                error: Some(e.to_string()),
                execution_time_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            });
        }
    };

    let climb_id = event.climb_id().to_string();
    Span::current().record("climb_id", climb_id.as_str());
    info!(climb_id = %climb_id, kind = %event.kind(), "Handling log write {}", event.path());

    match aggregator.handle(&event).await {
        Ok(outcome) => {
            let mut response = LogWriteResponse::from_outcome(&outcome);
            response.execution_time_ms = start.elapsed().as_millis() as u64;
            info!(
                climb_id = %climb_id,
                outcome = outcome.label(),
                "Log write handled in {}ms",
                response.execution_time_ms
            );
            Ok(response)
        }
        Err(e) if e.is_retryable() => {
            error!(climb_id = %climb_id, "Failed to update climb stats: {}", e);
            Err(e.into())
        }
        Err(e) => {
            error!(climb_id = %climb_id, "Log write rejected: {}", e);
            Ok(LogWriteResponse {
                climb_id: Some(climb_id),
                error: Some(e.to_string()),
                execution_time_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::models::AggregatorConfig;
    use crate::storage::{DocPath, DocumentStore, MemoryStore};

    async fn aggregator_with_climb() -> StatAggregator {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                &DocPath::climb("c1").unwrap(),
                json!({"name": "Dyno", "grade": "Pink Tag (V8+)"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
        store
            .set(
                &DocPath::parse("climbs/c1/logs/u1").unwrap(),
                json!({"rating": 5}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        StatAggregator::new(store, AggregatorConfig::default())
    }

    #[tokio::test]
    async fn test_updated_response() {
        let aggregator = aggregator_with_climb().await;
        let payload = json!({"path": "climbs/c1/logs/u1", "after": {"rating": 5}});

        let response = process_event(&aggregator, payload).await.unwrap();
        assert!(response.success);
        assert_eq!(response.outcome.as_deref(), Some("updated"));
        assert_eq!(response.ascent_count, Some(1));
        assert_eq!(response.avg_rating, Some(5.0));

        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["climbId"], "c1");
        assert!(body.get("executionTimeMs").is_some());
    }

    #[tokio::test]
    async fn test_invalid_payload_not_retried() {
        let aggregator = aggregator_with_climb().await;
        let payload = json!({"path": "climbs/c1", "after": {}});

        let response = process_event(&aggregator, payload).await.unwrap();
        assert!(!response.success);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn test_orphaned_write_succeeds() {
        let aggregator = aggregator_with_climb().await;
        let payload = json!({"path": "climbs/gone/logs/u1", "after": {"rating": 2}});

        let response = process_event(&aggregator, payload).await.unwrap();
        assert!(response.success);
        assert_eq!(response.outcome.as_deref(), Some("orphaned"));
        assert!(response.ascent_count.is_none());
    }

    #[tokio::test]
    async fn test_init_rejects_invalid_config() {
        let mut config = Config::default();
        config.logging.level = String::new();
        assert!(init_aggregator(config).await.is_err());
    }
}
