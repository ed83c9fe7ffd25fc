//! AWS Lambda entry point for climb stats
//!
//! Deploy with `cargo lambda build --release --features lambda`
//! and subscribe the function to log document writes.

use std::sync::Arc;

use climb_stats::lambda::{handler, init_aggregator, load_lambda_config};
use lambda_runtime::{Error as LambdaError, LambdaEvent, service_fn};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, reload, util::SubscriberInitExt};

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    let rust_log = EnvFilter::try_from_default_env().ok();
    let has_rust_log = rust_log.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(rust_log.unwrap_or_else(|| EnvFilter::new("info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Climb stats Lambda starting...");

    let config = load_lambda_config().await?;
    // RUST_LOG wins over `logging.level`.
    if !has_rust_log {
        filter_handle.reload(EnvFilter::new(config.logging.filter(false)))?;
    }

    // Built once per instance and reused across warm invocations.
    let aggregator = Arc::new(init_aggregator(config).await?);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let aggregator = Arc::clone(&aggregator);
        async move { handler(&aggregator, event).await }
    }))
    .await
}
