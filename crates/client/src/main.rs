//! Flowlink - headless flow monitor
//!
//! Follows a flow's event socket and logs every state change.

use anyhow::Result;
use flowlink_client::timeseries::LogSink;
use flowlink_client::{FlowClient, FlowConfig, FlowEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("flowlink_client=debug")),
        )
        .init();

    let config = FlowConfig::from_env()?;
    tracing::info!(
        "Following flow {} from {}",
        config.flow_id,
        config.page_url
    );

    let client = FlowClient::new(&config);
    let Some(mut events) = client.start().await else {
        anyhow::bail!("connection was already started");
    };

    if let Some(query) = &config.timeseries_query {
        match client.load_timeseries_into(&LogSink, "startup-query", query).await {
            Ok(count) => tracing::info!("Charted {} time-series points", count),
            Err(e) => tracing::error!("Time-series query failed: {}", e),
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(FlowEvent::StateUpdated { key, outcome }) => {
                    if let Some(entry) = client.store().read().state(&key.to_string()) {
                        tracing::info!("{} = {} ({:?})", key, entry.value, outcome);
                    }
                }
                Some(FlowEvent::EnvelopeRejected { error }) => {
                    tracing::warn!("{}", error);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    client.close().await;
    tracing::info!(
        "Closed after {} reconnects",
        client.connection().reconnect_count()
    );
    Ok(())
}
