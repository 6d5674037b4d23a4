//! Client configuration from environment variables.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use flowlink_shared::AddressContext;
use url::Url;

use crate::ws::ReconnectConfig;

const DEFAULT_PAGE_URL: &str = "http://localhost:8083/flow/ui";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Everything needed to talk to one flow.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// URL of the page the client is running under (navigation context).
    pub page_url: Url,
    pub flow_id: String,
    pub reconnect: ReconnectConfig,
    pub http_timeout: Duration,
    /// Time-series query to chart once at startup, if any.
    pub timeseries_query: Option<serde_json::Value>,
}

impl FlowConfig {
    pub fn new(page_url: Url, flow_id: impl Into<String>) -> Self {
        Self {
            page_url,
            flow_id: flow_id.into(),
            reconnect: ReconnectConfig::default(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            timeseries_query: None,
        }
    }

    /// Parse configuration from the process environment.
    ///
    /// Environment variables:
    /// - `FLOWLINK_PAGE_URL`: page URL (default: "http://localhost:8083/flow/ui")
    /// - `FLOWLINK_FLOW_ID`: flow identifier (required)
    /// - `FLOWLINK_RECONNECT_INITIAL_MS`: first reconnect delay (default: 1000)
    /// - `FLOWLINK_RECONNECT_MAX_MS`: backoff ceiling (default: 30000)
    /// - `FLOWLINK_RECONNECT_MULTIPLIER`: backoff factor (default: 2.0)
    /// - `FLOWLINK_RECONNECT_MAX_ATTEMPTS`: 0 for unlimited (default: 0)
    /// - `FLOWLINK_HTTP_TIMEOUT_SECS`: per-request timeout (default: 10)
    /// - `FLOWLINK_TIMESERIES_QUERY`: JSON query to chart at startup (optional)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let page_url = lookup("FLOWLINK_PAGE_URL").unwrap_or_else(|| DEFAULT_PAGE_URL.to_string());
        let page_url = Url::parse(&page_url)
            .with_context(|| format!("FLOWLINK_PAGE_URL is not a valid URL: {page_url}"))?;

        let flow_id = lookup("FLOWLINK_FLOW_ID")
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow!("FLOWLINK_FLOW_ID must be set"))?;

        let defaults = ReconnectConfig::default();
        let reconnect = ReconnectConfig {
            initial_delay_ms: parse_or(
                &lookup,
                "FLOWLINK_RECONNECT_INITIAL_MS",
                defaults.initial_delay_ms,
            )?,
            max_delay_ms: parse_or(&lookup, "FLOWLINK_RECONNECT_MAX_MS", defaults.max_delay_ms)?,
            backoff_multiplier: parse_or(
                &lookup,
                "FLOWLINK_RECONNECT_MULTIPLIER",
                defaults.backoff_multiplier,
            )?,
            max_attempts: parse_or(
                &lookup,
                "FLOWLINK_RECONNECT_MAX_ATTEMPTS",
                defaults.max_attempts,
            )?,
        };

        let http_timeout = Duration::from_secs(parse_or(
            &lookup,
            "FLOWLINK_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);

        let timeseries_query = lookup("FLOWLINK_TIMESERIES_QUERY")
            .map(|raw| {
                serde_json::from_str::<serde_json::Value>(&raw)
                    .with_context(|| format!("FLOWLINK_TIMESERIES_QUERY is not valid JSON: {raw}"))
            })
            .transpose()?;

        Ok(Self {
            page_url,
            flow_id,
            reconnect,
            http_timeout,
            timeseries_query,
        })
    }

    pub fn address_context(&self) -> AddressContext {
        AddressContext::from_page_url(&self.page_url, self.flow_id.clone())
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}
