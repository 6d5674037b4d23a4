//! HTTP access to the flow structure and time-series endpoints.

use std::time::Duration;

use flowlink_shared::{
    AddressContext, ApiError, FullStructAndStates, TimeseriesPoint, FULL_STRUCT_AND_STATES_PATH,
    TIMESERIES_PATH,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How component paths are turned into request URLs.
#[derive(Debug, Clone)]
enum Endpoint {
    /// Route through the page's address context (tenant gateway on TLS).
    Context(AddressContext),
    /// Plain base URL, e.g. for talking to a flow service directly.
    Base(String),
}

/// HTTP client for the flow API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    endpoint: Endpoint,
    timeout: Duration,
}

impl ApiClient {
    /// Client that resolves URLs from the page's address context.
    pub fn new(context: AddressContext) -> Self {
        Self {
            client: Client::new(),
            endpoint: Endpoint::Context(context),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Client that joins component paths onto a fixed base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: Endpoint::Base(base_url.into()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self, path: &str) -> String {
        match &self.endpoint {
            Endpoint::Context(ctx) => ctx.http_url(path),
            Endpoint::Base(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{base}/{path}")
            }
        }
    }

    fn map_send_error(e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }

    async fn read_json<TRes: DeserializeOwned>(
        url: &str,
        resp: reqwest::Response,
    ) -> Result<TRes, ApiError> {
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if status != 200 {
            tracing::error!("{} returned error code = {}", url, status);
            return Err(ApiError::Http { status, body: text });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// GET a JSON document.
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::read_json(&url, resp).await
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let url = self.url(path);
        let body_bytes =
            serde_json::to_vec(body).map_err(|e| ApiError::Serialize(e.to_string()))?;

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .body(body_bytes)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::read_json(&url, resp).await
    }

    /// Full registry structure with states.
    pub async fn load_full_struct_and_states(&self) -> Result<FullStructAndStates, ApiError> {
        self.get_json(FULL_STRUCT_AND_STATES_PATH).await
    }

    /// Run a time-series query. The query object is passed through as-is.
    pub async fn load_timeseries<Q: Serialize + ?Sized>(
        &self,
        query: &Q,
    ) -> Result<Vec<TimeseriesPoint>, ApiError> {
        self.post_json(TIMESERIES_PATH, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use url::Url;

    #[test]
    fn base_url_joins_with_single_slash() {
        let client = ApiClient::with_base_url("http://localhost:8083/");
        assert_eq!(
            client.url(FULL_STRUCT_AND_STATES_PATH),
            "http://localhost:8083/api/flow/context/full_struct_and_states"
        );
    }

    #[tokio::test]
    async fn unserializable_body_is_a_serialize_error() {
        // Nothing listens here; the body fails before any request is sent.
        let client = ApiClient::with_base_url("http://127.0.0.1:1");
        let body: HashMap<(i32, i32), i32> = HashMap::from([((1, 2), 3)]);

        let err = client
            .post_json::<_, serde_json::Value>(TIMESERIES_PATH, &body)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Serialize(_)), "got {err:?}");
    }

    #[test]
    fn context_urls_go_through_the_gateway() {
        let page = Url::parse("https://hub.example.com/x/tenant42/dashboard?s=1").unwrap();
        let client = ApiClient::new(AddressContext::from_page_url(&page, "flow7"));
        assert_eq!(
            client.url(TIMESERIES_PATH),
            "https://hub.example.com/cloud/tenant42/flow/timeseries/rest?s=1"
        );
    }
}
