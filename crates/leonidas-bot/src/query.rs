//! Generic JSON POST helper for integrations.
//!
//! Failures never propagate: they come back as `{"error": "<message>"}`.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use leonidas_core::config::QueryConfig;

#[derive(Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    api_key: String,
    default_url: Option<String>,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("default_url", &self.default_url)
            .finish()
    }
}

impl QueryClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key: api_key.into(),
            default_url: None,
        }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        let mut client = Self::new(config.api_key.clone());
        client.default_url = config.api_url.clone();
        client
    }

    /// POST `payload` to `api_url` and return the decoded JSON reply.
    pub async fn query(&self, api_url: &str, payload: &Value) -> Value {
        debug!(url = api_url, "query request");
        match self.try_query(api_url, payload).await {
            Ok(value) => value,
            Err(e) => {
                warn!(url = api_url, error = %e, "query failed");
                json!({ "error": e.to_string() })
            }
        }
    }

    /// [`query`](Self::query) against the configured URL.
    pub async fn query_default(&self, payload: &Value) -> Value {
        match self.default_url.as_deref() {
            Some(url) => self.query(url, payload).await,
            None => json!({ "error": "no query apiUrl configured" }),
        }
    }

    async fn try_query(&self, api_url: &str, payload: &Value) -> anyhow::Result<Value> {
        let resp = self
            .http
            .post(api_url)
            .header("Authorization", &self.api_key)
            .json(payload)
            .send()
            .await?;
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_query_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/summarize"))
            .and(header("Authorization", "hf_key"))
            .and(body_json(json!({ "inputs": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "summary_text": "hi" }])))
            .mount(&server)
            .await;

        let client = QueryClient::new("hf_key");
        let result = client
            .query(&format!("{}/models/summarize", server.uri()), &json!({ "inputs": "hello" }))
            .await;
        assert_eq!(result[0]["summary_text"], "hi");
    }

    #[tokio::test]
    async fn test_error_status_body_is_returned_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "error": "loading" })))
            .mount(&server)
            .await;

        let result = QueryClient::new("k").query(&server.uri(), &json!({})).await;
        assert_eq!(result, json!({ "error": "loading" }));
    }

    #[tokio::test]
    async fn test_non_json_body_folds_into_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = QueryClient::new("k").query(&server.uri(), &json!({})).await;
        assert!(result["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_transport_error_folds_into_error() {
        let result = QueryClient::new("k")
            .query("http://127.0.0.1:1/unreachable", &json!({}))
            .await;
        assert!(result["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_query_default_without_url() {
        let client = QueryClient::from_config(&QueryConfig::default());
        let result = client.query_default(&json!({})).await;
        assert_eq!(result["error"], "no query apiUrl configured");
    }
}
