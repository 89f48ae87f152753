//! Loki HTTP client

use super::wire::QueryRangeResponse;
use super::{QueryClient, RangeQuery};
use crate::matrix::Matrix;
use crate::{Error, Result};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Path of the metric range query endpoint
pub const QUERY_RANGE_PATH: &str = "/loki/api/v1/query_range";

/// Loki client configuration
#[derive(Debug, Clone, Default)]
pub struct LokiClientConfig {
    /// Base URL, e.g. `http://localhost:3100`. May already end with
    /// [`QUERY_RANGE_PATH`] and may carry extra query parameters.
    pub base_url: String,
    /// Basic auth user; auth is only sent when non-empty
    pub username: Option<String>,
    pub password: Option<String>,
    /// Whole-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl LokiClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Client for Loki's `query_range` API.
#[derive(Debug, Clone)]
pub struct LokiClient {
    http_client: Client,
    endpoint: Url,
    username: Option<String>,
    password: Option<String>,
}

impl LokiClient {
    pub fn new(config: LokiClientConfig) -> Result<Self> {
        let endpoint = query_range_url(&config.base_url)?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        Ok(Self {
            http_client,
            endpoint,
            username: config.username.filter(|u| !u.is_empty()),
            password: config.password,
        })
    }

    /// Endpoint requests are sent to, without per-query parameters.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Full request URL for a query.
    pub fn request_url(&self, query: &RangeQuery) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("query", &query.query)
            .append_pair("start", &unix_nanos(query.start).to_string())
            .append_pair("end", &unix_nanos(query.end).to_string())
            .append_pair("step", &format_step(query.step));
        url
    }
}

#[async_trait]
impl QueryClient for LokiClient {
    async fn query_range(&self, query: &RangeQuery) -> Result<Matrix> {
        let url = self.request_url(query);
        debug!(query = %query.query, step = ?query.step, "Querying Loki");

        let mut request = self.http_client.get(url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(Error::Query(format!(
                "loki http {}: {}",
                status.as_u16(),
                body
            )));
        }

        let decoded: QueryRangeResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Serialization(format!("decode loki response: {}", e)))?;
        let matrix = decoded.into_matrix()?;
        debug!(series = matrix.len(), "Loki query returned");
        Ok(matrix)
    }
}

fn query_range_url(base: &str) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| Error::Config(format!("invalid loki url {:?}: {}", base, e)))?;
    if url.cannot_be_a_base() {
        return Err(Error::Config(format!("invalid loki url {:?}", base)));
    }
    if !url.path().ends_with(QUERY_RANGE_PATH) {
        let path = format!("{}{}", url.path().trim_end_matches('/'), QUERY_RANGE_PATH);
        url.set_path(&path);
    }
    Ok(url)
}

fn unix_nanos(time: DateTime<Utc>) -> i128 {
    time.timestamp() as i128 * 1_000_000_000 + time.timestamp_subsec_nanos() as i128
}

/// Step as decimal seconds with no trailing zeros, e.g. `60` or `0.5`.
fn format_step(step: Duration) -> String {
    format!("{}", step.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn query() -> RangeQuery {
        RangeQuery::new(
            r#"sum(rate({app="x"}[1m]))"#,
            Utc.timestamp_opt(1_000, 0).unwrap(),
            Utc.timestamp_opt(2_000, 0).unwrap(),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_path_appended_once() {
        for base in [
            "http://loki:3100",
            "http://loki:3100/",
            "http://loki:3100/loki/api/v1/query_range",
        ] {
            let url = query_range_url(base).unwrap();
            assert_eq!(url.as_str(), "http://loki:3100/loki/api/v1/query_range", "{base}");
        }

        let prefixed = query_range_url("http://gw/tenant-a/").unwrap();
        assert_eq!(prefixed.path(), "/tenant-a/loki/api/v1/query_range");
    }

    #[test]
    fn test_request_url_keeps_base_params() {
        let client = LokiClient::new(LokiClientConfig::new("http://loki:3100?orgId=7")).unwrap();
        let url = client.request_url(&query());

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("orgId".to_string(), "7".to_string()));
        assert!(pairs.contains(&("start".to_string(), "1000000000000".to_string())));
        assert!(pairs.contains(&("end".to_string(), "2000000000000".to_string())));
        assert!(pairs.contains(&("step".to_string(), "60".to_string())));
        assert!(pairs.contains(&("query".to_string(), query().query)));
    }

    #[test]
    fn test_format_step() {
        assert_eq!(format_step(Duration::from_secs(60)), "60");
        assert_eq!(format_step(Duration::from_millis(500)), "0.5");
        assert_eq!(format_step(Duration::from_secs(5400)), "5400");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = LokiClient::new(LokiClientConfig::new("not a url")).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_empty_username_disables_auth() {
        let client =
            LokiClient::new(LokiClientConfig::new("http://loki:3100").with_basic_auth("", "pw"))
                .unwrap();
        assert!(client.username.is_none());
    }
}
