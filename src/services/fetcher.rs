//! Bounded JSON fetching.
//!
//! One GET, one timeout, no retries. Anything outside 2xx, a timeout, or a
//! body that is not JSON is reported as a [`FetchError`].

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::time::Duration;

use crate::errors::FetchError;

/// Client-side timeout applied to every upstream request.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can fetch a JSON document from a URL.
///
/// Coordinators, the qualifying resolver and the weather sensor receive an
/// `Arc<dyn JsonFetcher>` so tests can substitute a canned implementation.
pub trait JsonFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str, timeout: Duration)
        -> BoxFuture<'a, Result<Value, FetchError>>;
}

/// reqwest-backed fetcher. Sends an identifying `User-Agent` on every request,
/// which met.no requires and Ergast tolerates.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| FetchError::Transport(format!("Invalid User-Agent: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(FetchError::from)?;

        Ok(Self { client })
    }

    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).timeout(timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        // The request timeout also covers reading the body.
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| FetchError::Transport(format!("malformed JSON body: {}", e)))
    }
}

impl JsonFetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Value, FetchError>> {
        Box::pin(self.get_json(url, timeout))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Canned fetcher for unit tests that do not need a mock HTTP server.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct StubFetcher {
        responses: Mutex<HashMap<String, Result<Value, FetchError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub(crate) fn with(self, url: &str, response: Result<Value, FetchError>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), response);
            self
        }

        pub(crate) fn set(&self, url: &str, response: Result<Value, FetchError>) {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), response);
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl JsonFetcher for StubFetcher {
        fn fetch<'a>(
            &'a self,
            url: &'a str,
            _timeout: Duration,
        ) -> BoxFuture<'a, Result<Value, FetchError>> {
            self.calls.lock().unwrap().push(url.to_string());
            let result = self
                .responses
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or(Err(FetchError::HttpStatus(404)));
            Box::pin(async move { result })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/current.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"MRData": {}})))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("f1-sensor-test").unwrap();
        let url = format!("{}/current.json", server.uri());
        let value = fetcher.fetch(&url, FETCH_TIMEOUT).await.unwrap();
        assert_eq!(value, json!({"MRData": {}}));
    }

    #[tokio::test]
    async fn test_fetch_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .and(header("user-agent", "f1-sensor-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("f1-sensor-test").unwrap();
        let url = format!("{}/compact", server.uri());
        assert!(fetcher.fetch(&url, FETCH_TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("f1-sensor-test").unwrap();
        let url = format!("{}/current.json", server.uri());
        let err = fetcher.fetch(&url, FETCH_TIMEOUT).await.unwrap_err();
        assert_eq!(err, FetchError::HttpStatus(503));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("f1-sensor-test").unwrap();
        let url = format!("{}/slow", server.uri());
        let err = fetcher
            .fetch(&url, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("f1-sensor-test").unwrap();
        let url = format!("{}/current.json", server.uri());
        let err = fetcher.fetch(&url, FETCH_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)), "got {:?}", err);
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        assert!(HttpFetcher::new("bad\nagent").is_err());
    }
}
