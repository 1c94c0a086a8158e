use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::FetchError;

/// Status and body of an HTTP exchange, before any envelope handling.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, FetchError>;
    async fn post_json(&self, url: &str, body: &Value) -> Result<RawResponse, FetchError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Config(format!("http client: {}", e)))?;
        Ok(Self { client })
    }

    async fn collect(resp: reqwest::Response) -> Result<RawResponse, FetchError> {
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        Ok(RawResponse { status, body: body.to_vec() })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, FetchError> {
        let resp = self.client.get(url).send().await?;
        Self::collect(resp).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<RawResponse, FetchError> {
        let resp = self.client.post(url).json(body).send().await?;
        Self::collect(resp).await
    }
}

/// Scripted in-memory transport for tests and offline runs.
pub mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{RawResponse, Transport};
    use crate::error::FetchError;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Call {
        pub method: &'static str,
        pub url: String,
        pub body: Option<Value>,
    }

    #[derive(Debug, Clone)]
    struct Scripted {
        response: Result<RawResponse, FetchError>,
        delay: Duration,
    }

    /// Responses are keyed by URL path (query stripped) and served in the
    /// order they were queued; the last one repeats once the queue drains.
    #[derive(Default)]
    pub struct MockTransport {
        routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, path: &str, response: RawResponse) -> &Self {
            self.push(path, Ok(response), Duration::ZERO)
        }

        pub fn respond_after(&self, path: &str, delay: Duration, response: RawResponse) -> &Self {
            self.push(path, Ok(response), delay)
        }

        pub fn fail(&self, path: &str, err: FetchError) -> &Self {
            self.push(path, Err(err), Duration::ZERO)
        }

        /// Queue a `SUCCESS` envelope around `result`.
        pub fn success(&self, path: &str, result: Value) -> &Self {
            self.respond(
                path,
                RawResponse::json(200, &json!({"status": {"code": "SUCCESS", "message": "ok"}, "result": result})),
            )
        }

        fn push(&self, path: &str, response: Result<RawResponse, FetchError>, delay: Duration) -> &Self {
            if let Ok(mut routes) = self.routes.lock() {
                routes
                    .entry(path.to_string())
                    .or_default()
                    .push_back(Scripted { response, delay });
            }
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub fn call_count(&self, path: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| path_of(&c.url) == path)
                .count()
        }

        async fn serve(&self, method: &'static str, url: &str, body: Option<Value>) -> Result<RawResponse, FetchError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(Call { method, url: url.to_string(), body });
            }
            let path = path_of(url);
            let scripted = {
                let mut routes = self
                    .routes
                    .lock()
                    .map_err(|_| FetchError::Network("mock poisoned".to_string()))?;
                match routes.get_mut(&path) {
                    Some(queue) if queue.len() > 1 => queue.pop_front(),
                    Some(queue) => queue.front().cloned(),
                    None => None,
                }
            };
            let Some(scripted) = scripted else {
                return Ok(RawResponse::new(404, format!("no route for {}", path)));
            };
            if !scripted.delay.is_zero() {
                tokio::time::sleep(scripted.delay).await;
            }
            scripted.response
        }
    }

    fn path_of(url: &str) -> String {
        let without_query = url.split('?').next().unwrap_or(url);
        match url::Url::parse(without_query) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => without_query.to_string(),
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn get(&self, url: &str) -> Result<RawResponse, FetchError> {
            self.serve("GET", url, None).await
        }

        async fn post_json(&self, url: &str, body: &Value) -> Result<RawResponse, FetchError> {
            self.serve("POST", url, Some(body.clone())).await
        }
    }
}
