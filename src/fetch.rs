//! Fetch-transform cycle for envelope endpoints.
//!
//! A `Fetcher` owns the `{data, is_loading, error}` triple for one view.
//! Each request is tagged with a generation number; a response that comes
//! back after a newer request was issued is dropped, so a slow early
//! response can never overwrite a later one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::envelope::unwrap_response;
use crate::error::FetchError;
use crate::logging::{self, obj, v_str, Domain};
use crate::query::Params;
use crate::record::Record;
use crate::transport::Transport;

/// What to fetch. `endpoint == None` means "do not fetch"; bumping
/// `refresh` forces a refetch of an otherwise unchanged request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchRequest {
    pub endpoint: Option<String>,
    pub params: Params,
    pub refresh: u64,
}

impl FetchRequest {
    pub fn new(endpoint: &str, params: Params) -> Self {
        Self { endpoint: Some(endpoint.to_string()), params, refresh: 0 }
    }

    /// Endpoint only when `params` is present, the shape views use to wait
    /// for a session before fetching.
    pub fn when_ready(endpoint: &str, params: Option<Params>, refresh: u64) -> Self {
        match params {
            Some(params) => Self { endpoint: Some(endpoint.to_string()), params, refresh },
            None => Self { endpoint: None, params: Params::new(), refresh },
        }
    }

    pub fn with_refresh(mut self, refresh: u64) -> Self {
        self.refresh = refresh;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchState<T> {
    pub data: Option<T>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Bumped every time `data` is replaced.
    pub version: u64,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self { data: None, is_loading: true, error: None, version: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The response was applied to the state.
    Applied,
    /// A newer request superseded this one; its response was dropped.
    Stale,
    /// Nothing was requested (no endpoint, or unchanged request on `sync`).
    Skipped,
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    base: String,
    generation: AtomicU64,
    state: Mutex<FetchState<Value>>,
    last: Mutex<Option<FetchRequest>>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, base: impl Into<String>) -> Self {
        Self {
            transport,
            base: base.into(),
            generation: AtomicU64::new(0),
            state: Mutex::new(FetchState::default()),
            last: Mutex::new(None),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, FetchState<Value>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> FetchState<Value> {
        self.lock_state().clone()
    }

    /// Current data decoded into `T`; `None` when unset or not a `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        let data = self.lock_state().data.clone()?;
        serde_json::from_value(data).ok()
    }

    /// Fetch only when `request` differs from the last one seen, the way a
    /// view refetches when its dependencies change.
    pub async fn sync(&self, request: &FetchRequest) -> Outcome {
        let unchanged = self
            .last
            .lock()
            .map(|last| last.as_ref() == Some(request))
            .unwrap_or(false);
        if unchanged {
            return Outcome::Skipped;
        }
        self.fetch(request).await
    }

    /// Fetch unconditionally.
    pub async fn fetch(&self, request: &FetchRequest) -> Outcome {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(request.clone());
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(endpoint) = request.endpoint.as_deref() else {
            self.lock_state().is_loading = false;
            return Outcome::Skipped;
        };

        {
            let mut st = self.lock_state();
            st.is_loading = true;
            st.error = None;
        }

        let url = request.params.url(&self.base, endpoint);
        logging::debug(
            Domain::Fetch,
            "request",
            obj(&[("endpoint", v_str(endpoint)), ("generation", json!(generation))]),
        );
        let result = match self.transport.get(&url).await {
            Ok(resp) => unwrap_response(resp.status, &resp.body),
            Err(err) => Err(err),
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            logging::debug(
                Domain::Fetch,
                "stale_response",
                obj(&[("endpoint", v_str(endpoint)), ("generation", json!(generation))]),
            );
            return Outcome::Stale;
        }

        let mut st = self.lock_state();
        match result {
            Ok(value) => {
                st.data = Some(value);
                st.version += 1;
            }
            Err(err) => {
                logging::warn(
                    Domain::Fetch,
                    "request_failed",
                    obj(&[("endpoint", v_str(endpoint)), ("msg", v_str(&err.to_string()))]),
                );
                st.error = Some(err.to_string());
            }
        }
        st.is_loading = false;
        Outcome::Applied
    }
}

/// Pure reshaping of a raw `result` payload into chart rows.
pub type Transform = Arc<dyn Fn(&Value) -> anyhow::Result<Vec<Record>> + Send + Sync>;

/// A `Fetcher` plus a transform; transform failures degrade to no rows.
pub struct ChartFetcher {
    fetcher: Fetcher,
    transform: Transform,
    cache: Mutex<Option<(u64, Vec<Record>)>>,
}

impl ChartFetcher {
    pub fn new(fetcher: Fetcher, transform: Transform) -> Self {
        Self { fetcher, transform, cache: Mutex::new(None) }
    }

    pub async fn sync(&self, request: &FetchRequest) -> Outcome {
        self.fetcher.sync(request).await
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Outcome {
        self.fetcher.fetch(request).await
    }

    /// Rows for the current raw data, recomputed only when the data changed.
    pub fn state(&self) -> FetchState<Vec<Record>> {
        let raw = self.fetcher.state();
        let rows = match &raw.data {
            None => Vec::new(),
            Some(value) => self.transformed(raw.version, value),
        };
        FetchState {
            data: Some(rows),
            is_loading: raw.is_loading,
            error: raw.error,
            version: raw.version,
        }
    }

    fn transformed(&self, version: u64, value: &Value) -> Vec<Record> {
        if let Ok(cache) = self.cache.lock() {
            if let Some((v, rows)) = cache.as_ref() {
                if *v == version {
                    return rows.clone();
                }
            }
        }
        let rows = match (self.transform)(value) {
            Ok(rows) => rows,
            Err(err) => {
                logging::warn(
                    Domain::Fetch,
                    "transform_failed",
                    obj(&[("msg", v_str(&err.to_string()))]),
                );
                Vec::new()
            }
        };
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some((version, rows.clone()));
        }
        rows
    }
}

/// One-shot GET of an envelope endpoint, for callers that do not keep view
/// state.
pub async fn get_result(
    transport: &dyn Transport,
    base: &str,
    endpoint: &str,
    params: &Params,
) -> Result<Value, FetchError> {
    let resp = transport.get(&params.url(base, endpoint)).await?;
    unwrap_response(resp.status, &resp.body)
}
