//! Cursor pagination over a user's transaction history.
//!
//! The backend returns an opaque `nextSearchAfter` cursor with each page;
//! sending it back yields the following page. An empty or missing cursor
//! means the history is exhausted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::envelope::unwrap_response;
use crate::error::FetchError;
use crate::filters::SessionContext;
use crate::logging::{self, obj, v_str, Domain};
use crate::transport::Transport;

pub const TRANSACTION_HISTORY: &str = "/api/analysis/transaction-history";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub timestamp: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub transaction_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    #[serde(default)]
    transactions: Vec<Transaction>,
    #[serde(default)]
    next_search_after: Option<Vec<Value>>,
}

/// The inputs whose identity decides when pagination starts over.
#[derive(Debug, Clone, PartialEq)]
pub struct PageParams {
    pub context: SessionContext,
    pub user_id: Option<i64>,
    pub refresh: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageState {
    pub transactions: Vec<Transaction>,
    pub search_after: Option<Vec<Value>>,
    pub has_more: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            transactions: Vec::new(),
            search_after: None,
            has_more: true,
            is_loading: false,
            error: None,
        }
    }
}

pub struct InfiniteTransactions {
    transport: Arc<dyn Transport>,
    base: String,
    params: Mutex<Option<PageParams>>,
    state: Mutex<PageState>,
    generation: AtomicU64,
}

impl InfiniteTransactions {
    pub fn new(transport: Arc<dyn Transport>, base: impl Into<String>) -> Self {
        Self {
            transport,
            base: base.into(),
            params: Mutex::new(None),
            state: Mutex::new(PageState::default()),
            generation: AtomicU64::new(0),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> PageState {
        self.lock_state().clone()
    }

    /// Install new parameters. When they differ from the current ones the
    /// list and cursor are dropped and the first page is fetched; returns
    /// whether that happened.
    pub async fn set_params(&self, params: PageParams) -> bool {
        {
            let mut current = self.params.lock().unwrap_or_else(|p| p.into_inner());
            if current.as_ref() == Some(&params) {
                return false;
            }
            *current = Some(params.clone());
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.lock_state() = PageState::default();
        self.fetch_page(None).await;
        true
    }

    /// Fetch the next page. No-op while a fetch is in flight or once the
    /// history is exhausted.
    pub async fn load_more(&self) {
        let cursor = {
            let st = self.lock_state();
            if st.is_loading || !st.has_more {
                return;
            }
            st.search_after.clone()
        };
        self.fetch_page(cursor).await;
    }

    async fn fetch_page(&self, cursor: Option<Vec<Value>>) {
        let Some(params) = self.params.lock().ok().and_then(|p| p.clone()) else {
            return;
        };
        let ctx = &params.context;
        let (Some(user_id), Some(session_id), Some(start)) = (
            params.user_id,
            ctx.session_id.clone(),
            ctx.filters.date_range.start_str(),
        ) else {
            self.lock_state().has_more = false;
            return;
        };

        let generation = self.generation.load(Ordering::SeqCst);
        {
            let mut st = self.lock_state();
            if st.is_loading {
                return;
            }
            st.is_loading = true;
            st.error = None;
        }

        let first_page = cursor.is_none();
        let body = json!({
            "sessionId": session_id,
            "durationStart": start,
            "durationEnd": ctx.filters.date_range.end_str(),
            "userId": user_id,
            "searchAfter": cursor,
        });
        let url = format!("{}{}", self.base.trim_end_matches('/'), TRANSACTION_HISTORY);
        let result = self.request(&url, &body).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            logging::debug(Domain::Page, "stale_page", obj(&[("user_id", json!(user_id))]));
            return;
        }

        let mut st = self.lock_state();
        st.is_loading = false;
        match result {
            Ok(page) => {
                let count = page.transactions.len();
                if first_page {
                    st.transactions = page.transactions;
                } else {
                    st.transactions.extend(page.transactions);
                }
                st.has_more = page
                    .next_search_after
                    .as_ref()
                    .map(|c| !c.is_empty())
                    .unwrap_or(false);
                st.search_after = page.next_search_after;
                logging::debug(
                    Domain::Page,
                    "page_loaded",
                    obj(&[("count", json!(count)), ("total", json!(st.transactions.len()))]),
                );
            }
            Err(err) => {
                logging::warn(
                    Domain::Page,
                    "page_failed",
                    obj(&[("msg", v_str(&err.to_string()))]),
                );
                st.error = Some(err.to_string());
                st.has_more = false;
            }
        }
    }

    async fn request(&self, url: &str, body: &Value) -> Result<Page, FetchError> {
        let resp = self.transport.post_json(url, body).await?;
        let result = unwrap_response(resp.status, &resp.body)?;
        if result.is_null() {
            return Ok(Page { transactions: Vec::new(), next_search_after: None });
        }
        Ok(serde_json::from_value(result)?)
    }
}
