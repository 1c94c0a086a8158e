//! View filters and the explicit session context every request is built from.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::query::Params;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start: Some(start), end: Some(end) }
    }

    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, FetchError> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map_err(|e| FetchError::Config(format!("bad date {:?}: {}", s, e)))
        };
        let range = Self {
            start: start.map(parse).transpose()?,
            end: end.map(parse).transpose()?,
        };
        if let (Some(s), Some(e)) = (range.start, range.end) {
            if e < s {
                return Err(FetchError::Config(format!("range end {} precedes start {}", e, s)));
            }
        }
        Ok(range)
    }

    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn start_str(&self) -> Option<String> {
        self.start.map(|d| d.format(DATE_FORMAT).to_string())
    }

    pub fn end_str(&self) -> Option<String> {
        self.end.map(|d| d.format(DATE_FORMAT).to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Filters {
    pub date_range: DateRange,
}

/// The session id and the window it is analysed over, passed explicitly to
/// every fetch instead of being read from ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionContext {
    pub session_id: Option<String>,
    pub filters: Filters,
}

impl SessionContext {
    pub fn new(session_id: Option<String>, range: DateRange) -> Self {
        Self { session_id, filters: Filters { date_range: range } }
    }

    /// True when there is enough to query: a session and a range start.
    pub fn is_ready(&self) -> bool {
        self.session_id.is_some() && self.filters.date_range.start.is_some()
    }

    /// `sessionId`, `durationStart`, `durationEnd` and, for a per-user view,
    /// `userId`. Missing values stay null and drop out of the query string.
    pub fn params(&self, user_id: Option<i64>) -> Params {
        let range = &self.filters.date_range;
        Params::new()
            .with("sessionId", self.session_id.clone())
            .with("durationStart", range.start_str())
            .with("durationEnd", range.end_str())
            .with("userId", user_id)
    }

    /// Like `params`, but `None` when the context is not ready; callers pass
    /// the result straight to a fetch so an unready view never hits the wire.
    pub fn ready_params(&self, user_id: Option<i64>) -> Option<Params> {
        self.is_ready().then(|| self.params(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_inverted_range() {
        assert!(DateRange::parse(Some("2025-07-10"), Some("2025-07-01")).is_err());
        let ok = DateRange::parse(Some("2025-07-01"), None).unwrap();
        assert!(!ok.is_complete());
    }

    #[test]
    fn params_skip_absent_user() {
        let range = DateRange::parse(Some("2025-07-01"), Some("2025-07-31")).unwrap();
        let ctx = SessionContext::new(Some("s1".into()), range);
        assert_eq!(
            ctx.params(None).to_query_string(),
            "sessionId=s1&durationStart=2025-07-01&durationEnd=2025-07-31"
        );
        assert!(ctx.params(Some(7)).to_query_string().ends_with("&userId=7"));
    }

    #[test]
    fn unready_context_yields_no_params() {
        let ctx = SessionContext::new(None, DateRange::default());
        assert!(ctx.ready_params(None).is_none());
    }
}
