//! Dataset downloads: fixed schemas, custom column selections and the
//! blob request that produces the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::FetchError;
use crate::filters::SessionContext;
use crate::logging::{self, obj, v_str, Domain};
use crate::query::Params;
use crate::storage::{ExportEntry, StateStore};
use crate::transport::Transport;

pub const EXPORT: &str = "/api/transactions/export";
pub const DOWNLOAD_FAILED: &str = "file download failed";

pub const RAW_COLUMNS: [&str; 14] = [
    "transactionId",
    "userId",
    "timestamp",
    "transactionType",
    "detailType",
    "category",
    "subcategory",
    "counterparty",
    "amount",
    "channel",
    "balanceBefore",
    "balanceAfter",
    "description",
    "memo",
];

// Column names are the backend's, typos included.
pub const AGGREGATED_COLUMNS: [&str; 8] = [
    "userId",
    "period",
    "totalSpent",
    "avgTxn",
    "foodRatio",
    "transportRatio",
    "leisureRatio",
    "imcomeVsSepnding",
];

pub const MASKED_COLUMNS: [&str; 6] = [
    "transactionId",
    "userId",
    "timestamp",
    "amount",
    "category",
    "channel",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Raw,
    Aggregated,
    Masked,
    Custom,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Raw => "raw",
            DatasetKind::Aggregated => "aggregated",
            DatasetKind::Masked => "masked",
            DatasetKind::Custom => "custom",
        }
    }

    /// Fixed schema, or `None` for custom selections.
    pub fn schema(&self) -> Option<&'static [&'static str]> {
        match self {
            DatasetKind::Raw => Some(&RAW_COLUMNS[..]),
            DatasetKind::Aggregated => Some(&AGGREGATED_COLUMNS[..]),
            DatasetKind::Masked => Some(&MASKED_COLUMNS[..]),
            DatasetKind::Custom => None,
        }
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(DatasetKind::Raw),
            "aggregated" => Ok(DatasetKind::Aggregated),
            "masked" => Ok(DatasetKind::Masked),
            "custom" => Ok(DatasetKind::Custom),
            other => Err(format!("unknown dataset: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown format: {}", other)),
        }
    }
}

/// Preset column picks (snake_case, as shown to the user).
pub fn preset(name: &str) -> Vec<&'static str> {
    match name {
        "researcher" => vec!["timestamp", "amount", "category"],
        "business" => vec!["user_id", "channel", "amount"],
        "marketing" => vec!["category", "sub_category", "amount", "timestamp"],
        "policy" => vec!["period", "total_spent", "income_vs_spending"],
        "fintech" => vec!["transaction_type", "channel", "amount", "balance_after"],
        _ => Vec::new(),
    }
}

pub fn snake_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('_', Some(&next)) if next.is_ascii_lowercase() => {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub session_id: String,
    pub format: ExportFormat,
    pub columns: Vec<String>,
    pub is_aggregated: bool,
    pub is_masked: bool,
    pub duration_start: Option<String>,
    pub duration_end: Option<String>,
}

impl ExportRequest {
    /// Build the body; custom selections are converted to camelCase.
    pub fn build(
        ctx: &SessionContext,
        kind: DatasetKind,
        format: ExportFormat,
        custom_columns: &[String],
    ) -> Result<Self, FetchError> {
        let session_id = ctx
            .session_id
            .clone()
            .ok_or_else(|| FetchError::Config("no active session".to_string()))?;
        let columns = match kind.schema() {
            Some(schema) => schema.iter().map(|c| c.to_string()).collect(),
            None => custom_columns.iter().map(|c| snake_to_camel(c)).collect(),
        };
        let range = &ctx.filters.date_range;
        Ok(Self {
            session_id,
            format,
            columns,
            is_aggregated: kind == DatasetKind::Aggregated,
            is_masked: kind == DatasetKind::Masked,
            duration_start: range.start_str(),
            duration_end: range.end_str(),
        })
    }
}

pub fn file_name(kind: DatasetKind, format: ExportFormat) -> String {
    format!("transactions_{}.{}", kind.as_str(), format.extension())
}

/// Request the export and return the raw file bytes.
pub async fn download(
    transport: &dyn Transport,
    base: &str,
    request: &ExportRequest,
) -> Result<Vec<u8>, FetchError> {
    let params = Params::new()
        .with("sessionId", request.session_id.as_str())
        .with("format", request.format.as_str());
    let body = serde_json::to_value(request)?;
    let resp = transport.post_json(&params.url(base, EXPORT), &body).await?;
    if !resp.is_success() {
        logging::warn(
            Domain::Export,
            "download_failed",
            obj(&[("status", json!(resp.status))]),
        );
        return Err(FetchError::Application(DOWNLOAD_FAILED.to_string()));
    }
    Ok(resp.body)
}

/// Write `bytes` to `{dir}/transactions_{kind}.{ext}` and log the export.
pub fn save(
    dir: &Path,
    kind: DatasetKind,
    format: ExportFormat,
    bytes: &[u8],
    store: Option<&mut StateStore>,
) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name(kind, format));
    fs::write(&path, bytes)?;
    let digest = hex::encode(Sha256::digest(bytes));

    if let Some(store) = store {
        store.record_export(&ExportEntry {
            ts: chrono::Utc::now().timestamp(),
            kind: kind.as_str().to_string(),
            format: format.as_str().to_string(),
            path: path.to_string_lossy().to_string(),
            bytes: bytes.len() as i64,
            sha256: digest.clone(),
        })?;
    }
    logging::info(
        Domain::Export,
        "saved",
        obj(&[
            ("path", v_str(&path.to_string_lossy())),
            ("bytes", json!(bytes.len())),
            ("sha256", v_str(&digest)),
        ]),
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::DateRange;
    use crate::transport::mock::MockTransport;
    use crate::transport::RawResponse;

    fn ctx() -> SessionContext {
        SessionContext::new(
            Some("s1".into()),
            DateRange::parse(Some("2025-10-02"), Some("2025-10-09")).unwrap(),
        )
    }

    #[test]
    fn test_snake_to_camel() {
        assert_eq!(snake_to_camel("balance_after"), "balanceAfter");
        assert_eq!(snake_to_camel("sub_category"), "subCategory");
        assert_eq!(snake_to_camel("amount"), "amount");
        assert_eq!(snake_to_camel("trailing_"), "trailing_");
    }

    #[test]
    fn test_fixed_schema_body() {
        let req = ExportRequest::build(&ctx(), DatasetKind::Masked, ExportFormat::Csv, &[]).unwrap();
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["format"], "CSV");
        assert_eq!(body["isMasked"], true);
        assert_eq!(body["isAggregated"], false);
        assert_eq!(body["columns"].as_array().unwrap().len(), MASKED_COLUMNS.len());
        assert_eq!(body["durationStart"], "2025-10-02");
    }

    #[test]
    fn test_custom_columns_from_preset() {
        let cols: Vec<String> = preset("fintech").iter().map(|c| c.to_string()).collect();
        let req = ExportRequest::build(&ctx(), DatasetKind::Custom, ExportFormat::Json, &cols).unwrap();
        assert_eq!(req.columns, vec!["transactionType", "channel", "amount", "balanceAfter"]);
        assert!(preset("unknown").is_empty());
    }

    #[test]
    fn test_requires_session() {
        let no_session = SessionContext::new(None, DateRange::default());
        assert!(ExportRequest::build(&no_session, DatasetKind::Raw, ExportFormat::Csv, &[]).is_err());
    }

    #[tokio::test]
    async fn test_download_and_save() {
        let mock = MockTransport::new();
        mock.respond(EXPORT, RawResponse::new(200, "a,b\n1,2\n"));
        let req = ExportRequest::build(&ctx(), DatasetKind::Raw, ExportFormat::Csv, &[]).unwrap();
        let bytes = download(&mock, "http://b", &req).await.unwrap();
        assert!(mock.calls()[0].url.ends_with("/api/transactions/export?sessionId=s1&format=CSV"));

        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::in_memory().unwrap();
        let path = save(dir.path(), DatasetKind::Raw, ExportFormat::Csv, &bytes, Some(&mut store)).unwrap();
        assert!(path.ends_with("transactions_raw.csv"));
        assert_eq!(fs::read(&path).unwrap(), bytes);
        let logged = store.exports().unwrap();
        assert_eq!(logged[0].bytes, 8);
        assert_eq!(logged[0].sha256.len(), 64);
    }

    #[tokio::test]
    async fn test_download_failure() {
        let mock = MockTransport::new();
        mock.respond(EXPORT, RawResponse::new(500, ""));
        let req = ExportRequest::build(&ctx(), DatasetKind::Raw, ExportFormat::Json, &[]).unwrap();
        let err = download(&mock, "http://b", &req).await.unwrap_err();
        assert_eq!(err.to_string(), DOWNLOAD_FAILED);
    }
}
