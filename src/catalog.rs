//! Named chart sources: endpoint, extra query parameters, result transform
//! and the chart the dashboard draws by default.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};

use crate::chart::{Aggregation, ChartConfig, ChartType};
use crate::fetch::Transform;
use crate::query::Params;
use crate::record::{record, records_from_value, Record};

pub struct Source {
    pub name: &'static str,
    pub endpoint: &'static str,
    pub extra: &'static [(&'static str, &'static str)],
    pub transform: fn(&Value) -> anyhow::Result<Vec<Record>>,
    chart: (ChartType, &'static str, &'static str, Aggregation),
}

impl Source {
    pub fn default_config(&self) -> ChartConfig {
        let (chart_type, x, y, agg) = self.chart;
        ChartConfig::new(chart_type, x, y, agg)
    }

    /// Session/range/user params plus this source's fixed extras.
    pub fn params(&self, base: Params) -> Params {
        self.extra.iter().fold(base, |p, (k, v)| p.with(k, *v))
    }

    pub fn boxed_transform(&self) -> Transform {
        let f = self.transform;
        Arc::new(move |v: &Value| f(v))
    }
}

pub const SOURCES: &[Source] = &[
    Source {
        name: "monthly",
        endpoint: "/api/analysis/transactions/info",
        extra: &[("intervalType", "monthly")],
        transform: monthly_rows,
        chart: (ChartType::Line, "month", "income", Aggregation::Sum),
    },
    Source {
        name: "category",
        endpoint: "/api/analysis/all-category-info",
        extra: &[],
        transform: data_rows,
        chart: (ChartType::Pie, "category", "income", Aggregation::Sum),
    },
    Source {
        name: "hourly",
        endpoint: "/api/analysis/amount-avg/by-hour",
        extra: &[],
        transform: identity,
        chart: (ChartType::Line, "hour", "avgSpentAmount", Aggregation::Avg),
    },
    Source {
        name: "heatmap",
        endpoint: "/api/analysis/time-heatmap",
        extra: &[],
        transform: data_rows,
        chart: (ChartType::Bar, "hour", "count", Aggregation::Sum),
    },
    Source {
        name: "period",
        endpoint: "/api/analysis/search-by-period",
        extra: &[("interval", "month")],
        transform: period_rows,
        chart: (ChartType::Bar, "month", "income", Aggregation::Sum),
    },
];

pub fn lookup(name: &str) -> Option<&'static Source> {
    SOURCES.iter().find(|s| s.name == name)
}

/// Array results pass through; anything else is no rows.
pub fn identity(result: &Value) -> anyhow::Result<Vec<Record>> {
    Ok(records_from_value(result))
}

/// Rows under `result.data`.
pub fn data_rows(result: &Value) -> anyhow::Result<Vec<Record>> {
    Ok(result.get("data").map(records_from_value).unwrap_or_default())
}

/// `[{name, income, expense}]` renamed to `{month, income, expense}`.
pub fn monthly_rows(result: &Value) -> anyhow::Result<Vec<Record>> {
    let items = match result {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => return Err(anyhow!("expected an array, got {}", other)),
    };
    Ok(items
        .iter()
        .map(|item| {
            record(&[
                ("month", item.get("name").cloned().unwrap_or(Value::Null)),
                ("income", item.get("income").cloned().unwrap_or(Value::Null)),
                ("expense", item.get("expense").cloned().unwrap_or(Value::Null)),
            ])
        })
        .collect())
}

/// Date-histogram buckets under `result.data`, keyed by date.
pub fn period_rows(result: &Value) -> anyhow::Result<Vec<Record>> {
    let items = result
        .get("data")
        .and_then(Value::as_array)
        .context("period result has no data array")?;
    items
        .iter()
        .map(|item| {
            let date = bucket_date(item.get("key")).context("bucket key is not a date")?;
            Ok(record(&[
                ("month", json!(date.format("%b").to_string())),
                ("income", item.get("incomeAmountSum").cloned().unwrap_or(Value::Null)),
                ("expense", item.get("spentAmountSum").cloned().unwrap_or(Value::Null)),
            ]))
        })
        .collect()
}

// Keys arrive as epoch milliseconds or ISO dates.
fn bucket_date(key: Option<&Value>) -> Option<NaiveDate> {
    match key? {
        Value::Number(n) => DateTime::<Utc>::from_timestamp_millis(n.as_i64()?).map(|d| d.date_naive()),
        Value::String(s) => NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok(),
        _ => None,
    }
}
