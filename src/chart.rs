//! Declarative chart configuration and the client-side aggregator.
//!
//! `aggregate` groups rows by the x-axis field and reduces the y-axis
//! values of each group, producing one `{x, y}` row per distinct key in
//! first-seen order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::record::{group_key, number, numeric, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartType {
    Bar,
    Line,
    HorizontalBar,
    Pie,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::HorizontalBar => "horizontalBar",
            ChartType::Pie => "pie",
        }
    }
}

impl FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bar" => Ok(ChartType::Bar),
            "line" => Ok(ChartType::Line),
            "horizontalBar" | "horizontal-bar" | "hbar" => Ok(ChartType::HorizontalBar),
            "pie" => Ok(ChartType::Pie),
            other => Err(format!("unknown chart type: {}", other)),
        }
    }
}

/// Per-group reduction. Anything unrecognized parses as `Sum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Aggregation {
    #[default]
    Sum,
    Avg,
    Count,
    Max,
    Min,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Count => "count",
            Aggregation::Max => "max",
            Aggregation::Min => "min",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "avg" => Aggregation::Avg,
            "count" => Aggregation::Count,
            "max" => Aggregation::Max,
            "min" => Aggregation::Min,
            _ => Aggregation::Sum,
        }
    }

    /// Reduce one bucket. Buckets are never empty.
    pub fn reduce(&self, values: &[f64]) -> f64 {
        match self {
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Count => values.len() as f64,
            Aggregation::Max => fold_nan_aware(values, f64::NEG_INFINITY, f64::max),
            Aggregation::Min => fold_nan_aware(values, f64::INFINITY, f64::min),
        }
    }
}

// f64::max/min skip NaN; a NaN in the bucket must poison the result.
fn fold_nan_aware(values: &[f64], init: f64, pick: fn(f64, f64) -> f64) -> f64 {
    values
        .iter()
        .try_fold(init, |acc, v| {
            if v.is_nan() {
                None
            } else {
                Some(pick(acc, *v))
            }
        })
        .unwrap_or(f64::NAN)
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Aggregation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Aggregation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Aggregation::parse(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub x_axis: String,
    pub y_axis: String,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub colors: Vec<String>,
}

impl ChartConfig {
    pub fn new(chart_type: ChartType, x_axis: &str, y_axis: &str, aggregation: Aggregation) -> Self {
        Self {
            chart_type,
            x_axis: x_axis.to_string(),
            y_axis: y_axis.to_string(),
            aggregation,
            group_by: None,
            colors: Vec::new(),
        }
    }
}

struct GroupBucket {
    key: Value,
    values: Vec<f64>,
}

/// Group `records` by `config.x_axis` and reduce `config.y_axis` per group.
pub fn aggregate(records: &[Record], config: &ChartConfig) -> Vec<Record> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<GroupBucket> = Vec::new();

    for rec in records {
        let x = rec.get(&config.x_axis);
        let slot = *index.entry(group_key(x)).or_insert_with(|| {
            buckets.push(GroupBucket {
                key: x.cloned().unwrap_or(Value::Null),
                values: Vec::new(),
            });
            buckets.len() - 1
        });
        buckets[slot].values.push(numeric(rec.get(&config.y_axis)));
    }

    buckets
        .into_iter()
        .map(|bucket| {
            let mut out = Record::new();
            out.insert(config.x_axis.clone(), bucket.key);
            out.insert(
                config.y_axis.clone(),
                number(config.aggregation.reduce(&bucket.values)),
            );
            out
        })
        .collect()
}

/// Memoized aggregation: recomputes only when the records or the config
/// differ from the previous call.
#[derive(Debug, Default)]
pub struct ChartView {
    last: Option<(Vec<Record>, ChartConfig)>,
    output: Vec<Record>,
    recomputes: u64,
}

impl ChartView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, records: &[Record], config: &ChartConfig) -> &[Record] {
        let unchanged = matches!(&self.last, Some((r, c)) if r.as_slice() == records && c == config);
        if !unchanged {
            self.output = aggregate(records, config);
            self.last = Some((records.to_vec(), config.clone()));
            self.recomputes += 1;
        }
        &self.output
    }

    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::record;
    use serde_json::json;

    fn sample() -> Vec<Record> {
        vec![
            record(&[("m", json!("Jan")), ("v", json!(10))]),
            record(&[("m", json!("Jan")), ("v", json!(20))]),
            record(&[("m", json!("Feb")), ("v", json!(5))]),
        ]
    }

    fn cfg(agg: Aggregation) -> ChartConfig {
        ChartConfig::new(ChartType::Bar, "m", "v", agg)
    }

    fn pairs(out: &[Record]) -> Vec<(Value, Value)> {
        out.iter()
            .map(|r| (r["m"].clone(), r["v"].clone()))
            .collect()
    }

    #[test]
    fn test_sum() {
        let out = aggregate(&sample(), &cfg(Aggregation::Sum));
        assert_eq!(pairs(&out), vec![(json!("Jan"), json!(30)), (json!("Feb"), json!(5))]);
    }

    #[test]
    fn test_avg() {
        let out = aggregate(&sample(), &cfg(Aggregation::Avg));
        assert_eq!(pairs(&out), vec![(json!("Jan"), json!(15)), (json!("Feb"), json!(5))]);
    }

    #[test]
    fn test_count() {
        let out = aggregate(&sample(), &cfg(Aggregation::Count));
        assert_eq!(pairs(&out), vec![(json!("Jan"), json!(2)), (json!("Feb"), json!(1))]);
    }

    #[test]
    fn test_max_min() {
        let max = aggregate(&sample(), &cfg(Aggregation::Max));
        assert_eq!(pairs(&max), vec![(json!("Jan"), json!(20)), (json!("Feb"), json!(5))]);
        let min = aggregate(&sample(), &cfg(Aggregation::Min));
        assert_eq!(pairs(&min), vec![(json!("Jan"), json!(10)), (json!("Feb"), json!(5))]);
    }

    #[test]
    fn test_output_has_exactly_two_fields() {
        let mut rows = sample();
        rows[0].insert("extra".to_string(), json!("ignored"));
        for r in aggregate(&rows, &cfg(Aggregation::Sum)) {
            assert_eq!(r.len(), 2);
            assert!(r.contains_key("m") && r.contains_key("v"));
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate(&[], &cfg(Aggregation::Avg)).is_empty());
    }

    #[test]
    fn test_first_seen_order_with_interleaving() {
        let rows: Vec<Record> = ["b", "a", "b", "c", "a"]
            .iter()
            .map(|k| record(&[("m", json!(k)), ("v", json!(1))]))
            .collect();
        let out = aggregate(&rows, &cfg(Aggregation::Count));
        let keys: Vec<Value> = out.iter().map(|r| r["m"].clone()).collect();
        assert_eq!(keys, vec![json!("b"), json!("a"), json!("c")]);
        assert_eq!(out[0]["v"], json!(2));
    }

    #[test]
    fn test_numeric_like_keys_keep_first_seen_order() {
        let rows = vec![
            record(&[("m", json!("10")), ("v", json!(1))]),
            record(&[("m", json!("2")), ("v", json!(1))]),
            record(&[("m", json!(10)), ("v", json!(1))]),
        ];
        let out = aggregate(&rows, &cfg(Aggregation::Sum));
        assert_eq!(pairs(&out), vec![(json!("10"), json!(2)), (json!("2"), json!(1))]);
    }

    #[test]
    fn test_output_length_matches_distinct_keys() {
        let rows: Vec<Record> = (0..50)
            .map(|i| record(&[("m", json!(i % 7)), ("v", json!(i))]))
            .collect();
        assert_eq!(aggregate(&rows, &cfg(Aggregation::Sum)).len(), 7);
    }

    #[test]
    fn test_missing_y_poisons_but_count_survives() {
        let rows = vec![
            record(&[("m", json!("Jan")), ("v", json!(1))]),
            record(&[("m", json!("Jan"))]),
        ];
        let sum = aggregate(&rows, &cfg(Aggregation::Sum));
        assert_eq!(sum[0]["v"], Value::Null);
        let max = aggregate(&rows, &cfg(Aggregation::Max));
        assert_eq!(max[0]["v"], Value::Null);
        let count = aggregate(&rows, &cfg(Aggregation::Count));
        assert_eq!(count[0]["v"], json!(2));
    }

    #[test]
    fn test_numeric_strings_are_summed() {
        let rows = vec![
            record(&[("m", json!("Jan")), ("v", json!("1.5"))]),
            record(&[("m", json!("Jan")), ("v", json!(2))]),
        ];
        let out = aggregate(&rows, &cfg(Aggregation::Sum));
        assert_eq!(out[0]["v"], json!(3.5));
    }

    #[test]
    fn test_unknown_aggregation_falls_back_to_sum() {
        let config: ChartConfig = serde_json::from_value(json!({
            "type": "line", "xAxis": "m", "yAxis": "v", "aggregation": "median"
        }))
        .unwrap();
        assert_eq!(config.aggregation, Aggregation::Sum);
        let out = aggregate(&sample(), &config);
        assert_eq!(out[0]["v"], json!(30));
    }

    #[test]
    fn test_config_roundtrips_dashboard_json() {
        let config: ChartConfig = serde_json::from_value(json!({
            "type": "horizontalBar", "xAxis": "category", "yAxis": "amount",
            "aggregation": "avg", "colors": ["#8884d8"]
        }))
        .unwrap();
        assert_eq!(config.chart_type, ChartType::HorizontalBar);
        assert_eq!(config.colors.len(), 1);
        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["type"], json!("horizontalBar"));
        assert_eq!(back["aggregation"], json!("avg"));
    }

    #[test]
    fn test_chart_view_memoizes() {
        let mut view = ChartView::new();
        let rows = sample();
        let config = cfg(Aggregation::Sum);
        assert_eq!(view.update(&rows, &config).len(), 2);
        view.update(&rows, &config);
        assert_eq!(view.recomputes(), 1);
        view.update(&rows, &cfg(Aggregation::Max));
        assert_eq!(view.recomputes(), 2);
    }
}
