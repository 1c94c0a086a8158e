use serde_json::Value;

/// Ordered request parameters. Null values are kept so callers can set
/// optional fields unconditionally; they are dropped when the query string
/// is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, Value)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an earlier value in place.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key.to_string(), value)),
        }
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }


    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pairs with null values removed, values in their query form.
    pub fn present(&self) -> Vec<(&str, String)> {
        self.0
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.as_str(), query_value(v)))
            .collect()
    }

    pub fn to_query_string(&self) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in self.present() {
            ser.append_pair(k, &v);
        }
        ser.finish()
    }

    /// `base` + `endpoint` + `?query`. The `?` is always present, matching
    /// the URLs the dashboard builds.
    pub fn url(&self, base: &str, endpoint: &str) -> String {
        format!(
            "{}{}?{}",
            base.trim_end_matches('/'),
            endpoint,
            self.to_query_string()
        )
    }
}

fn query_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
