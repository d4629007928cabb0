use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope returned by the series endpoint.
///
/// Only `data` is required. Each element is one observation, either a
/// positional array (`["2023-01-01", 177.1]`) or a record keyed by column name.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SeriesPayload {
    pub data: Vec<Value>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub meta: Option<Value>,
}
