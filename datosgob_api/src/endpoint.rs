//! Endpoint description and the sliding date window sent with every request.

use std::path::PathBuf;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;

use crate::types::Column;

/// Format the API expects for `start_date` / `end_date`.
const WINDOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Inclusive time range covering one whole calendar month.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateWindow {
    /// The calendar month before `reference`, from its first day at 00:00:00
    /// to its last day at 23:59:59.
    pub fn previous_month(reference: NaiveDate) -> Self {
        let first_of_month = reference - Duration::days(i64::from(reference.day0()));
        let last_of_previous = first_of_month - Duration::days(1);
        let first_of_previous =
            last_of_previous - Duration::days(i64::from(last_of_previous.day0()));
        Self {
            start: first_of_previous.and_time(NaiveTime::MIN),
            end: last_of_previous.and_time(NaiveTime::MIN) + Duration::seconds(86_399),
        }
    }

    pub fn start_param(&self) -> String {
        self.start.format(WINDOW_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(WINDOW_FORMAT).to_string()
    }
}

/// One remote series: where to fetch it, with which parameters, which
/// canonical columns its rows carry, and where its snapshot is written.
#[derive(Clone, Debug)]
pub struct EndpointSpec {
    /// Logical source name, used in logs and snapshot paths.
    pub name: String,
    /// Path relative to the client's base URL, e.g. `series/api/series`.
    pub endpoint: String,
    /// Query parameters in the order they are appended.
    pub params: Vec<(String, String)>,
    /// Canonical columns carried by each payload row, `Fecha` first.
    pub columns: Vec<Column>,
    /// Destination of the raw snapshot for this run.
    pub save_path: PathBuf,
}

impl EndpointSpec {
    pub fn new(name: &str, endpoint: &str, columns: Vec<Column>, save_path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            params: Vec::new(),
            columns,
            save_path,
        }
    }

    /// Appends a query parameter, replacing any earlier value for the same key.
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.retain(|(k, _)| k != key);
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    /// Sets `start_date` and `end_date` from the given window.
    pub fn with_window(self, window: &DateWindow) -> Self {
        self.with_param("start_date", &window.start_param())
            .with_param("end_date", &window.end_param())
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Appends this endpoint's parameters to the given URL, returning the modified URL.
    pub fn add_to_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_covers_previous_month() {
        let window = DateWindow::previous_month(date(2023, 5, 17));
        assert_eq!(window.start_param(), "2023-04-01T00:00:00Z");
        assert_eq!(window.end_param(), "2023-04-30T23:59:59Z");
    }

    #[test]
    fn window_wraps_to_december() {
        let window = DateWindow::previous_month(date(2024, 1, 1));
        assert_eq!(window.start_param(), "2023-12-01T00:00:00Z");
        assert_eq!(window.end_param(), "2023-12-31T23:59:59Z");
    }

    #[test]
    fn window_handles_leap_february() {
        let window = DateWindow::previous_month(date(2024, 3, 31));
        assert_eq!(window.end_param(), "2024-02-29T23:59:59Z");
        let window = DateWindow::previous_month(date(2023, 3, 1));
        assert_eq!(window.end_param(), "2023-02-28T23:59:59Z");
    }

    #[test]
    fn with_param_replaces_existing_key() {
        let spec = EndpointSpec::new("dolar", "series/api/series", vec![Column::Fecha], "x.csv".into())
            .with_param("start_date", "2020-01-01")
            .with_param("format", "json")
            .with_window(&DateWindow::previous_month(date(2023, 2, 10)));
        assert_eq!(spec.param("start_date"), Some("2023-01-01T00:00:00Z"));
        assert_eq!(spec.param("format"), Some("json"));
        assert_eq!(
            spec.params.iter().filter(|(k, _)| k == "start_date").count(),
            1
        );
    }

    #[test]
    fn add_to_url_appends_pairs_in_order() {
        let spec = EndpointSpec::new("dolar", "series/api/series", vec![Column::Fecha], "x.csv".into())
            .with_param("ids", "92.1_TCV_0_0_21")
            .with_param("format", "json");
        let url = Url::parse("https://apis.datos.gob.ar/series/api/series").unwrap();
        let url = spec.add_to_url(&url);
        assert_eq!(url.query(), Some("ids=92.1_TCV_0_0_21&format=json"));
    }

    #[test]
    fn add_to_url_without_params_keeps_url() {
        let spec = EndpointSpec::new("dolar", "series", vec![Column::Fecha], "x.csv".into());
        let url = Url::parse("https://example.org/series").unwrap();
        assert_eq!(spec.add_to_url(&url).as_str(), "https://example.org/series");
    }
}
