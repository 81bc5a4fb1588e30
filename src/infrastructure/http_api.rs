// SJVAir REST API client
use crate::application::monitors_api::{EntriesPage, EntriesQuery, MonitorsApi};
use crate::domain::date_range::DateRange;
use crate::domain::monitor::MonitorRecord;
use crate::domain::subscription::Subscription;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// List endpoints wrap their rows in `{data: [...]}`; older deployments
/// return the bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Envelope { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ListResponse<T> {
    fn into_rows(self) -> Vec<T> {
        match self {
            ListResponse::Envelope { data } => data,
            ListResponse::Bare(rows) => rows,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpMonitorsApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMonitorsApi {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn entries_url(&self, monitor_id: &str, query: &EntriesQuery) -> String {
        format!(
            "{}?{}&page={}",
            self.url(&format!("monitors/{}/entries/", urlencoding::encode(monitor_id))),
            filter_params(&query.fields, &query.range),
            query.page
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Request to {} failed with status {}: {}", url, status, body);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

/// `fields`, `timestamp__gte` and `timestamp__lte`, shared by the entries
/// query and the CSV download.
fn filter_params(fields: &[String], range: &DateRange) -> String {
    format!(
        "fields={}&timestamp__gte={}&timestamp__lte={}",
        urlencoding::encode(&fields.join(",")),
        urlencoding::encode(&range.start_param()),
        urlencoding::encode(&range.end_param())
    )
}

#[async_trait]
impl MonitorsApi for HttpMonitorsApi {
    async fn list_monitors(&self) -> Result<Vec<MonitorRecord>> {
        let response: ListResponse<MonitorRecord> = self.get_json(&self.url("monitors")).await?;
        Ok(response.into_rows())
    }

    async fn entries_page(&self, monitor_id: &str, query: &EntriesQuery) -> Result<EntriesPage> {
        self.get_json(&self.entries_url(monitor_id, query)).await
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let response: ListResponse<Subscription> = self.get_json(&self.url("alerts/subscriptions")).await?;
        Ok(response.into_rows())
    }

    fn entries_csv_url(&self, monitor_id: &str, fields: &[String], range: &DateRange) -> String {
        format!(
            "{}?{}",
            self.url(&format!("monitors/{}/entries/csv/", urlencoding::encode(monitor_id))),
            filter_params(fields, range)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn api() -> HttpMonitorsApi {
        HttpMonitorsApi::new("https://www.sjvair.com/api/1.0/", Duration::from_secs(5)).unwrap()
    }

    fn range() -> DateRange {
        DateRange {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 4, 7, 59, 59).unwrap(),
        }
    }

    #[test]
    fn test_entries_url() {
        let query = EntriesQuery {
            fields: vec!["pm25".to_string(), "pm25_avg_15".to_string()],
            page: 2,
            range: range(),
        };
        assert_eq!(
            api().entries_url("abc", &query),
            "https://www.sjvair.com/api/1.0/monitors/abc/entries/?fields=pm25%2Cpm25_avg_15\
             &timestamp__gte=2024-01-01%2008%3A00%3A00&timestamp__lte=2024-01-04%2007%3A59%3A59&page=2"
        );
    }

    #[test]
    fn test_csv_url_uses_same_filters() {
        let url = api().entries_csv_url("abc", &["pm25".to_string()], &range());
        assert_eq!(
            url,
            "https://www.sjvair.com/api/1.0/monitors/abc/entries/csv/?fields=pm25\
             &timestamp__gte=2024-01-01%2008%3A00%3A00&timestamp__lte=2024-01-04%2007%3A59%3A59"
        );
    }

    #[test]
    fn test_list_response_shapes() {
        let wrapped: ListResponse<Subscription> =
            serde_json::from_str(r#"{"data": [{"level": "unhealthy", "monitor": "m1"}]}"#).unwrap();
        assert_eq!(wrapped.into_rows().len(), 1);

        let bare: ListResponse<Subscription> = serde_json::from_str(r#"[]"#).unwrap();
        assert!(bare.into_rows().is_empty());
    }
}
