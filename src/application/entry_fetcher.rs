// Paginated retrieval of monitor entries
use crate::application::monitors_api::{EntriesQuery, MonitorsApi};
use crate::domain::chart::RawEntry;
use crate::domain::date_range::DateRange;
use crate::domain::monitor::Monitor;
use std::sync::Arc;

pub const DEFAULT_MAX_PAGES: u32 = 500;

#[derive(Clone)]
pub struct EntryFetcher {
    api: Arc<dyn MonitorsApi>,
    max_pages: u32,
}

impl EntryFetcher {
    pub fn new(api: Arc<dyn MonitorsApi>, max_pages: u32) -> Self {
        Self {
            api,
            max_pages: max_pages.max(1),
        }
    }

    /// Walk the entries pages for `monitor` in order, one request at a time,
    /// until the server reports no next page. A failed page ends the walk and
    /// whatever was collected so far is returned.
    pub async fn fetch_entries(&self, monitor: &Monitor, range: &DateRange) -> Vec<RawEntry> {
        let mut entries = Vec::new();
        let mut page_number: u32 = 1;
        let mut last_reported_page: Option<u32> = None;

        loop {
            let query = EntriesQuery {
                fields: monitor.data_fields.clone(),
                page: page_number,
                range: *range,
            };

            let page = match self.api.entries_page(monitor.id(), &query).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(
                        monitor = %monitor.data.name,
                        page = page_number,
                        "Error fetching entries page: {:#}",
                        e
                    );
                    break;
                }
            };

            // Servers that omit the page number are trusted to advance.
            if page.page != 0 && last_reported_page == Some(page.page) {
                tracing::warn!(
                    monitor = %monitor.data.name,
                    page = page.page,
                    "Server repeated an entries page, stopping"
                );
                break;
            }
            last_reported_page = Some(page.page);

            let has_next_page = page.has_next_page;
            entries.extend(page.data);

            if !has_next_page {
                break;
            }
            if page_number >= self.max_pages {
                tracing::warn!(
                    monitor = %monitor.data.name,
                    max_pages = self.max_pages,
                    "Reached entries page limit, returning partial data"
                );
                break;
            }
            page_number += 1;
        }

        tracing::debug!(
            monitor = %monitor.data.name,
            pages = page_number,
            entries = entries.len(),
            "Fetched monitor entries"
        );
        entries
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::domain::classifier::MonitorClassifier;
    use crate::domain::monitor::fixtures::record;
    use crate::domain::monitor::Device;

    fn monitor() -> Monitor {
        Monitor::new(record("m1", Device::PurpleAir), &MonitorClassifier::default())
    }

    fn three_pages() -> Vec<Vec<RawEntry>> {
        vec![
            vec![entry("2024-01-01T06:00:00Z", "6"), entry("2024-01-01T05:00:00Z", "5")],
            vec![entry("2024-01-01T04:00:00Z", "4"), entry("2024-01-01T03:00:00Z", "3")],
            vec![entry("2024-01-01T02:00:00Z", "2")],
        ]
    }

    #[tokio::test]
    async fn test_concatenates_all_pages_in_order() {
        let api = Arc::new(FakeApi {
            pages: three_pages(),
            ..FakeApi::default()
        });
        let fetcher = EntryFetcher::new(api.clone(), DEFAULT_MAX_PAGES);
        let range = DateRange::default();

        let entries = fetcher.fetch_entries(&monitor(), &range).await;

        let values: Vec<&str> = entries.iter().map(|e| e["pm25"].as_str().unwrap()).collect();
        assert_eq!(values, vec!["6", "5", "4", "3", "2"]);

        let requests = api.requests.lock();
        assert_eq!(requests.iter().map(|q| q.page).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(requests[0].fields, vec!["pm10", "pm25", "pm25_avg_15", "pm25_avg_60"]);
        assert_eq!(requests[0].range, range);
    }

    #[tokio::test]
    async fn test_failed_page_returns_partial_result() {
        let api = Arc::new(FakeApi {
            pages: three_pages(),
            fail_on_page: Some(2),
            ..FakeApi::default()
        });
        let fetcher = EntryFetcher::new(api.clone(), DEFAULT_MAX_PAGES);

        let entries = fetcher.fetch_entries(&monitor(), &DateRange::default()).await;

        assert_eq!(entries.len(), 2);
        assert_eq!(api.requests.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_first_page_failure_returns_nothing() {
        let api = Arc::new(FakeApi {
            pages: three_pages(),
            fail_on_page: Some(1),
            ..FakeApi::default()
        });
        let fetcher = EntryFetcher::new(api, DEFAULT_MAX_PAGES);
        assert!(fetcher.fetch_entries(&monitor(), &DateRange::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_page_ceiling_stops_endless_server() {
        let api = Arc::new(FakeApi {
            endless: true,
            ..FakeApi::default()
        });
        let fetcher = EntryFetcher::new(api.clone(), 5);

        let entries = fetcher.fetch_entries(&monitor(), &DateRange::default()).await;

        assert_eq!(entries.len(), 5);
        assert_eq!(api.requests.lock().len(), 5);
    }
}
