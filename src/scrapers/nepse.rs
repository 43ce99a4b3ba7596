use crate::config::Config;
use crate::errors::{NepseError, Result};
use crate::scrapers::base::{PageSource, PaginationDriver};
use crate::util;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Output column name plus the JSON field it is read from.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub header: String,
    pub field: String,
}

impl ColumnSpec {
    pub fn new(header: &str, field: &str) -> Self {
        Self {
            header: header.to_string(),
            field: field.to_string(),
        }
    }
}

/// NEPSE 分页表格数据源。
///
/// Pages through one of the exchange's paged JSON endpoints (payload shape
/// `{"content": [...], "totalPages": N}`) and presents each page as raw text
/// cells. Implements both halves of the paging seam: [`PageSource`] for
/// reading the current page and [`PaginationDriver`] for moving forward.
pub struct NepsePageSource {
    client: Client,
    last_request: Option<Instant>,
    endpoint: String,
    columns: Vec<ColumnSpec>,
    page_size: usize,
    settle: Duration,
    /// 1-based current page
    page: u32,
    /// Payload cached for `page`; cleared on advance.
    current: Option<Value>,
    total_pages: Option<u32>,
}

impl NepsePageSource {
    pub fn new(config: &Config, path: &str, columns: Vec<ColumnSpec>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(NepseError::RequestError)?;

        Ok(Self {
            client,
            last_request: None,
            endpoint: format!("{}{}", config.base_url, path),
            columns,
            page_size: config.page_size,
            settle: Duration::from_millis(config.settle_ms),
            page: 1,
            current: None,
            total_pages: None,
        })
    }

    /// Listed securities table.
    pub fn company(config: &Config) -> Result<Self> {
        Self::new(
            config,
            "/company/list",
            vec![
                ColumnSpec::new("Symbol", "symbol"),
                ColumnSpec::new("Company Name", "companyName"),
                ColumnSpec::new("Sector", "sectorName"),
                ColumnSpec::new("Status", "status"),
                ColumnSpec::new("Instrument", "instrumentType"),
            ],
        )
    }

    /// Historical index values.
    pub fn indices(config: &Config) -> Result<Self> {
        Self::new(
            config,
            "/index/history",
            vec![
                ColumnSpec::new("Date", "businessDate"),
                ColumnSpec::new("Index Value", "closingIndex"),
                ColumnSpec::new("Absolute Change", "absoluteChange"),
                ColumnSpec::new("% Change", "percentageChange"),
            ],
        )
    }

    /// Trade-by-trade floorsheet records.
    pub fn floorsheet(config: &Config) -> Result<Self> {
        Self::new(
            config,
            "/nepse-data/floorsheet",
            vec![
                ColumnSpec::new("Contract No.", "contractId"),
                ColumnSpec::new("Symbol", "stockSymbol"),
                ColumnSpec::new("Buyer", "buyerMemberId"),
                ColumnSpec::new("Seller", "sellerMemberId"),
                ColumnSpec::new("Quantity", "contractQuantity"),
                ColumnSpec::new("Rate", "contractRate"),
                ColumnSpec::new("Amount", "contractAmount"),
            ],
        )
    }

    /// 等待请求频率限制
    async fn wait_for_rate_limit(&mut self) {
        const MIN_INTERVAL: Duration = Duration::from_millis(500);

        if let Some(instant) = self.last_request {
            let elapsed = instant.elapsed();
            if elapsed < MIN_INTERVAL {
                let wait_time = MIN_INTERVAL - elapsed;
                debug!("等待 {:?} 以遵守频率限制", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// Fetch the payload for the current page if it is not already cached.
    async fn ensure_page(&mut self) -> Result<&Value> {
        if self.current.is_none() {
            self.wait_for_rate_limit().await;

            // API pagination is 0-based
            let url = format!(
                "{}?page={}&size={}",
                self.endpoint,
                self.page - 1,
                self.page_size
            );
            debug!("Fetching page {} from {}", self.page, url);

            let response = self.client.get(&url).send().await?;
            let payload: Value = response.json().await?;

            if let Some(total) = payload.get("totalPages").and_then(|t| t.as_u64()) {
                self.total_pages = Some(total as u32);
            }
            self.current = Some(payload);
        }

        // Just populated above
        Ok(self.current.as_ref().unwrap())
    }

    fn content_rows(payload: &Value, columns: &[ColumnSpec]) -> Option<Vec<Vec<String>>> {
        let content = payload.get("content")?.as_array()?;
        let rows = content
            .iter()
            .map(|item| {
                columns
                    .iter()
                    .map(|col| {
                        item.get(&col.field)
                            .map(util::json_cell_text)
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();
        Some(rows)
    }
}

#[async_trait]
impl PageSource for NepsePageSource {
    async fn header(&mut self) -> Result<Vec<String>> {
        // Validate the payload shape up front: a missing body container on the
        // first page is a structural fault, not an empty table.
        let endpoint = self.endpoint.clone();
        let payload = self.ensure_page().await?;
        if payload.get("content").and_then(|c| c.as_array()).is_none() {
            return Err(NepseError::SourceStructure(format!(
                "no content array in response from {}",
                endpoint
            )));
        }

        Ok(self.columns.iter().map(|c| c.header.clone()).collect())
    }

    async fn rows(&mut self) -> Result<Vec<Vec<String>>> {
        let columns = self.columns.clone();
        let endpoint = self.endpoint.clone();
        let page = self.page;
        let payload = self.ensure_page().await?;

        Self::content_rows(payload, &columns).ok_or_else(|| {
            NepseError::SourceStructure(format!(
                "no content array on page {} of {}",
                page, endpoint
            ))
        })
    }
}

#[async_trait]
impl PaginationDriver for NepsePageSource {
    async fn has_next(&mut self) -> bool {
        match self.total_pages {
            Some(total) => self.page < total,
            // Total unknown (endpoint omits totalPages): a full page implies
            // more may follow, a short page means exhaustion.
            None => match &self.current {
                Some(payload) => payload
                    .get("content")
                    .and_then(|c| c.as_array())
                    .map(|rows| rows.len() >= self.page_size)
                    .unwrap_or(false),
                None => false,
            },
        }
    }

    async fn advance(&mut self) -> Result<()> {
        // Conservative settling floor; the fetch below is the authoritative
        // readiness signal.
        tokio::time::sleep(self.settle).await;

        self.page += 1;
        self.current = None;

        let page = self.page;
        if let Err(e) = self.ensure_page().await {
            return Err(NepseError::Navigation(format!(
                "failed to reach page {}: {}",
                page, e
            )));
        }
        info!("Advanced to page {}", page);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source_with_payload(payload: Value) -> NepsePageSource {
        let config = Config::new().with_page_size(2).with_settle_ms(0);
        let mut source = NepsePageSource::new(
            &config,
            "/company/list",
            vec![
                ColumnSpec::new("Symbol", "symbol"),
                ColumnSpec::new("Company Name", "companyName"),
            ],
        )
        .unwrap();
        source.total_pages = payload.get("totalPages").and_then(|t| t.as_u64()).map(|t| t as u32);
        source.current = Some(payload);
        source
    }

    #[tokio::test]
    async fn maps_content_fields_to_text_cells() {
        let mut source = source_with_payload(json!({
            "content": [
                {"symbol": "NABIL", "companyName": "Nabil Bank", "sectorName": "Banking"},
                {"symbol": "NTC", "companyName": 42}
            ],
            "totalPages": 3
        }));

        let header = source.header().await.unwrap();
        assert_eq!(header, vec!["Symbol", "Company Name"]);

        let rows = source.rows().await.unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["NABIL".to_string(), "Nabil Bank".to_string()],
                vec!["NTC".to_string(), "42".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn missing_content_is_a_structural_fault() {
        let mut source = source_with_payload(json!({"message": "down for maintenance"}));
        let err = source.header().await.unwrap_err();
        assert!(matches!(err, NepseError::SourceStructure(_)));
    }

    #[tokio::test]
    async fn has_next_follows_total_pages() {
        let mut source = source_with_payload(json!({"content": [], "totalPages": 3}));
        assert!(source.has_next().await);

        source.page = 3;
        assert!(!source.has_next().await);
    }

    #[tokio::test]
    async fn has_next_falls_back_to_page_fill_without_total() {
        let mut source = source_with_payload(json!({
            "content": [{"symbol": "A"}, {"symbol": "B"}]
        }));
        // page_size is 2 and the page is full
        assert!(source.has_next().await);

        let mut source = source_with_payload(json!({"content": [{"symbol": "A"}]}));
        assert!(!source.has_next().await);
    }
}
