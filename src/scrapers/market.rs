use crate::config::Config;
use crate::errors::{NepseError, Result};
use crate::models::table::Table;
use crate::util;
use chrono::NaiveDate;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};

/// One-shot market data feeds: the todays-price CSV export and the live
/// market summary. Neither is paginated, so neither participates in the
/// checkpoint/resume machinery (a known limitation carried from the feeds
/// themselves).
pub struct MarketScraper {
    client: Client,
    last_request: Option<Instant>,
    base_url: String,
}

impl MarketScraper {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(NepseError::RequestError)?;

        Ok(Self {
            client,
            last_request: None,
            base_url: config.base_url.clone(),
        })
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

    /// Fetch the exchange's CSV export of daily prices for `date` (today when
    /// `None`) and parse it into a [`Table`] of raw text cells.
    pub async fn fetch_todays_prices(&mut self, date: Option<NaiveDate>) -> Result<Table> {
        let actual_date =
            date.unwrap_or_else(|| chrono::Local::now().naive_local().date());
        let date_str = actual_date.format("%Y-%m-%d").to_string();
        info!("Fetching todays prices for {}", date_str);

        self.wait_for_rate_limit().await;

        let url = format!("{}/market/export/todays-price/{}", self.base_url, date_str);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(NepseError::DataError(format!(
                "todays-price export failed: HTTP status {}",
                response.status()
            )));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(NepseError::DataError(format!(
                "todays-price export for {} is empty",
                date_str
            )));
        }

        let table = prices_table(&text)?;
        info!("Parsed {} price rows for {}", table.row_count(), date_str);
        Ok(table)
    }

    /// Fetch the live market summary and flatten it into a one-row table
    /// (metric names as the header).
    pub async fn fetch_market_summary(&mut self) -> Result<Table> {
        info!("Fetching market summary");

        self.wait_for_rate_limit().await;

        let url = format!("{}/market-summary/", self.base_url);
        let response = self.client.get(&url).send().await?;
        let payload: Value = response.json().await?;

        summary_table(&payload)
    }
}

/// Parse the (repaired) CSV export into a table, skipping rows whose cell
/// count does not match the header.
fn prices_table(text: &str) -> Result<Table> {
    let cleaned = util::clean_export_csv(text);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(cleaned.as_bytes());

    let header: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if header.is_empty() {
        return Err(NepseError::SourceStructure(
            "todays-price export has no header row".to_string(),
        ));
    }

    let mut table = Table::new(header);
    for record in reader.records() {
        let record = record?;
        let row: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
        if row.len() != table.width() {
            warn!(
                "Skipping malformed price row: {} cells, expected {}",
                row.len(),
                table.width()
            );
            continue;
        }
        table.push_row(row);
    }

    Ok(table)
}

/// The summary endpoint returns `[{"detail": ..., "value": ...}, ...]`.
fn summary_table(payload: &Value) -> Result<Table> {
    let items = payload.as_array().ok_or_else(|| {
        NepseError::SourceStructure("market summary payload is not an array".to_string())
    })?;

    let mut header = Vec::new();
    let mut row = Vec::new();
    for item in items {
        let detail = item
            .get("detail")
            .map(util::json_cell_text)
            .unwrap_or_default();
        if detail.is_empty() {
            continue;
        }
        header.push(detail);
        row.push(item.get("value").map(util::json_cell_text).unwrap_or_default());
    }

    if header.is_empty() {
        return Err(NepseError::SourceStructure(
            "market summary payload has no detail entries".to_string(),
        ));
    }

    let mut table = Table::new(header);
    table.push_row(row);
    Ok(table)
}
