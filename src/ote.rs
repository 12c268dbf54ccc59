use axum::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use tracing::{info, instrument, warn};
use url::Url;

use crate::domain::{PriceFileSource, SpotError};

pub(crate) const BASE_URL: &str = "https://www.ote-cr.cz";

/// Day-ahead market results published by OTE, the Czech market operator.
#[derive(Clone, Debug)]
pub(crate) struct Ote {
    client: Client,
    base_url: Url,
}

impl Ote {
    pub(crate) fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// URL of the hourly day-ahead report for `date`, e.g.
    /// `/pubweb/attachments/01/2024/month03/day05/DT_05_03_2024_CZ.xls`
    pub(crate) fn price_file_url(&self, date: NaiveDate) -> Result<Url, SpotError> {
        let path = format!(
            "/pubweb/attachments/01/{year}/month{month:02}/day{day:02}/DT_{day:02}_{month:02}_{year}_CZ.xls",
            year = date.year(),
            month = date.month(),
            day = date.day(),
        );

        self.base_url
            .join(&path)
            .map_err(|e| SpotError::InvariantViolation(e.to_string()))
    }
}

#[async_trait]
impl PriceFileSource for Ote {
    fn name(&self) -> &'static str {
        "ote"
    }

    #[instrument(skip(self))]
    async fn fetch_price_file(&self, date: NaiveDate) -> Result<Vec<u8>, SpotError> {
        let url = self.price_file_url(date)?;

        info!("Downloading price file from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SpotError::Network(e.to_string()))?;

        if !response.status().is_success() {
            warn!("price file for {} answered with HTTP {}", date, response.status());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpotError::Network(e.to_string()))?;

        info!("Downloaded {} bytes", bytes.len());

        Ok(bytes.to_vec())
    }
}
