use axum::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, instrument};
use url::Url;

use crate::domain::{ExchangeRate, ExchangeRateSource, SpotError};

pub(crate) const RATES_URL: &str =
    "https://www.cnb.cz/cs/financni-trhy/devizovy-trh/kurzy-devizoveho-trhu/kurzy-devizoveho-trhu/";

const EUR_CELL_TEXT: &str = "EUR";

/// Daily exchange rates published by the Czech National Bank.
#[derive(Clone, Debug)]
pub(crate) struct Cnb {
    client: Client,
    url: Url,
}

impl Cnb {
    pub(crate) fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl ExchangeRateSource for Cnb {
    fn name(&self) -> &'static str {
        "cnb"
    }

    #[instrument(skip(self))]
    async fn fetch_rate(&self) -> Result<ExchangeRate, SpotError> {
        info!("Fetching EUR exchange rate from {}", self.url);

        let body = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| SpotError::Network(e.to_string()))?
            .text()
            .await
            .map_err(|e| SpotError::Network(e.to_string()))?;

        let rate = extract_eur_rate(&body)?;

        info!("Fetched exchange rate {} CZK/EUR", rate.czk_per_eur());

        Ok(rate)
    }
}

/// Find the table cell reading exactly "EUR" and parse the cell right after it.
/// The rates page lists code and rate as neighbouring cells of one row.
pub(crate) fn extract_eur_rate(html: &str) -> Result<ExchangeRate, SpotError> {
    let document = Html::parse_document(html);
    let cells = Selector::parse("td").map_err(|e| SpotError::InvariantViolation(e.to_string()))?;

    let eur_cell = document
        .select(&cells)
        .find(|cell| cell.text().collect::<String>() == EUR_CELL_TEXT)
        .ok_or_else(|| SpotError::RateNotFound("no cell with text \"EUR\"".to_string()))?;

    let rate_cell = eur_cell
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sibling| sibling.value().name() == "td")
        .ok_or_else(|| {
            SpotError::RateNotFound("the \"EUR\" cell has no following cell".to_string())
        })?;

    parse_rate_text(&rate_cell.text().collect::<String>())
}

/// Parse a rate written with a decimal comma, e.g. "25,50".
pub(crate) fn parse_rate_text(text: &str) -> Result<ExchangeRate, SpotError> {
    let normalized = text.trim().replace(',', ".");

    let value = normalized
        .parse::<f64>()
        .map_err(|_| SpotError::RateParse(text.to_string()))?;

    ExchangeRate::new(value).map_err(|_| SpotError::RateParse(text.to_string()))
}
