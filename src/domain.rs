use axum::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// Number of hourly slots in a day-ahead price file.
pub(crate) const HOURS_PER_DAY: usize = 24;

/// CZK paid for one EUR, as published by the exchange rate source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ExchangeRate(f64);

impl ExchangeRate {
    pub(crate) fn new(czk_per_eur: f64) -> Result<Self, SpotError> {
        if !czk_per_eur.is_finite() || czk_per_eur <= 0.0 {
            return Err(SpotError::RateParse(czk_per_eur.to_string()));
        }

        Ok(Self(czk_per_eur))
    }

    pub(crate) fn czk_per_eur(&self) -> f64 {
        self.0
    }
}

/// The 24 hourly spot prices of one day in EUR/MWh, hour 0 first.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DailyPriceTable {
    values: Vec<f64>,
}

impl DailyPriceTable {
    pub(crate) fn new(values: Vec<f64>) -> Result<Self, SpotError> {
        if values.len() != HOURS_PER_DAY {
            return Err(SpotError::MalformedPriceFile(format!(
                "expected {} hourly values, got {}",
                HOURS_PER_DAY,
                values.len()
            )));
        }

        Ok(Self { values })
    }

    /// Build a table without the length check, for exercising consumers
    /// against tables that could not come out of `new`.
    #[cfg(test)]
    pub(crate) fn unchecked(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub(crate) fn values(&self) -> &[f64] {
        &self.values
    }
}

/// A converted price for one hour, in CZK/kWh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct HourlyPrice {
    pub(crate) hour: String,
    pub(crate) czk_per_kwh: f64,
}

#[async_trait]
pub(crate) trait ExchangeRateSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_rate(&self) -> Result<ExchangeRate, SpotError>;
}

#[async_trait]
pub(crate) trait PriceFileSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Download the raw spreadsheet for `date`. The body is returned as-is,
    /// whatever the response status was.
    async fn fetch_price_file(&self, date: NaiveDate) -> Result<Vec<u8>, SpotError>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpotError {
    #[error("network request failed: {0}")]
    Network(String),
    #[error("exchange rate not found: {0}")]
    RateNotFound(String),
    #[error("exchange rate {0:?} is not a valid number")]
    RateParse(String),
    #[error("malformed price file: {0}")]
    MalformedPriceFile(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}
