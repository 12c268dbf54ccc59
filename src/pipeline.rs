use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, Timelike, Utc};
use chrono_tz::{Europe::Prague, Tz};
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::conversion::convert;
use crate::domain::{
    DailyPriceTable, ExchangeRate, ExchangeRateSource, HourlyPrice, PriceFileSource, SpotError,
};
use crate::price_table;

/// Prices below this many CZK/kWh get their own bar color.
pub(crate) const CHEAP_THRESHOLD_CZK_PER_KWH: f64 = 0.4;

/// Which days are fetched and how the result is decorated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum View {
    /// Tomorrow's prices only.
    NextDay,
    /// Today and tomorrow side by side.
    TwoDay,
    /// Today only, with the running hour highlighted.
    CurrentHour,
}

impl View {
    pub(crate) fn policy(self) -> ViewPolicy {
        match self {
            View::NextDay => ViewPolicy {
                day_offsets: &[1],
                cheap_threshold: None,
                highlight: Highlight::None,
                failure: FailurePolicy::FailFast,
            },
            View::TwoDay => ViewPolicy {
                day_offsets: &[0, 1],
                cheap_threshold: Some(CHEAP_THRESHOLD_CZK_PER_KWH),
                highlight: Highlight::None,
                failure: FailurePolicy::FailFast,
            },
            View::CurrentHour => ViewPolicy {
                day_offsets: &[0],
                cheap_threshold: Some(CHEAP_THRESHOLD_CZK_PER_KWH),
                highlight: Highlight::CurrentHour,
                failure: FailurePolicy::Degrade,
            },
        }
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "next-day" => Ok(View::NextDay),
            "two-day" => Ok(View::TwoDay),
            "current-hour" => Ok(View::CurrentHour),
            other => Err(format!(
                "unknown view \"{other}\", expected next-day, two-day or current-hour"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailurePolicy {
    /// Any failed stage aborts the run with its error.
    FailFast,
    /// Any failed stage ends the run with a message and nothing to render.
    Degrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Highlight {
    None,
    CurrentHour,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ViewPolicy {
    /// Days relative to today, in rendering order.
    pub(crate) day_offsets: &'static [u64],
    pub(crate) cheap_threshold: Option<f64>,
    pub(crate) highlight: Highlight,
    pub(crate) failure: FailurePolicy,
}

/// Converted prices of one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct DaySeries {
    pub(crate) date: NaiveDate,
    /// 0 for today, 1 for tomorrow.
    pub(crate) day_offset: u64,
    pub(crate) prices: Vec<HourlyPrice>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PriceReport {
    pub(crate) view: View,
    pub(crate) policy: ViewPolicy,
    pub(crate) rate: ExchangeRate,
    pub(crate) days: Vec<DaySeries>,
    pub(crate) current_hour: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Report(PriceReport),
    /// The run was given up; the message is meant for the user.
    NoData(String),
}

#[derive(Debug)]
enum Stage {
    Rate { source: &'static str },
    PriceFile { date: NaiveDate, day_offset: u64 },
}

#[derive(Debug)]
struct StageFailure {
    stage: Stage,
    error: SpotError,
}

impl StageFailure {
    fn user_message(&self) -> String {
        match self.stage {
            Stage::Rate { source } => format!(
                "Chyba při získávání kurzu EUR ({}): {}\nKurz EUR není k dispozici.",
                source, self.error
            ),
            Stage::PriceFile { date, day_offset } => format!(
                "Chyba při zpracování dat pro {}: {}\nData pro {} nejsou k dispozici.",
                format_date(date),
                self.error,
                day_name(day_offset).to_lowercase()
            ),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Stage::Rate { source } => write!(f, "rate stage ({}) failed: {}", source, self.error),
            Stage::PriceFile { date, .. } => {
                write!(f, "price file stage for {} failed: {}", date, self.error)
            }
        }
    }
}

/// "Aktuální den" for today, "Následující den" for tomorrow.
pub(crate) fn day_name(day_offset: u64) -> &'static str {
    match day_offset {
        0 => "Aktuální den",
        1 => "Následující den",
        _ => "Další den",
    }
}

/// Wall clock time of the Czech market.
pub(crate) fn prague_now() -> DateTime<Tz> {
    Utc::now().with_timezone(&Prague)
}

/// Czech short date without zero padding, e.g. `5.3.2024`.
pub(crate) fn format_date(date: NaiveDate) -> String {
    format!("{}.{}.{}", date.day(), date.month(), date.year())
}

type ParseFn = fn(&[u8]) -> Result<DailyPriceTable, SpotError>;

/// Wires the two data sources, the spreadsheet parser and the converter.
pub(crate) struct Pipeline<'a> {
    rates: &'a dyn ExchangeRateSource,
    price_files: &'a dyn PriceFileSource,
    parse: ParseFn,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(
        rates: &'a dyn ExchangeRateSource,
        price_files: &'a dyn PriceFileSource,
    ) -> Self {
        Self {
            rates,
            price_files,
            parse: price_table::parse,
        }
    }

    #[cfg(test)]
    fn with_parser(mut self, parse: ParseFn) -> Self {
        self.parse = parse;
        self
    }

    /// Run `view` as of `now`. Errors only escape under [`FailurePolicy::FailFast`].
    #[instrument(skip(self, now), fields(now = %now))]
    pub(crate) async fn run(&self, view: View, now: DateTime<Tz>) -> Result<Outcome, SpotError> {
        let policy = view.policy();

        match self.collect(view, &policy, now).await {
            Ok(report) => Ok(Outcome::Report(report)),
            Err(failure) => match policy.failure {
                FailurePolicy::FailFast => Err(failure.error),
                FailurePolicy::Degrade => {
                    error!("{}", failure);
                    Ok(Outcome::NoData(failure.user_message()))
                }
            },
        }
    }

    async fn collect(
        &self,
        view: View,
        policy: &ViewPolicy,
        now: DateTime<Tz>,
    ) -> Result<PriceReport, StageFailure> {
        let rate = self.rates.fetch_rate().await.map_err(|error| StageFailure {
            stage: Stage::Rate {
                source: self.rates.name(),
            },
            error,
        })?;

        let today = now.date_naive();
        let mut days = Vec::with_capacity(policy.day_offsets.len());

        for &day_offset in policy.day_offsets {
            let date = today
                .checked_add_days(Days::new(day_offset))
                .ok_or_else(|| StageFailure {
                    stage: Stage::PriceFile {
                        date: today,
                        day_offset,
                    },
                    error: SpotError::InvariantViolation(format!(
                        "{today} + {day_offset} days is out of range"
                    )),
                })?;

            let prices = self
                .prices_of_date(date, rate)
                .await
                .map_err(|error| StageFailure {
                    stage: Stage::PriceFile { date, day_offset },
                    error,
                })?;

            days.push(DaySeries {
                date,
                day_offset,
                prices,
            });
        }

        let current_hour = match policy.highlight {
            Highlight::CurrentHour => Some(now.hour() as usize),
            Highlight::None => None,
        };

        info!("Collected {} day(s) of prices for {:?}", days.len(), view);

        Ok(PriceReport {
            view,
            policy: policy.clone(),
            rate,
            days,
            current_hour,
        })
    }

    /// Download, parse and convert one day. The file bytes never leave memory.
    async fn prices_of_date(
        &self,
        date: NaiveDate,
        rate: ExchangeRate,
    ) -> Result<Vec<HourlyPrice>, SpotError> {
        let bytes = self.price_files.fetch_price_file(date).await?;
        let table = (self.parse)(&bytes)?;

        convert(&table, rate)
    }
}
