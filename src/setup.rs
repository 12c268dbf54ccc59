use std::str::FromStr;
use std::sync::Arc;

use log::debug;
use reqwest::Client;
use thiserror::Error;
use url::Url;

use crate::{
    cnb::{self, Cnb},
    domain::{ExchangeRateSource, PriceFileSource},
    ote::{self, Ote},
    pipeline::View,
};

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("{name} has an invalid value: {reason}")]
    InvalidValue { name: &'static str, reason: String },
    #[error("endpoint {url} is not a valid url: {reason}")]
    Endpoint { url: &'static str, reason: String },
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// What to do with the chart once the data is there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputMode {
    /// Run once and write the chart to stdout.
    Print(PrintFormat),
    /// Keep serving the chart over http.
    Serve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrintFormat {
    Terminal,
    Json,
    Html,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "terminal" => Ok(OutputMode::Print(PrintFormat::Terminal)),
            "json" => Ok(OutputMode::Print(PrintFormat::Json)),
            "html" => Ok(OutputMode::Print(PrintFormat::Html)),
            "serve" => Ok(OutputMode::Serve),
            other => Err(format!(
                "unknown output \"{other}\", expected terminal, json, html or serve"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AppConfig {
    pub(crate) view: View,
    pub(crate) output: OutputMode,
    pub(crate) port: u16,
    pub(crate) accept_invalid_certs: bool,
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            view: parse_var(&lookup, "SPOT_VIEW", View::NextDay)?,
            output: parse_var(
                &lookup,
                "SPOT_OUTPUT",
                OutputMode::Print(PrintFormat::Terminal),
            )?,
            port: parse_var(&lookup, "PORT", 8080)?,
            accept_invalid_certs: parse_var(&lookup, "SPOT_ACCEPT_INVALID_CERTS", false)?,
        };

        debug!("resolved configuration {:?}", config);

        Ok(config)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue {
                    name,
                    reason: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}

fn endpoint(url: &'static str) -> Result<Url, ConfigError> {
    Url::parse(url).map_err(|e| ConfigError::Endpoint {
        url,
        reason: e.to_string(),
    })
}

/// The data sources every run and every http request works with.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) view: View,
    pub(crate) rate_source: Arc<dyn ExchangeRateSource>,
    pub(crate) price_file_source: Arc<dyn PriceFileSource>,
}

impl AppState {
    fn new(
        view: View,
        rate_source: Arc<dyn ExchangeRateSource>,
        price_file_source: Arc<dyn PriceFileSource>,
    ) -> Self {
        Self {
            view,
            rate_source,
            price_file_source,
        }
    }
}

/// Build the http client and both data sources from the configuration.
pub(crate) fn setup_app_state(config: &AppConfig) -> Result<AppState, ConfigError> {
    if config.accept_invalid_certs {
        log::warn!("TLS certificate validation is disabled");
    }

    let client = Client::builder()
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

    let rate_source = Cnb::new(client.clone(), endpoint(cnb::RATES_URL)?);
    let price_file_source = Ote::new(client, endpoint(ote::BASE_URL)?);

    debug!(
        "using \"{}\" for rates and \"{}\" for price files",
        rate_source.name(),
        price_file_source.name()
    );

    Ok(AppState::new(
        config.view,
        Arc::new(rate_source),
        Arc::new(price_file_source),
    ))
}
