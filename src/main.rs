use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    chart::{build_chart, render_html, render_terminal},
    http::start_http_server,
    pipeline::{prague_now, Outcome, Pipeline},
    setup::{setup_app_state, AppConfig, AppState, OutputMode, PrintFormat},
};

mod chart;
mod cnb;
mod conversion;
mod domain;
mod http;
mod ote;
mod pipeline;
mod price_table;
mod setup;

const APP_NAME: &str = "spotcena";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spotcena=info")),
        )
        .init();

    info!("Starting {}", APP_NAME);

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let state = match setup_app_state(&config) {
        Ok(state) => state,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let exit_code = match config.output {
        OutputMode::Serve => match start_http_server(state, config.port).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("http server stopped: {}", e);
                ExitCode::FAILURE
            }
        },
        OutputMode::Print(format) => print_once(&state, format).await,
    };

    info!("Shutting down {}", APP_NAME);

    exit_code
}

/// Run the configured view a single time and write the result to stdout.
async fn print_once(state: &AppState, format: PrintFormat) -> ExitCode {
    let pipeline = Pipeline::new(&*state.rate_source, &*state.price_file_source);

    let report = match pipeline.run(state.view, prague_now()).await {
        Ok(Outcome::Report(report)) => report,
        Ok(Outcome::NoData(message)) => {
            println!("{}", message);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("{:?} run failed: {}", state.view, e);
            return ExitCode::FAILURE;
        }
    };

    let spec = build_chart(&report);

    match format {
        PrintFormat::Terminal => print!("{}", render_terminal(&spec)),
        PrintFormat::Html => match render_html(&spec) {
            Ok(html) => print!("{}", html),
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        PrintFormat::Json => match serde_json::to_string_pretty(&spec) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("failed to serialize chart: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}
