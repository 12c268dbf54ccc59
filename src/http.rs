use axum::{
    extract::State,
    response::Html,
    routing::get,
    serve, Json, Router,
};
use axum_macros::debug_handler;
use reqwest::StatusCode;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

use crate::{
    chart::{build_chart, render_html, ChartSpec},
    pipeline::{prague_now, Outcome, Pipeline},
    setup::AppState,
};

/// Serve the chart of the configured view until the process is stopped.
/// Every request runs the pipeline again, nothing is cached between requests.
pub(crate) async fn start_http_server(state: AppState, port: u16) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("now listening on port {}", port);

    serve(listener, router(state)).await
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_chart_page))
        .route("/chart.json", get(get_chart_json))
        .with_state(state)
}

#[debug_handler(state = AppState)]
async fn get_chart_page(
    State(state): State<AppState>,
) -> axum::response::Result<Html<String>> {
    let spec = chart_for_now(&state).await?;

    let page = render_html(&spec).map_err(|e| {
        error!("{}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Html(page))
}

#[debug_handler(state = AppState)]
async fn get_chart_json(State(state): State<AppState>) -> axum::response::Result<Json<ChartSpec>> {
    let spec = chart_for_now(&state).await?;

    Ok(Json(spec))
}

#[instrument(skip(state), fields(view = ?state.view))]
async fn chart_for_now(state: &AppState) -> Result<ChartSpec, (StatusCode, String)> {
    let pipeline = Pipeline::new(&*state.rate_source, &*state.price_file_source);

    match pipeline.run(state.view, prague_now()).await {
        Ok(Outcome::Report(report)) => Ok(build_chart(&report)),
        Ok(Outcome::NoData(message)) => {
            warn!("no data to render");
            Err((StatusCode::SERVICE_UNAVAILABLE, message))
        }
        Err(e) => {
            error!("{}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
