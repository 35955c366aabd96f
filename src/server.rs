use std::{future::Future, sync::Arc, time::Duration};

use poem::{
    error::InternalServerError,
    get, handler,
    listener::TcpListener,
    middleware::AddData,
    web::{Data, Html, Query},
    EndpointExt, Route, Server,
};
use serde::Deserialize;
use tracing::debug;

use crate::{
    buffer::SharedBuffer,
    view::{memory_chart_html, page_html, ChartView, CHART_DIV_ID},
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct AppState {
    buffer: SharedBuffer,
}

#[derive(Debug, Deserialize)]
struct ChartQuery {
    #[serde(default)]
    view: ChartView,
}

#[handler]
fn healthz() -> &'static str {
    "OK"
}

#[handler]
async fn index(
    query: Query<ChartQuery>,
    state: Data<&Arc<AppState>>,
) -> poem::Result<Html<String>> {
    let view = query.0.view;
    let now = crate::now();
    let buffer = state.buffer.clone();
    let points = tokio::task::spawn_blocking(move || view.points(&buffer, now))
        .await
        .map_err(InternalServerError)?;
    debug!(view = view.as_str(), points = points.len(), "rendering chart");
    let time_range = (now.saturating_sub(view.span().as_secs()), now);
    let chart = memory_chart_html(&points, time_range, view.title(), Some(CHART_DIV_ID));
    Ok(Html(page_html(chart, view)))
}

pub fn app(buffer: SharedBuffer) -> impl poem::Endpoint {
    let state = Arc::new(AppState { buffer });
    Route::new()
        .at("/", get(index))
        .at("/healthz", get(healthz))
        .with(AddData::new(state))
}

/// Serves the chart pages on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: &str,
    buffer: SharedBuffer,
    shutdown: impl Future<Output = ()> + Send,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr.to_owned());
    Server::new(listener)
        .run_with_graceful_shutdown(app(buffer), shutdown, Some(SHUTDOWN_TIMEOUT))
        .await
}
