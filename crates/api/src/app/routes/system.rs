use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{sse::Event as SseEvent, IntoResponse},
    Json,
};
use chrono::Utc;

use cavastock_infra::projections::DashboardReport;

use crate::app::{dto, errors};
use crate::app::services::{self, AppServices};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::DashboardQuery>,
) -> axum::response::Response {
    let coordinator = services.coordinator();
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());
    let window = query.window_days.unwrap_or(services.expiry_window_days());

    let report = DashboardReport::build(&coordinator.view(), &coordinator.incidents(), today, window);
    Json(report).into_response()
}

pub async fn sync_status(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    Json(services.coordinator().sync_status()).into_response()
}

/// Retry saving the current snapshot after a degraded mutation.
pub async fn persist(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let coordinator = services.coordinator();
    match coordinator.retry_persistence() {
        Ok(durability) => Json(serde_json::json!({
            "version": coordinator.view().version(),
            "durability": durability,
        }))
        .into_response(),
        Err(e) => errors::coordinator_error_to_response(e),
    }
}

pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    services::ledger_sse_stream(services)
}
