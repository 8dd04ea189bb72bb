use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;

use cavastock_inventory::NewIncident;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/", get(list_incidents).post(record_incident))
}

pub async fn list_incidents(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let incidents = services.coordinator().incidents();
    Json(dto::IncidentListResponse {
        count: incidents.len(),
        incidents,
    })
    .into_response()
}

pub async fn record_incident(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<NewIncident>,
) -> axum::response::Response {
    match services.coordinator().record_incident(body, Utc::now()) {
        Ok(incident) => (StatusCode::CREATED, Json(incident)).into_response(),
        Err(e) => errors::coordinator_error_to_response(e),
    }
}
