use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use cavastock_inventory::LocationKey;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/occupancy", get(occupancy))
        .route("/available", get(availability))
        .route("/history", get(history))
}

pub fn cavas_router() -> Router {
    Router::new()
        .route("/", get(list_cavas))
        .route("/:cava", get(cava_detail))
}

pub async fn occupancy(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let view = services.coordinator().view();
    Json(dto::OccupancyResponse {
        version: view.version(),
        occupied: view.map().occupied_coordinates(),
    })
    .into_response()
}

/// GET /locations/available?cava=..&pasillo=..&torre=..&piso=..&pagina=..
pub async fn availability(
    Extension(services): Extension<Arc<AppServices>>,
    Query(key): Query<LocationKey>,
) -> axum::response::Response {
    let key = key.normalized();
    if !key.has_cava() {
        return errors::json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "cava is required",
        );
    }

    let view = services.coordinator().view();
    let map = view.map();
    let occupants = map
        .occupancy_of(&key)
        .into_iter()
        .map(|tag| tag.as_str().to_string())
        .collect();

    Json(dto::AvailabilityResponse {
        available: map.is_slot_available(&key),
        remaining: map.remaining_capacity(&key),
        occupants,
        location: key,
    })
    .into_response()
}

/// Every entry that ever sat at a coordinate, dispatched ones included.
pub async fn history(
    Extension(services): Extension<Arc<AppServices>>,
    Query(key): Query<LocationKey>,
) -> axum::response::Response {
    let key = key.normalized();
    let view = services.coordinator().view();
    let entries: Vec<_> = view.map().history_at(&key).into_iter().cloned().collect();

    Json(dto::EntryListResponse {
        version: view.version(),
        count: entries.len(),
        entries,
    })
    .into_response()
}

pub async fn list_cavas(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let view = services.coordinator().view();
    Json(serde_json::json!({
        "version": view.version(),
        "cavas": view.map().cavas(),
    }))
    .into_response()
}

pub async fn cava_detail(
    Extension(services): Extension<Arc<AppServices>>,
    Path(cava): Path<String>,
) -> axum::response::Response {
    let view = services.coordinator().view();
    let cava = cava.trim().to_string();
    let groups = view.map().entries_by_cava(&cava);

    Json(dto::CavaResponse { cava, groups }).into_response()
}
