use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use cavastock_core::BatchId;
use cavastock_inventory::{
    BulkLoad, CreateEntry, DispatchEntry, EntryPatch, LedgerCommand, LedgerEvent, NewEntry,
    RelocateEntry, Tag, UpdateEntry,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_entries).post(create_entry))
        .route("/bulk", post(bulk_load))
        .route("/:tag", get(get_entry).patch(update_entry).delete(delete_entry))
        .route("/:tag/relocate", post(relocate_entry))
        .route("/:tag/dispatch", post(dispatch_entry))
}

pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::EntriesQuery>,
) -> axum::response::Response {
    let view = services.coordinator().view();
    let entries: Vec<_> = view
        .entries()
        .iter()
        .filter(|e| query.matches(e))
        .cloned()
        .collect();

    Json(dto::EntryListResponse {
        version: view.version(),
        count: entries.len(),
        entries,
    })
    .into_response()
}

pub async fn get_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Path(tag): Path<String>,
) -> axum::response::Response {
    let view = services.coordinator().view();
    match view.get(&Tag::new(tag.as_str())) {
        Some(entry) => Json(entry).into_response(),
        None => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no entry with tag {tag}"),
        ),
    }
}

pub async fn create_entry(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<NewEntry>,
) -> axum::response::Response {
    let expected = match errors::expected_version(&headers) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = LedgerCommand::CreateEntry(CreateEntry {
        entry: body,
        occurred_at: Utc::now(),
    });

    let outcome = match services.coordinator().execute(cmd, expected) {
        Ok(o) => o,
        Err(e) => return errors::coordinator_error_to_response(e),
    };

    let created = outcome.events.iter().find_map(|event| match event {
        LedgerEvent::EntryCreated(c) => Some(c.entry.clone()),
        _ => None,
    });
    let Some(entry) = created else {
        return errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "create produced no entry",
        );
    };

    (
        StatusCode::CREATED,
        Json(dto::MutationResponse::new(&outcome, dto::EntryBody { entry })),
    )
        .into_response()
}

pub async fn bulk_load(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<Vec<NewEntry>>,
) -> axum::response::Response {
    let expected = match errors::expected_version(&headers) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let batch_id = BatchId::new();
    let cmd = LedgerCommand::BulkLoad(BulkLoad {
        batch_id,
        entries: body,
        occurred_at: Utc::now(),
    });

    let outcome = match services.coordinator().execute(cmd, expected) {
        Ok(o) => o,
        Err(e) => return errors::coordinator_error_to_response(e),
    };

    let entries = outcome
        .events
        .iter()
        .find_map(|event| match event {
            LedgerEvent::BatchLoaded(b) => Some(b.entries.clone()),
            _ => None,
        })
        .unwrap_or_default();

    (
        StatusCode::CREATED,
        Json(dto::MutationResponse::new(
            &outcome,
            serde_json::json!({
                "batch_id": batch_id.to_string(),
                "count": entries.len(),
                "entries": entries,
            }),
        )),
    )
        .into_response()
}

pub async fn update_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Path(tag): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<EntryPatch>,
) -> axum::response::Response {
    let expected = match errors::expected_version(&headers) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tag = Tag::new(tag);
    let cmd = LedgerCommand::UpdateEntry(UpdateEntry {
        tag: tag.clone(),
        patch,
        occurred_at: Utc::now(),
    });
    respond_with_entry(&services, cmd, expected, &tag)
}

pub async fn relocate_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Path(tag): Path<String>,
    headers: HeaderMap,
    Json(body): Json<dto::RelocateRequest>,
) -> axum::response::Response {
    let expected = match errors::expected_version(&headers) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tag = Tag::new(tag);
    let cmd = LedgerCommand::RelocateEntry(RelocateEntry {
        tag: tag.clone(),
        location: body.location,
        merma: body.merma,
        operador: body.operador,
        observaciones: body.observaciones,
        occurred_at: Utc::now(),
    });
    respond_with_entry(&services, cmd, expected, &tag)
}

pub async fn dispatch_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Path(tag): Path<String>,
    headers: HeaderMap,
    Json(body): Json<dto::DispatchRequest>,
) -> axum::response::Response {
    let expected = match errors::expected_version(&headers) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tag = Tag::new(tag);
    let cmd = LedgerCommand::DispatchEntry(DispatchEntry {
        tag: tag.clone(),
        destino: body.destino,
        merma: body.merma,
        operador: body.operador,
        observaciones: body.observaciones,
        occurred_at: Utc::now(),
    });
    respond_with_entry(&services, cmd, expected, &tag)
}

/// Entries are never removed from the ledger; they leave stock through a dispatch.
pub async fn delete_entry(Path(tag): Path<String>) -> axum::response::Response {
    let mut resp = errors::json_error(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        format!("entry {tag} cannot be deleted; dispatch it instead"),
    );
    resp.headers_mut()
        .insert(header::ALLOW, header::HeaderValue::from_static("GET, PATCH"));
    resp
}

fn respond_with_entry(
    services: &AppServices,
    cmd: LedgerCommand,
    expected: cavastock_core::ExpectedVersion,
    tag: &Tag,
) -> axum::response::Response {
    let outcome = match services.coordinator().execute(cmd, expected) {
        Ok(o) => o,
        Err(e) => return errors::coordinator_error_to_response(e),
    };

    match outcome.view.get(tag) {
        Some(entry) => Json(dto::MutationResponse::new(
            &outcome,
            dto::EntryBody {
                entry: entry.clone(),
            },
        ))
        .into_response(),
        None => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            format!("entry {tag} missing after mutation"),
        ),
    }
}
