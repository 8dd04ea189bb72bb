use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;

use cavastock_inventory::{LedgerCommand, LedgerEvent, RegisterProduct};
use cavastock_products::Product;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/", get(list_products).post(register_product))
}

pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let products = services.coordinator().view().catalog().list();
    Json(serde_json::json!({
        "count": products.len(),
        "products": products,
    }))
    .into_response()
}

pub async fn register_product(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<Product>,
) -> axum::response::Response {
    let expected = match errors::expected_version(&headers) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = LedgerCommand::RegisterProduct(RegisterProduct {
        product: body,
        occurred_at: Utc::now(),
    });

    let outcome = match services.coordinator().execute(cmd, expected) {
        Ok(o) => o,
        Err(e) => return errors::coordinator_error_to_response(e),
    };

    let product = outcome.events.iter().find_map(|event| match event {
        LedgerEvent::ProductRegistered(p) => Some(p.product.clone()),
        _ => None,
    });

    (
        StatusCode::CREATED,
        Json(dto::MutationResponse::new(
            &outcome,
            serde_json::json!({ "product": product }),
        )),
    )
        .into_response()
}
