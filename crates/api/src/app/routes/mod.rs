use axum::{
    routing::{get, post},
    Router,
};

pub mod entries;
pub mod incidents;
pub mod locations;
pub mod products;
pub mod system;

/// Router for all ledger endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/dashboard", get(system::dashboard))
        .route("/sync", get(system::sync_status))
        .route("/persist", post(system::persist))
        .route("/events/stream", get(system::stream))
        .nest("/entries", entries::router())
        .nest("/locations", locations::router())
        .nest("/cavas", locations::cavas_router())
        .nest("/products", products::router())
        .nest("/incidents", incidents::router())
}
