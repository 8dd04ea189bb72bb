use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use cavastock_api::app::{build_app, services::AppServices};
use cavastock_infra::LedgerConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(AppServices::in_memory()).await
    }

    async fn spawn_with(services: AppServices) -> Self {
        // Same router as prod, on an ephemeral port.
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn entry(tag: &str, cava: &str, pasillo: &str, torre: &str, piso: &str) -> Value {
    json!({
        "tag": tag,
        "turno": 1,
        "operador": "ana",
        "codigo": "1001",
        "lote": "L-77",
        "fechaFabricacion": "2024-05-01",
        "fechaVencimiento": "2024-06-01",
        "pesoBruto": 120.5,
        "taraEstibas": 15.0,
        "taraCestas": 0.75,
        "cava": cava,
        "pasillo": pasillo,
        "torre": torre,
        "piso": piso,
        "categoria": "PT"
    })
}

async fn post_json(client: &reqwest::Client, url: String, body: &Value) -> (StatusCode, Value) {
    let res = client.post(url).json(body).send().await.unwrap();
    let status = res.status();
    let body = res.json().await.unwrap_or(Value::Null);
    (status, body)
}

async fn get_json(client: &reqwest::Client, url: String) -> (StatusCode, Value) {
    let res = client.get(url).send().await.unwrap();
    let status = res.status();
    let body = res.json().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn entry_lifecycle_over_http() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // ENTRADA
    let (status, body) = post_json(&client, server.url("/entries"), &entry("A1", "1", "1", "A", "1")).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["version"], 1);
    assert_eq!(body["durability"]["status"], "durable");
    assert_eq!(body["events"], json!(["ledger.entry.created"]));
    assert_eq!(body["entry"]["neto"], 104.75);
    assert_eq!(body["entry"]["producto"], "LOMO DE RES");
    assert_eq!(body["entry"]["tipo"], "ENTRADA");
    assert_eq!(body["entry"]["fechaVencimiento"], "2024-06-01");

    // The slot holds one entry.
    let (status, body) = post_json(&client, server.url("/entries"), &entry("A2", "1", "1", "A", "1")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    let (_, body) = get_json(&client, server.url("/locations/available?cava=1&pasillo=1&torre=A&piso=1")).await;
    assert_eq!(body["available"], false);
    assert_eq!(body["remaining"], 0);
    assert_eq!(body["occupants"], json!(["A1"]));

    // TRASLADO
    let (status, body) = post_json(
        &client,
        server.url("/entries/A1/relocate"),
        &json!({"cava": "2", "pasillo": "3", "torre": "B", "nivel": "2", "operador": "luis"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["version"], 2);
    assert_eq!(body["entry"]["tipo"], "TRASLADO");
    assert_eq!(body["entry"]["origen"], "1");
    assert_eq!(body["entry"]["destino"], "2");
    assert_eq!(body["entry"]["piso"], "2");

    let (_, body) = get_json(&client, server.url("/locations/available?cava=1&pasillo=1&torre=A&piso=1")).await;
    assert_eq!(body["available"], true);

    // SALIDA
    let (status, body) = post_json(
        &client,
        server.url("/entries/A1/dispatch"),
        &json!({"destino": "CLIENTE 7", "merma": 0.25}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["entry"]["tipo"], "SALIDA");
    assert_eq!(body["entry"]["merma"], 0.25);

    let (status, body) = post_json(&client, server.url("/entries/A1/dispatch"), &json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    // Dispatched entries stay queryable and in the slot history.
    let (status, body) = get_json(&client, server.url("/entries/A1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tipo"], "SALIDA");

    let (_, body) = get_json(&client, server.url("/locations/history?cava=2&pasillo=3&torre=B&piso=2")).await;
    assert_eq!(body["count"], 1);

    let (_, body) = get_json(&client, server.url("/entries?state=active")).await;
    assert_eq!(body["count"], 0);
    let (_, body) = get_json(&client, server.url("/entries?state=dispatched")).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn unknown_tags_and_deletes_are_rejected() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, _) = get_json(&client, server.url("/entries/NOPE")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post_json(&client, server.url("/entries/NOPE/dispatch"), &json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    post_json(&client, server.url("/entries"), &entry("D1", "4", "", "", "")).await;
    let res = client.delete(server.url("/entries/D1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = get_json(&client, server.url("/entries/D1")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bulk_load_is_all_or_nothing() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut bad = entry("B2", "3", "", "", "");
    bad["codigo"] = json!("9999");
    let (status, body) = post_json(
        &client,
        server.url("/entries/bulk"),
        &json!([entry("B1", "3", "", "", ""), bad]),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("B2"), "{body}");

    let (_, body) = get_json(&client, server.url("/entries")).await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["version"], 0);

    let (status, body) = post_json(
        &client,
        server.url("/entries/bulk"),
        &json!([entry("B1", "3", "", "", ""), entry("B2", "3", "", "", "")]),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["count"], 2);
    assert_eq!(body["events"], json!(["ledger.batch.loaded"]));

    let (_, body) = get_json(&client, server.url("/cavas/3")).await;
    assert_eq!(body["groups"][0]["entries"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn stale_if_match_is_a_conflict() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    post_json(&client, server.url("/entries"), &entry("V1", "1", "", "", "")).await;

    let res = client
        .patch(server.url("/entries/V1"))
        .header("If-Match", "0")
        .json(&json!({"lote": "L-78"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .patch(server.url("/entries/V1"))
        .header("If-Match", "1")
        .json(&json!({"lote": "L-78"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["entry"]["lote"], "L-78");
    assert_eq!(body["version"], 2);

    let res = client
        .patch(server.url("/entries/V1"))
        .header("If-Match", "latest")
        .json(&json!({"lote": "L-79"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registered_products_can_be_stocked() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut e = entry("P1", "1", "", "", "");
    e["codigo"] = json!("4001");
    let (status, _) = post_json(&client, server.url("/entries"), &e).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = post_json(
        &client,
        server.url("/products"),
        &json!({"code": "4001", "name": "COSTILLA DE CERDO"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["product"]["code"], "4001");

    let (status, body) = post_json(&client, server.url("/entries"), &e).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["entry"]["producto"], "COSTILLA DE CERDO");

    let (_, body) = get_json(&client, server.url("/products")).await;
    assert_eq!(body["count"], 8);
}

#[tokio::test]
async fn dashboard_reports_stock_and_incidents() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    post_json(&client, server.url("/entries"), &entry("K1", "1", "", "", "")).await;
    let mut mp = entry("K2", "2", "", "", "");
    mp["categoria"] = json!("MP");
    mp["fechaVencimiento"] = json!("2024-09-01");
    post_json(&client, server.url("/entries"), &mp).await;

    let (status, body) = post_json(
        &client,
        server.url("/incidents"),
        &json!({"type": "CORTE DE ENERGIA", "description": "planta sin luz", "duration": 40}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["type"], "CORTE DE ENERGIA");

    let (status, _) = post_json(&client, server.url("/incidents"), &json!({"type": "  "})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = get_json(&client, server.url("/incidents")).await;
    assert_eq!(body["count"], 1);

    let (status, body) = get_json(&client, server.url("/dashboard?today=2024-05-28&window_days=7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_entries"], 2);
    assert_eq!(body["active_neto"], 209.5);
    assert_eq!(body["by_category"]["MP"]["entries"], 1);
    assert_eq!(body["by_category"]["PT"]["entries"], 1);
    assert_eq!(body["near_expiry"].as_array().unwrap().len(), 1);
    assert_eq!(body["near_expiry"][0]["tag"], "K1");
    assert_eq!(body["near_expiry"][0]["daysLeft"], 4);
    assert_eq!(body["incidents"][0]["count"], 1);
    assert_eq!(body["incidents"][0]["total_duration"], 40);

    let (_, body) = get_json(&client, server.url("/cavas")).await;
    assert_eq!(body["cavas"], json!(["1", "2"]));
}

#[tokio::test]
async fn sync_and_persist_report_status() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, server.url("/sync")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");

    let res = client.post(server.url("/persist")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["durability"]["status"], "durable");
    assert_eq!(body["version"], 0);
}

#[tokio::test]
async fn ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = LedgerConfig {
        data_dir: dir.path().to_path_buf(),
        ..LedgerConfig::default()
    };
    let client = reqwest::Client::new();

    {
        let server = TestServer::spawn_with(AppServices::from_config(&config).unwrap()).await;
        let (status, body) = post_json(&client, server.url("/entries"), &entry("R1", "5", "2", "C", "1")).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["durability"]["status"], "durable");
    }

    let server = TestServer::spawn_with(AppServices::from_config(&config).unwrap()).await;
    let (status, body) = get_json(&client, server.url("/entries/R1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["neto"], 104.75);
    assert_eq!(body["cava"], "5");

    // Versions continue from the saved ledger instead of restarting at 0.
    let (_, listed) = get_json(&client, server.url("/entries")).await;
    assert_eq!(listed["version"], 1);

    // Restored entries still occupy their slot.
    let (status, _) = post_json(&client, server.url("/entries"), &entry("R2", "5", "2", "C", "1")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
