use chrono::{Datelike, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};

use stockledger_api::config::AppConfig;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory backend, ephemeral port.
        let app = stockledger_api::app::build_app(&AppConfig::default())
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str, role: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header("x-actor", "alice")
            .header("x-role", role)
    }

    fn post(&self, path: &str, role: &str, body: Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("x-actor", "alice")
            .header("x-role", role)
            .json(&body)
    }

    fn delete(&self, path: &str, role: &str) -> reqwest::RequestBuilder {
        self.client
            .delete(self.url(path))
            .header("x-actor", "alice")
            .header("x-role", role)
    }

    /// Two warehouses and one product with a threshold of 10.
    async fn seed(&self) {
        for (id, name) in [("w1", "Main Store"), ("w2", "Kitchen")] {
            let res = self
                .post(
                    "/warehouses",
                    "admin",
                    json!({ "id": id, "name": name, "location": "Downtown", "category": "storage" }),
                )
                .send()
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::CREATED);
        }
        let res = self
            .post(
                "/products",
                "admin",
                json!({ "name": "Vanilla Syrup", "category": "Syrups", "unit": "bottle", "lowStockThreshold": 10 }),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    async fn stock_in(&self, warehouse: &str, code: &str, quantity: i64) -> reqwest::Response {
        self.post(
            "/ledger/stock-in",
            "staff",
            json!({
                "warehouseId": warehouse,
                "product": "Vanilla Syrup",
                "code": code,
                "quantity": quantity,
                "expiryDate": "2030-01-31",
                "reason": "Delivery"
            }),
        )
        .send()
        .await
        .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let res = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn requests_without_actor_are_unauthorized() {
    let server = TestServer::spawn().await;
    let res = server.client.get(server.url("/warehouses")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server
        .client
        .get(server.url("/whoami"))
        .header("x-actor", "alice")
        .header("x-role", "owner")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_defaults_role_to_staff() {
    let server = TestServer::spawn().await;
    let res = server
        .client
        .get(server.url("/whoami"))
        .header("x-actor", "bob")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["actor"], "bob");
    assert_eq!(body["role"], "staff");
}

#[tokio::test]
async fn staff_cannot_change_master_data() {
    let server = TestServer::spawn().await;
    let res = server
        .post(
            "/warehouses",
            "staff",
            json!({ "id": "w9", "name": "Annex", "location": "Uptown", "category": "production" }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn duplicate_warehouse_is_a_conflict() {
    let server = TestServer::spawn().await;
    server.seed().await;
    let res = server
        .post(
            "/warehouses",
            "admin",
            json!({ "id": "w1", "name": "Again", "location": "Elsewhere", "category": "storage" }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn stock_flow_updates_batches_and_totals() {
    let server = TestServer::spawn().await;
    server.seed().await;

    let res = server.stock_in("w1", "B-001", 20).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let tx: Value = res.json().await.unwrap();
    assert_eq!(tx["type"], "stockIn");
    assert_eq!(tx["quantity"], 20);
    assert_eq!(tx["by"], "alice");
    assert_eq!(tx["unit"], "bottle");

    let res = server.stock_in("w1", "B-001", 5).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "duplicate_batch");

    let res = server
        .post(
            "/ledger/stock-out",
            "staff",
            json!({ "warehouseId": "w1", "product": "Vanilla Syrup", "code": "B-001", "quantity": 8, "reason": "Used" }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server
        .post(
            "/ledger/transfer",
            "staff",
            json!({ "from": "w1", "to": "w2", "product": "Vanilla Syrup", "code": "B-001", "quantity": 5 }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let receipt: Value = res.json().await.unwrap();
    assert_eq!(receipt["transferOut"]["type"], "transferOut");
    assert_eq!(receipt["transferIn"]["type"], "transferIn");
    assert_eq!(receipt["transferIn"]["counterpartWarehouse"], "w1");

    let w1: Value = server.get("/warehouses/w1", "staff").send().await.unwrap().json().await.unwrap();
    assert_eq!(w1["totalItems"], 7);
    let w2: Value = server.get("/warehouses/w2", "staff").send().await.unwrap().json().await.unwrap();
    assert_eq!(w2["totalItems"], 5);

    let batches: Value = server
        .get("/warehouses/w2/batches", "staff")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(batches["items"].as_array().unwrap().len(), 1);
    assert_eq!(batches["items"][0]["expiryDate"], "2030-01-31");

    let log: Value = server
        .get("/warehouses/w1/transactions", "staff")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let kinds: Vec<&str> = log["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["transferOut", "stockOut", "stockIn"]);
}

#[tokio::test]
async fn overdraw_reports_available_quantity() {
    let server = TestServer::spawn().await;
    server.seed().await;
    server.stock_in("w1", "B-001", 3).await;

    let res = server
        .post(
            "/ledger/stock-out",
            "staff",
            json!({ "warehouseId": "w1", "product": "Vanilla Syrup", "code": "B-001", "quantity": 4, "reason": "Used" }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["available"], 3);
    assert_eq!(body["requested"], 4);
}

#[tokio::test]
async fn invalid_quantity_is_a_bad_request() {
    let server = TestServer::spawn().await;
    server.seed().await;
    let res = server.stock_in("w1", "B-001", 0).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn unknown_warehouse_is_not_found() {
    let server = TestServer::spawn().await;
    server.seed().await;
    let res = server.stock_in("w404", "B-001", 1).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn edit_requires_admin() {
    let server = TestServer::spawn().await;
    server.seed().await;
    server.stock_in("w1", "B-001", 12).await;

    let edit = json!({ "warehouseId": "w1", "code": "B-001", "quantity": 4 });
    let res = server.post("/ledger/edit", "staff", edit.clone()).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server.post("/ledger/edit", "admin", edit).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let tx: Value = res.json().await.unwrap();
    assert_eq!(tx["type"], "edit");
    assert_eq!(tx["previousQuantity"], 12);
}

#[tokio::test]
async fn low_stock_lists_short_batches() {
    let server = TestServer::spawn().await;
    server.seed().await;
    server.stock_in("w1", "B-001", 3).await;
    server.stock_in("w1", "B-002", 2).await;
    server.stock_in("w2", "B-003", 40).await;

    let body: Value = server.get("/low-stock", "staff").send().await.unwrap().json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|a| a["warehouseId"] == "w1"));
    assert!(items.iter().all(|a| a["totalQuantity"] == 5));

    let body: Value = server
        .get("/low-stock?warehouse=w1&by_product=true", "staff")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let rows = body["items"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["codes"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn history_filters_by_month() {
    let server = TestServer::spawn().await;
    server.seed().await;
    server.stock_in("w1", "B-001", 3).await;
    server.stock_in("w2", "B-002", 4).await;

    let now = Utc::now();
    let body: Value = server
        .get(
            &format!("/ledger/transactions?year={}&month={}", now.year(), now.month()),
            "staff",
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    let body: Value = server
        .get("/ledger/transactions?year=1999&month=1", "staff")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["items"].as_array().unwrap().is_empty());

    let res = server
        .get("/ledger/transactions?year=2024&month=13", "staff")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn product_unit_change_resyncs_batches() {
    let server = TestServer::spawn().await;
    server.seed().await;
    server.stock_in("w1", "B-001", 3).await;

    let res = server
        .post(
            "/products",
            "admin",
            json!({ "name": "Vanilla Syrup", "category": "Syrups", "unit": "case" }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["batchesResynced"], 1);

    let batches: Value = server
        .get("/warehouses/w1/batches", "staff")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(batches["items"][0]["unit"], "case");

    let log: Value = server
        .get("/warehouses/w1/transactions", "staff")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(log["items"][0]["unit"], "bottle");
}

#[tokio::test]
async fn deleting_a_warehouse_cascades() {
    let server = TestServer::spawn().await;
    server.seed().await;
    server.stock_in("w1", "B-001", 3).await;
    server.stock_in("w1", "B-002", 6).await;

    let res = server.delete("/warehouses/w1", "staff").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server.delete("/warehouses/w1", "admin").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["batches"], 2);
    assert_eq!(body["transactions"], 2);

    let res = server.get("/warehouses/w1", "staff").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = server.get("/warehouses/w1/batches", "staff").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn memory_backend_has_nothing_to_reconcile() {
    let server = TestServer::spawn().await;
    let res = server.get("/transfers/pending", "staff").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body: Value = server
        .get("/transfers/pending", "admin")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["items"].as_array().unwrap().is_empty());
}
