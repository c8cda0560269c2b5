use std::sync::Arc;
use std::time::Duration;

use atelie_api::app::{build_app, services::AppServices};
use atelie_api::config::AppConfig;
use atelie_core::TenantId;
use atelie_infra::rate_limit::RateLimitPolicy;
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(AppConfig::default()).await
    }

    async fn spawn_with(config: AppConfig) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = build_app(Arc::new(AppServices::in_memory(&config)));
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

struct Tenant<'a> {
    srv: &'a TestServer,
    client: reqwest::Client,
    id: TenantId,
}

impl<'a> Tenant<'a> {
    fn new(srv: &'a TestServer) -> Self {
        Self {
            srv,
            client: reqwest::Client::new(),
            id: TenantId::new(),
        }
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(self.srv.url(path))
            .header("x-tenant-id", self.id.to_string())
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .request(method, self.srv.url(path))
            .header("x-tenant-id", self.id.to_string())
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, body).await
    }

    async fn create_material(&self, name: &str, quantity: i64, minimum: i64) -> String {
        let (status, body) = self
            .post(
                "/materials",
                json!({
                    "name": name,
                    "unit": "m",
                    "initial_quantity": quantity,
                    "minimum_quantity": minimum,
                    "unit_cost": 1500,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn create_product(&self, material_id: &str, per_unit: i64) -> String {
        let (status, body) = self
            .post(
                "/products",
                json!({
                    "name": "Linen tote",
                    "bill": [{ "material_id": material_id, "quantity_per_unit": per_unit, "unit": "m" }],
                    "labor_minutes": 90,
                    "profit_margin": 35,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn pending_order(&self, product_id: &str, quantity: i64) -> String {
        let (status, body) = self.post("/orders", json!({ "customer_name": "Helena" })).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let order_id = body["id"].as_str().unwrap().to_string();

        let (status, body) = self
            .post(
                &format!("/orders/{order_id}/items"),
                json!({ "product_id": product_id, "quantity": quantity, "unit_price": 9000 }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let (status, body) = self
            .post(&format!("/orders/{order_id}/status"), json!({ "status": "pending" }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        order_id
    }

    async fn material_quantity(&self, material_id: &str) -> String {
        let (status, body) = self.get(&format!("/materials/{material_id}")).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["quantity"].as_str().unwrap().to_string()
    }
}

/// The material list is served from an eventually consistent projection.
async fn list_eventually(tenant: &Tenant<'_>, path: &str, expected_len: usize) -> Vec<Value> {
    for _ in 0..50 {
        let (status, body) = tenant.get(path).await;
        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().cloned().unwrap_or_default();
        if items.len() == expected_len {
            return items;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{path} did not reach {expected_len} items within timeout");
}

#[tokio::test]
async fn health_needs_no_tenant() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_header_is_required() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/materials")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_tenant");

    let res = client
        .get(srv.url("/materials"))
        .header("x-tenant-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn producing_with_enough_stock_deducts_it() {
    let srv = TestServer::spawn().await;
    let tenant = Tenant::new(&srv);
    let linen = tenant.create_material("Linen", 20, 0).await;
    let tote = tenant.create_product(&linen, 5).await;
    let order_id = tenant.pending_order(&tote, 2).await;

    let (status, report) = tenant.get(&format!("/orders/{order_id}/stock-availability")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["available"], true);
    assert!(report["shortfalls"].as_array().unwrap().is_empty());

    let (status, order) = tenant
        .post(&format!("/orders/{order_id}/status"), json!({ "status": "producing" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{order}");
    assert_eq!(order["status"], "producing");

    assert_eq!(tenant.material_quantity(&linen).await, "10");
}

#[tokio::test]
async fn producing_with_short_stock_is_rejected_and_nothing_changes() {
    let srv = TestServer::spawn().await;
    let tenant = Tenant::new(&srv);
    let linen = tenant.create_material("Linen", 20, 0).await;
    let tote = tenant.create_product(&linen, 15).await;
    let order_id = tenant.pending_order(&tote, 2).await;

    let (status, report) = tenant.get(&format!("/orders/{order_id}/stock-availability")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["available"], false);
    assert_eq!(report["shortfalls"][0]["name"], "Linen");
    assert_eq!(report["shortfalls"][0]["required"], "30");
    assert_eq!(report["shortfalls"][0]["available"], "20");

    let (status, body) = tenant
        .post(&format!("/orders/{order_id}/status"), json!({ "status": "producing" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_stock");
    assert!(body["message"].as_str().unwrap().contains("Linen"));
    assert_eq!(body["shortfalls"].as_array().unwrap().len(), 1);

    assert_eq!(tenant.material_quantity(&linen).await, "20");
    let (_, order) = tenant.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["status"], "pending");
}

#[tokio::test]
async fn production_alias_is_not_a_status() {
    let srv = TestServer::spawn().await;
    let tenant = Tenant::new(&srv);
    let linen = tenant.create_material("Linen", 20, 0).await;
    let tote = tenant.create_product(&linen, 1).await;
    let order_id = tenant.pending_order(&tote, 1).await;

    let (status, body) = tenant
        .post(&format!("/orders/{order_id}/status"), json!({ "status": "production" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_status");
}

#[tokio::test]
async fn skipping_production_is_refused() {
    let srv = TestServer::spawn().await;
    let tenant = Tenant::new(&srv);
    let linen = tenant.create_material("Linen", 20, 0).await;
    let tote = tenant.create_product(&linen, 1).await;
    let order_id = tenant.pending_order(&tote, 1).await;

    let (status, body) = tenant
        .post(&format!("/orders/{order_id}/status"), json!({ "status": "ready" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invariant_violation");
}

#[tokio::test]
async fn movements_and_low_stock_listing() {
    let srv = TestServer::spawn().await;
    let tenant = Tenant::new(&srv);
    let linen = tenant.create_material("Linen", 20, 5).await;
    tenant.create_material("Thread", 100, 10).await;

    let (status, body) = tenant
        .post(
            &format!("/materials/{linen}/movements"),
            json!({ "kind": "exit", "quantity": 16, "reason": "sample" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(tenant.material_quantity(&linen).await, "4");

    let (status, body) = tenant
        .post(
            &format!("/materials/{linen}/movements"),
            json!({ "kind": "exit", "quantity": 10 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");

    list_eventually(&tenant, "/materials", 2).await;
    let low = list_eventually(&tenant, "/materials/low-stock", 1).await;
    assert_eq!(low[0]["name"], "Linen");
    assert_eq!(low[0]["quantity"], "4");
}

#[tokio::test]
async fn replacing_a_bill_changes_requirements() {
    let srv = TestServer::spawn().await;
    let tenant = Tenant::new(&srv);
    let linen = tenant.create_material("Linen", 20, 0).await;
    let tote = tenant.create_product(&linen, 15).await;
    let order_id = tenant.pending_order(&tote, 2).await;

    let (status, body) = tenant
        .send(
            reqwest::Method::PUT,
            &format!("/products/{tote}/bill"),
            json!({ "bill": [{ "material_id": linen, "quantity_per_unit": "2.5", "unit": "m" }] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, report) = tenant.get(&format!("/orders/{order_id}/stock-availability")).await;
    assert_eq!(report["available"], true);
}

#[tokio::test]
async fn tenants_do_not_see_each_other() {
    let srv = TestServer::spawn().await;
    let owner = Tenant::new(&srv);
    let other = Tenant::new(&srv);
    let linen = owner.create_material("Linen", 20, 0).await;
    let tote = owner.create_product(&linen, 1).await;
    let order_id = owner.pending_order(&tote, 1).await;

    let (status, _) = other.get(&format!("/materials/{linen}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = other.get(&format!("/orders/{order_id}/stock-availability")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    list_eventually(&owner, "/materials", 1).await;
    let (_, body) = other.get("/materials").await;
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn requests_beyond_the_window_limit_are_refused() {
    let config = AppConfig {
        rate_limit: RateLimitPolicy::new(3, Duration::from_secs(60)),
        ..AppConfig::default()
    };
    let srv = TestServer::spawn_with(config).await;
    let tenant = Tenant::new(&srv);

    for _ in 0..3 {
        let (status, _) = tenant.get("/materials").await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = tenant.get("/materials").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");

    // Limits are per tenant.
    let other = Tenant::new(&srv);
    let (status, _) = other.get("/materials").await;
    assert_eq!(status, StatusCode::OK);
}
