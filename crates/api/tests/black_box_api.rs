use chrono::{Duration as ChronoDuration, Utc};
use placetrack_api::app::{build_app_with_services, services::AppServices};
use placetrack_auth::{JwtClaims, PrincipalId, Role};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over a fresh in-memory store, on an ephemeral port.
        let app = build_app_with_services(JWT_SECRET.to_string(), AppServices::in_memory());
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

fn mint_jwt(sub: PrincipalId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        roles,
        issued_at: now - ChronoDuration::seconds(1),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn token(role: &'static str) -> String {
    mint_jwt(PrincipalId::new(), vec![Role::new(role)])
}

async fn create_environment(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    label: &str,
) -> String {
    let res = client
        .post(srv.url("/environments"))
        .bearer_auth(token)
        .json(&json!({ "label": label }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn register_item(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    environment_id: Option<&str>,
) -> String {
    let res = client
        .post(srv.url("/items"))
        .bearer_auth(token)
        .json(&json!({
            "name": "Projector",
            "item_type": "electronics",
            "environment_id": environment_id,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn move_item(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    item_id: &str,
    environment_id: &str,
) -> reqwest::Response {
    client
        .patch(srv.url(&format!("/items/{item_id}/move/{environment_id}")))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
}

async fn history(client: &reqwest::Client, srv: &TestServer, token: &str, item_id: &str) -> Vec<Value> {
    let res = client
        .get(srv.url(&format!("/items/{item_id}/movements")))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/items"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_signed_with_another_secret_is_rejected() {
    let srv = TestServer::spawn().await;
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        roles: vec![Role::new(Role::ADMIN)],
        issued_at: now - ChronoDuration::seconds(1),
        expires_at: now + ChronoDuration::minutes(10),
    };
    let forged = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let sub = PrincipalId::new();
    let token = mint_jwt(sub, vec![Role::new(Role::OPERATOR)]);

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["principal_id"].as_str().unwrap(), sub.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "operator"));
    assert!(body["permissions"].as_array().unwrap().iter().any(|p| p == "items.move"));
}

#[tokio::test]
async fn move_conflict_move_back_and_unknown_item() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = token(Role::ADMIN);

    let a = create_environment(&client, &srv, &admin, "Room A").await;
    let b = create_environment(&client, &srv, &admin, "Room B").await;
    let item = register_item(&client, &srv, &admin, Some(a.as_str())).await;

    let u1 = PrincipalId::new();
    let u2 = PrincipalId::new();
    let u3 = PrincipalId::new();
    let operator = |sub| mint_jwt(sub, vec![Role::new(Role::OPERATOR)]);

    // U1: A -> B
    let res = move_item(&client, &srv, &operator(u1), &item, &b).await;
    assert_eq!(res.status(), StatusCode::OK);
    let first: Value = res.json().await.unwrap();
    assert_eq!(first["item_id"], item);
    assert_eq!(first["previous_environment_id"], a);
    assert_eq!(first["next_environment_id"], b);
    assert_eq!(first["mover"], u1.to_string());

    // U2: B -> B is rejected
    let res = move_item(&client, &srv, &operator(u2), &item, &b).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(
        res.headers().get("x-reason").unwrap(),
        "already_in_target_environment"
    );
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["reason"], "already_in_target_environment");

    // U3: B -> A
    let res = move_item(&client, &srv, &operator(u3), &item, &a).await;
    assert_eq!(res.status(), StatusCode::OK);
    let second: Value = res.json().await.unwrap();
    assert_eq!(second["previous_environment_id"], b);
    assert_eq!(second["next_environment_id"], a);
    assert_eq!(second["mover"], u3.to_string());

    let entries = history(&client, &srv, &admin, &item).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], first["id"]);
    assert_eq!(entries[1]["id"], second["id"]);
    assert!(entries[0]["sequence"].as_u64() < entries[1]["sequence"].as_u64());

    let res = client
        .get(srv.url(&format!("/items/{item}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["current_environment"]["id"], a);
    assert_eq!(body["current_environment"]["label"], "Room A");

    // Unknown item
    let unknown = uuid::Uuid::now_v7().to_string();
    let res = move_item(&client, &srv, &admin, &unknown, &a).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["entity"], "item");

    assert_eq!(history(&client, &srv, &admin, &item).await.len(), 2);
}

#[tokio::test]
async fn unknown_environment_is_reported_as_such() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = token(Role::ADMIN);

    let a = create_environment(&client, &srv, &admin, "Room A").await;
    let item = register_item(&client, &srv, &admin, Some(a.as_str())).await;

    let unknown = uuid::Uuid::now_v7().to_string();
    let res = move_item(&client, &srv, &admin, &item, &unknown).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["entity"], "environment");

    assert!(history(&client, &srv, &admin, &item).await.is_empty());
}

#[tokio::test]
async fn history_of_unknown_item_is_404_and_unmoved_item_is_empty() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = token(Role::ADMIN);

    let item = register_item(&client, &srv, &admin, None).await;
    assert!(history(&client, &srv, &admin, &item).await.is_empty());

    let res = client
        .get(srv.url(&format!("/items/{}/movements", uuid::Uuid::now_v7())))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_ids_are_bad_requests() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = token(Role::ADMIN);

    let res = move_item(&client, &srv, &admin, "nope", "also-nope").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn roles_gate_writes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = token(Role::ADMIN);
    let auditor = token(Role::AUDITOR);
    let operator = token(Role::OPERATOR);

    let a = create_environment(&client, &srv, &admin, "Room A").await;
    let b = create_environment(&client, &srv, &admin, "Room B").await;
    let item = register_item(&client, &srv, &operator, Some(a.as_str())).await;

    let res = move_item(&client, &srv, &auditor, &item, &b).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url("/environments"))
        .bearer_auth(&operator)
        .json(&json!({ "label": "Room C" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/items"))
        .bearer_auth(token("visitor"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Denied move left nothing behind.
    assert!(history(&client, &srv, &auditor, &item).await.is_empty());
}

#[tokio::test]
async fn registration_validates_input() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = token(Role::ADMIN);

    let res = client
        .post(srv.url("/items"))
        .bearer_auth(&admin)
        .json(&json!({ "name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/items"))
        .bearer_auth(&admin)
        .json(&json!({ "name": "Desk", "environment_id": uuid::Uuid::now_v7() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["entity"], "environment");

    let res = client
        .post(srv.url("/environments"))
        .bearer_auth(&admin)
        .json(&json!({ "label": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn environment_contents_and_ledger_query() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = token(Role::ADMIN);

    let a = create_environment(&client, &srv, &admin, "Room A").await;
    let b = create_environment(&client, &srv, &admin, "Room B").await;
    let first = register_item(&client, &srv, &admin, Some(a.as_str())).await;
    let second = register_item(&client, &srv, &admin, Some(a.as_str())).await;

    assert_eq!(move_item(&client, &srv, &admin, &first, &b).await.status(), StatusCode::OK);
    assert_eq!(move_item(&client, &srv, &admin, &second, &b).await.status(), StatusCode::OK);
    assert_eq!(move_item(&client, &srv, &admin, &first, &a).await.status(), StatusCode::OK);

    let res = client
        .get(srv.url(&format!("/environments/{b}/items")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let items: Vec<Value> = res.json().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], second);

    let res = client
        .get(srv.url(&format!("/movements?item_id={first}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["total"], 2);
    assert_eq!(page["has_more"], false);

    let res = client
        .get(srv.url(&format!("/movements?environment_id={b}&limit=2")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["total"], 3);
    assert_eq!(page["movements"].as_array().unwrap().len(), 2);
    assert_eq!(page["pagination"]["limit"], 2);
    assert_eq!(page["has_more"], true);

    let res = client
        .get(srv.url("/movements?mover=bogus"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
