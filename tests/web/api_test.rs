use async_trait::async_trait;
use reqwest::StatusCode;
use semsql::config::{LlmSettings, Settings};
use semsql::llm::{LanguageModel, LlmResult, ProviderRegistry};
use semsql::web::{router, AppState};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const SUGGESTED_LAYER: &str = r#"```json
{"tables": {"orders": {"columns": {"id": [], "amount": ["revenue"]}, "metrics": {"total_revenue": "SUM(amount)"}}}}
```"#;

/// Answers suggestion prompts with a semantic layer and everything else
/// with a fenced `SELECT 1;`.
struct Canned;

#[async_trait]
impl LanguageModel for Canned {
    fn provider(&self) -> &str {
        "canned"
    }

    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        if prompt.contains("Propose a semantic layer") {
            Ok(SUGGESTED_LAYER.to_string())
        } else if prompt.contains("Question: say nothing") {
            Ok("   ".to_string())
        } else {
            Ok("```sql\nSELECT 1;\n```".to_string())
        }
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    dir: TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn register(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/register"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap()
    }

    async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap()
    }

    /// Register and log in a fresh user, returning the bearer token.
    async fn token(&self) -> String {
        assert_eq!(self.register("alice", "secret123").await.status(), StatusCode::OK);
        let body: Value = self.login("alice", "secret123").await.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }
}

fn seed(path: &Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "
        CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT);
        CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            customer_id INTEGER REFERENCES customers(id),
            amount REAL,
            updated_at TEXT
        );
        INSERT INTO customers VALUES (1, 'Ada');
        INSERT INTO orders VALUES (1, 1, 42.0, '2024-05-01T12:00:00');
        ",
    )
    .unwrap();
}

async fn start(provider: &str) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("warehouse.db");
    seed(&db_path);

    let mut settings = Settings::default();
    settings.database.url = Some(format!("sqlite:///{}", db_path.display()));
    settings.semantic.path = dir.path().join("config").join("semantic_layer.json");
    settings.auth.user_db_path = dir.path().join("users.db");
    settings.auth.secret = Some("test-secret".to_string());
    settings.llm = LlmSettings::for_provider(provider);

    let mut registry = ProviderRegistry::with_builtins();
    registry.register("canned", |_: &LlmSettings| Ok(Arc::new(Canned) as Arc<dyn LanguageModel>));

    let state = AppState::with_registry(&settings, registry).unwrap();
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        dir,
    }
}

#[tokio::test]
async fn test_liveness() {
    let server = start("canned").await;
    let resp = server.client.get(server.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_register_then_duplicate_in_any_case() {
    let server = start("canned").await;

    let resp = server.register("alice", "secret123").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({ "success": true }));

    for name in ["alice", "ALICE", "  Alice "] {
        let resp = server.register(name, "other-password").await;
        assert_eq!(resp.status(), StatusCode::CONFLICT, "{}", name);
        let body: Value = resp.json().await.unwrap();
        assert!(body["detail"].is_string());
    }
}

#[tokio::test]
async fn test_login_and_bearer_gate() {
    let server = start("canned").await;
    server.register("alice", "secret123").await;

    assert_eq!(
        server.login("alice", "wrong").await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        server.login("nobody", "secret123").await.status(),
        StatusCode::UNAUTHORIZED
    );

    let resp = server.login("Alice", "secret123").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["token_type"], "bearer");
    let token = body["access_token"].as_str().unwrap();

    let anonymous = server.client.get(server.url("/schema")).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.headers()["www-authenticate"], "Bearer");

    let forged = server
        .client
        .get(server.url("/schema"))
        .bearer_auth(format!("{}x", token))
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    let resp = server
        .client
        .get(server.url("/schema"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let tables: Vec<&str> = body["tables"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(tables, vec!["customers", "orders"]);
    assert_eq!(body["tables"]["orders"]["primary_key"], json!(["id"]));
    assert_eq!(
        body["tables"]["orders"]["foreign_keys"][0]["referred_table"],
        "customers"
    );
    assert_eq!(body["tables"]["orders"]["columns"][2], json!({"name": "amount", "type": "REAL"}));
}

#[tokio::test]
async fn test_query_executes_fenced_sql() {
    let server = start("canned").await;
    let token = server.token().await;

    let resp = server
        .client
        .post(server.url("/query"))
        .bearer_auth(&token)
        .json(&json!({ "question": "give me a one" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({
            "success": true,
            "response": {
                "type": "query_result",
                "sql": "SELECT 1;",
                "columns": ["1"],
                "rows": [[1]]
            }
        })
    );

    let resp = server
        .client
        .post(server.url("/query"))
        .bearer_auth(&token)
        .json(&json!({ "question": "say nothing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({ "success": false, "error": "Failed to generate SQL." })
    );
}

#[tokio::test]
async fn test_query_request_validation() {
    let server = start("canned").await;
    let token = server.token().await;

    let unauthenticated = server
        .client
        .post(server.url("/query"))
        .json(&json!({ "question": "q" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

    let empty = server
        .client
        .post(server.url("/query"))
        .bearer_auth(&token)
        .json(&json!({ "question": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let missing_field = server
        .client
        .post(server.url("/query"))
        .bearer_auth(&token)
        .json(&json!({ "q": "typo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_field.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = missing_field.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("question"));

    let malformed = server
        .client
        .post(server.url("/query"))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unavailable_provider_is_503() {
    // The openai provider without an API key cannot be built.
    let server = start("openai").await;
    let token = server.token().await;

    let resp = server
        .client
        .post(server.url("/query"))
        .bearer_auth(&token)
        .json(&json!({ "question": "anything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("OPENAI_API_KEY"));
}

#[tokio::test]
async fn test_freshness_endpoint() {
    let server = start("canned").await;
    let token = server.token().await;

    let resp = server
        .client
        .get(server.url("/freshness"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({
            "freshness": [
                { "table": "customers", "timestamp_column": null, "last_loaded": null },
                { "table": "orders", "timestamp_column": "updated_at", "last_loaded": "2024-05-01T12:00:00" }
            ]
        })
    );
}

#[tokio::test]
async fn test_semantic_layer_lifecycle() {
    let server = start("canned").await;
    let token = server.token().await;
    let layer = json!({
        "tables": {
            "revenue": { "columns": { "amount": [] }, "metrics": { "total": "SUM(amount)" } }
        }
    });

    // Starts empty: no file on disk yet.
    let resp = server
        .client
        .get(server.url("/semantic"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({ "tables": {} }));

    let resp = server
        .client
        .post(server.url("/semantic"))
        .bearer_auth(&token)
        .json(&json!({ "semantic_layer": layer }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({ "success": true }));

    let resp = server
        .client
        .post(server.url("/semantic/save"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    let saved_path = server.dir.path().join("config").join("semantic_layer.json");
    assert_eq!(body["path"], saved_path.display().to_string());
    let on_disk: Value =
        serde_json::from_str(&std::fs::read_to_string(&saved_path).unwrap()).unwrap();
    assert_eq!(on_disk, layer);

    // Unsaved edits are discarded by reload.
    server
        .client
        .post(server.url("/semantic"))
        .bearer_auth(&token)
        .json(&json!({ "semantic_layer": null }))
        .send()
        .await
        .unwrap();
    let resp = server
        .client
        .post(server.url("/semantic/reload"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({ "success": true, "semantic_layer": layer })
    );

    let invalid = server
        .client
        .post(server.url("/semantic"))
        .bearer_auth(&token)
        .json(&json!({ "semantic_layer": { "tables": { "": { "columns": {} } } } }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_suggest_semantic_layer() {
    let server = start("canned").await;
    let token = server.token().await;
    let expected = json!({
        "suggested": {
            "tables": {
                "orders": {
                    "columns": { "id": [], "amount": ["revenue"] },
                    "metrics": { "total_revenue": "SUM(amount)" }
                }
            }
        }
    });

    // Empty body: introspect the live database.
    let resp = server
        .client
        .post(server.url("/semantic/suggest"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap(), expected);

    // A posted schema, as a bare tables map.
    let resp = server
        .client
        .post(server.url("/semantic/suggest"))
        .bearer_auth(&token)
        .json(&json!({ "orders": { "columns": [{ "name": "id", "type": "INTEGER" }] } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap(), expected);

    let resp = server
        .client
        .post(server.url("/semantic/suggest"))
        .bearer_auth(&token)
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
