//! Gateway integration tests: start a real gateway and drive it over HTTP.
//!
//! Run with: `cargo test -p codegenesis-gateway --test integration`

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

use codegenesis_core::config::Config;
use codegenesis_core::error::Result as CoreResult;
use codegenesis_core::store::MemoryStore;
use codegenesis_core::types::KeyProvider;
use codegenesis_gateway::GatewayState;
use codegenesis_gateway::vault::KeyVault;
use codegenesis_preview::PreviewFile;
use codegenesis_providers::{CodeGenerator, GeneratedFiles, GenerationRequest, StaticTokens};

/// Find an available port.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Records what it was asked and answers with a fixed page.
#[derive(Default)]
struct FakeGenerator {
    seen: Mutex<Vec<(KeyProvider, String, String)>>,
}

#[async_trait]
impl CodeGenerator for FakeGenerator {
    async fn generate(&self, request: GenerationRequest) -> CoreResult<GeneratedFiles> {
        let creds = request.credentials.expect("credentials are always resolved");
        self.seen
            .lock()
            .unwrap()
            .push((creds.provider, creds.api_key, request.prompt.clone()));
        Ok(GeneratedFiles {
            files: vec![PreviewFile::new(
                "index.html",
                format!("<html><body><button>{}</button></body></html>", request.prompt),
            )],
        })
    }
}

struct TestGateway {
    base: String,
    generator: Arc<FakeGenerator>,
    client: reqwest::Client,
}

impl TestGateway {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = self.client.request(method, self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        (status, serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send(reqwest::Method::GET, path, Some(token), None).await
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, Some(token), Some(body))
            .await
    }
}

/// Build a gateway over an in-memory store and wait until it answers.
async fn start_test_gateway(config: &str) -> TestGateway {
    let port = find_free_port();
    let config = Config::parse(config).unwrap();
    let generator = Arc::new(FakeGenerator::default());

    let state = GatewayState::new(
        Arc::new(config),
        Arc::new(MemoryStore::new()),
        Arc::new(StaticTokens::new([("alice-token", "alice"), ("bob-token", "bob")])),
    )
    .with_generator(generator.clone())
    .with_vault(KeyVault::new("integration-secret"));
    let state = Arc::new(state);

    tokio::spawn(async move {
        let _ = codegenesis_gateway::start_gateway(state, port).await;
    });

    let base = format!("http://127.0.0.1:{port}");
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if reqwest::get(format!("{base}/health")).await.is_ok() {
            break;
        }
    }

    TestGateway {
        base,
        generator,
        client: reqwest::Client::new(),
    }
}

const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

#[tokio::test]
async fn test_health_endpoint() {
    let gw = start_test_gateway("{}").await;
    let resp = reqwest::get(gw.url("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["generation"], true);
    assert_eq!(body["key_vault"], true);
}

#[tokio::test]
async fn test_unauthenticated_requests_are_rejected() {
    let gw = start_test_gateway("{}").await;
    let (status, body) = gw
        .send(reqwest::Method::GET, "/api/projects", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Unauthorized"}));

    let (status, _) = gw.get("/api/profile", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_project_lifecycle_and_preview() {
    let gw = start_test_gateway("{}").await;

    let (status, project) = gw
        .post("/api/projects", ALICE, json!({"name": "Landing Page"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(project["framework"], "vanilla");
    assert!(project["slug"].as_str().unwrap().starts_with("landing-page-"));
    let id = project["id"].as_str().unwrap().to_string();

    let (_, list) = gw.get("/api/projects", ALICE).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, data) = gw.get(&format!("/api/projects/{id}/data"), ALICE).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["files"].as_array().unwrap().len(), 3);
    assert_eq!(data["chats"][0]["name"], "Chat 1");
    assert_eq!(data["chats"][0]["messages"], json!([]));

    // Another user cannot see it.
    let (status, body) = gw.get(&format!("/api/projects/{id}"), BOB).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Project not found");

    let (status, saved) = gw
        .send(
            reqwest::Method::PUT,
            &format!("/api/projects/{id}/data"),
            Some(ALICE),
            Some(json!({
                "projectName": "Landing v2",
                "files": [{
                    "name": "index.html",
                    "content": "<html><head></head><body><button>Click me</button></body></html>",
                    "language": "html"
                }],
                "chats": [{
                    "id": "chat-a",
                    "name": "Design",
                    "messages": [{"role": "user", "content": "add a button"}]
                }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["success"], true);
    assert!(saved["savedAt"].is_string());

    let (_, data) = gw.get(&format!("/api/projects/{id}/data"), ALICE).await;
    assert_eq!(data["project"]["name"], "Landing v2");
    assert_eq!(data["files"].as_array().unwrap().len(), 1);
    let design = data["chats"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "Design")
        .unwrap();
    assert_eq!(design["messages"][0]["content"], "add a button");

    let resp = gw
        .client
        .get(gw.url(&format!("/api/projects/{id}/preview?visual_edit=true")))
        .bearer_auth(ALICE)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = resp.text().await.unwrap();
    assert!(html.starts_with("<html><head><script data-codegenesis-probe>"));
    assert!(html.contains("<button>Click me</button>"));

    let resp = gw
        .client
        .get(gw.url(&format!("/api/projects/{id}/preview")))
        .bearer_auth(ALICE)
        .send()
        .await
        .unwrap();
    assert!(!resp.text().await.unwrap().contains("data-codegenesis-probe"));

    let (status, _) = gw
        .send(
            reqwest::Method::DELETE,
            &format!("/api/projects/{id}"),
            Some(ALICE),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = gw.get(&format!("/api/projects/{id}"), ALICE).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_ids_cannot_cross_projects() {
    let gw = start_test_gateway("{}").await;

    let (_, a) = gw.post("/api/projects", ALICE, json!({"name": "A"})).await;
    let (_, b) = gw.post("/api/projects", BOB, json!({"name": "B"})).await;
    let a_data = format!("/api/projects/{}/data", a["id"].as_str().unwrap());
    let b_data = format!("/api/projects/{}/data", b["id"].as_str().unwrap());

    let save = |content: &str| {
        json!({
            "chats": [{
                "id": "shared",
                "name": "Chat",
                "messages": [{"role": "user", "content": content}]
            }]
        })
    };

    let (status, _) = gw
        .send(reqwest::Method::PUT, &a_data, Some(ALICE), Some(save("alice secret")))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = gw
        .send(reqwest::Method::PUT, &b_data, Some(BOB), Some(save("bob overwrote")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Chat not found");

    let (_, data) = gw.get(&a_data, ALICE).await;
    let shared = data["chats"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["id"] == "shared")
        .unwrap();
    assert_eq!(shared["messages"].as_array().unwrap().len(), 1);
    assert_eq!(shared["messages"][0]["content"], "alice secret");

    // Bob's project is untouched by the rejected save.
    let (_, data) = gw.get(&b_data, BOB).await;
    assert!(data["chats"].as_array().unwrap().iter().all(|c| c["id"] != "shared"));
}

#[tokio::test]
async fn test_profile_upsert_is_forced_to_caller() {
    let gw = start_test_gateway("{}").await;

    let (status, _) = gw.get("/api/profile", ALICE).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, profile) = gw
        .post(
            "/api/profile",
            ALICE,
            json!({"id": "bob", "display_name": "Alice", "theme": "dark"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["id"], "alice");

    let (_, profile) = gw.get("/api/profile", ALICE).await;
    assert_eq!(profile["display_name"], "Alice");
    assert_eq!(profile["theme"], "dark");
    let (status, _) = gw.get("/api/profile", BOB).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_keys_and_generation() {
    let gw = start_test_gateway("{}").await;

    let (status, body) = gw.post("/api/generate", ALICE, json!({"prompt": "hi"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().starts_with("No valid API key"));

    let (status, body) = gw.post("/api/generate", ALICE, json!({"prompt": " "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Prompt is required");

    let (status, body) = gw
        .post("/api/keys", ALICE, json!({"provider": "mistral", "apiKey": "x"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid provider");

    let (status, body) = gw
        .post(
            "/api/keys",
            ALICE,
            json!({"provider": "openai", "apiKey": "sk-stored", "modelId": "gpt-4o"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], "openai");

    let (_, body) = gw.get("/api/keys", ALICE).await;
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0]["provider"], "openai");
    assert!(providers[0].get("encrypted_key").is_none());

    let (status, body) = gw
        .post("/api/generate", ALICE, json!({"prompt": "Click me", "model": "gpt-4o"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["code"].as_str().unwrap().contains("<button>Click me</button>"));

    // A header key wins over the stored one.
    let resp = gw
        .client
        .post(gw.url("/api/generate"))
        .bearer_auth(ALICE)
        .header("x-anthropic-key", "sk-header")
        .json(&json!({"prompt": "again", "model": "claude-3-5-sonnet"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    {
        let seen = gw.generator.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            (KeyProvider::Openai, "sk-stored".to_string(), "Click me".to_string())
        );
        assert_eq!(seen[1].0, KeyProvider::Anthropic);
        assert_eq!(seen[1].1, "sk-header");
    }

    // Bob has no keys of his own.
    let (status, _) = gw.post("/api/generate", BOB, json!({"prompt": "hi"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = gw
        .send(
            reqwest::Method::DELETE,
            "/api/keys?provider=openai",
            Some(ALICE),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = gw.get("/api/keys", ALICE).await;
    assert_eq!(body["providers"], json!([]));

    let (status, body) = gw
        .send(reqwest::Method::DELETE, "/api/keys", Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Provider is required");
}

#[tokio::test]
async fn test_conversations_and_cleanup() {
    let gw = start_test_gateway(r#"{ gateway: { cron_secret: "cron-1" } }"#).await;

    let (status, conv) = gw
        .post("/api/agent/conversations", ALICE, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conv["title"], "New Conversation");
    assert!(conv["expires_at"].is_string());
    let id = conv["id"].as_str().unwrap().to_string();

    let path = format!("/api/agent/conversations/{id}/messages");
    let (status, msg) = gw
        .post(&path, ALICE, json!({"role": "user", "content": "plan a launch"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(msg["message_type"], "text");

    let (status, _) = gw
        .post(&path, ALICE, json!({"role": "system", "content": "x"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = gw.get(&path, BOB).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, full) = gw
        .get(&format!("/api/agent/conversations/{id}"), ALICE)
        .await;
    assert_eq!(full["messages"].as_array().unwrap().len(), 1);

    let (status, updated) = gw
        .send(
            reqwest::Method::PUT,
            &format!("/api/agent/conversations/{id}"),
            Some(ALICE),
            Some(json!({"title": "Launch", "is_archived": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Launch");

    let (status, _) = gw
        .send(reqwest::Method::POST, "/api/agent/cleanup", Some("wrong"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = gw
        .send(reqwest::Method::POST, "/api/agent/cleanup", Some("cron-1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["deleted_count"], 0);

    let resp = reqwest::get(gw.url("/api/agent/cleanup")).await.unwrap();
    let stats: Value = resp.json().await.unwrap();
    assert_eq!(stats["pending_cleanup"], 0);

    let (status, _) = gw
        .send(
            reqwest::Method::DELETE,
            &format!("/api/agent/conversations/{id}"),
            Some(ALICE),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, list) = gw.get("/api/agent/conversations", ALICE).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_cleanup_without_secret_is_always_unauthorized() {
    let gw = start_test_gateway("{}").await;
    let (status, _) = gw
        .send(reqwest::Method::POST, "/api/agent/cleanup", Some(""), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rate_limit() {
    let gw = start_test_gateway(r#"{ gateway: { rate_limit: { max_requests_per_minute: 2 } } }"#)
        .await;

    let (first, _) = gw.get("/api/projects", ALICE).await;
    let (second, _) = gw.get("/api/projects", ALICE).await;
    let (third, body) = gw.get("/api/projects", ALICE).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(third, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Too many requests");

    // /health is outside the limited /api surface.
    let resp = reqwest::get(gw.url("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
