//! NamestoneClient against a local stand-in registry server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use stealthmax_directory::{NameDirectory, NameRegistry, NamestoneClient, RegistryDirectory, RegistryEntry};
use stealthmax_types::{Address, StealthError};

const KEY: &str = "test-key";

#[derive(Clone, Default)]
struct Server {
    written: Arc<Mutex<Vec<Value>>>,
    down: Arc<Mutex<bool>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == KEY)
}

async fn get_names(
    State(server): State<Server>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if *server.down.lock() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "down"})));
    }
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }
    assert_eq!(params.get("domain").map(String::as_str), Some("stealthmax.eth"));
    (
        StatusCode::OK,
        Json(json!([
            {
                "name": "alice",
                "address": "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
                "text_records": {
                    "description": "{\"intmax_address\":\"T6alice\",\"nonce\":1}",
                    "url": "https://www.substream.xyz"
                }
            },
            { "name": "plain", "address": "0x0000000000000000000000000000000000000002" }
        ])),
    )
}

async fn search_names(
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }
    assert_eq!(params.get("exact_match").map(String::as_str), Some("1"));
    if params.get("name").map(String::as_str) == Some("alice") {
        (
            StatusCode::OK,
            Json(json!([{
                "name": "alice",
                "address": "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
                "text_records": { "description": "T6alice" }
            }])),
        )
    } else {
        (StatusCode::OK, Json(json!([])))
    }
}

async fn set_name(
    State(server): State<Server>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    server.written.lock().push(body);
    StatusCode::OK
}

async fn spawn(server: Server) -> String {
    let app = Router::new()
        .route("/get-names", get(get_names))
        .route("/search-names", get(search_names))
        .route("/set-name", post(set_name))
        .with_state(server);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn lists_and_decodes_names() {
    let url = spawn(Server::default()).await;
    let client = Arc::new(NamestoneClient::new(url, KEY, Duration::from_secs(5)).unwrap());

    let entries = client.get_names("stealthmax.eth").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].domain, "stealthmax.eth");
    assert!(entries[1].text_records.is_empty());

    let directory = RegistryDirectory::new(client, "stealthmax.eth");
    let managed = directory.list().await.unwrap();
    assert_eq!(managed.len(), 1);
    assert_eq!(managed[0].counter, 1);

    let address: Address = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse().unwrap();
    let found = directory.find(&address).await.unwrap().unwrap();
    assert_eq!(found.name, "alice");
}

#[tokio::test]
async fn bad_key_is_authentication_error() {
    let url = spawn(Server::default()).await;
    let client = NamestoneClient::new(url, "wrong", Duration::from_secs(5)).unwrap();
    let err = client.get_names("stealthmax.eth").await.unwrap_err();
    assert!(matches!(err, StealthError::Authentication(_)), "{err:?}");
}

#[tokio::test]
async fn server_down_is_network_error() {
    let server = Server::default();
    *server.down.lock() = true;
    let url = spawn(server).await;
    let client = NamestoneClient::new(url, KEY, Duration::from_secs(5)).unwrap();
    let err = client.get_names("stealthmax.eth").await.unwrap_err();
    assert!(matches!(err, StealthError::Network(_)), "{err:?}");
}

#[tokio::test]
async fn unreachable_host_is_network_error() {
    let client =
        NamestoneClient::new("http://127.0.0.1:9", KEY, Duration::from_millis(500)).unwrap();
    let err = client.get_names("stealthmax.eth").await.unwrap_err();
    assert!(matches!(err, StealthError::Network(_)), "{err:?}");
}

#[tokio::test]
async fn set_name_posts_entry() {
    let server = Server::default();
    let url = spawn(server.clone()).await;
    let client = NamestoneClient::new(url, KEY, Duration::from_secs(5)).unwrap();

    let mut text_records = BTreeMap::new();
    text_records.insert("description".to_string(), "{}".to_string());
    client
        .set_name(&RegistryEntry {
            name: "bob".into(),
            domain: "stealthmax.eth".into(),
            address: "0x0000000000000000000000000000000000000003".into(),
            text_records,
        })
        .await
        .unwrap();

    let written = server.written.lock().clone();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0]["name"], "bob");
    assert_eq!(written[0]["domain"], "stealthmax.eth");
    assert_eq!(written[0]["text_records"]["description"], "{}");
}

#[tokio::test]
async fn search_finds_exact_name() {
    let url = spawn(Server::default()).await;
    let client = Arc::new(NamestoneClient::new(url, KEY, Duration::from_secs(5)).unwrap());
    let directory = RegistryDirectory::new(client, "stealthmax.eth");

    let alice = directory.find_by_name("alice").await.unwrap().unwrap();
    assert_eq!(alice.counter, 0);
    assert_eq!(alice.settlement_address.as_str(), "T6alice");
    assert!(directory.find_by_name("zed").await.unwrap().is_none());
}
