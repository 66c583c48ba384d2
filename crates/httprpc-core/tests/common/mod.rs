//! In-process HTTP-RPC test service.
//!
//! Serves the procedures of the reference test service on an ephemeral
//! localhost port, plus a few endpoints that misbehave on purpose.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::header::{ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use serde_json::{json, Value as JsonValue};

/// `Authorization` value for user `tomcat`, password `tomcat`.
pub const TOMCAT_AUTHORIZATION: &str = "Basic dG9tY2F0OnRvbWNhdA==";

type Fields = Form<Vec<(String, String)>>;

/// Counters the tests inspect after making calls.
#[derive(Default)]
pub struct ServerState {
    pub requests: AtomicUsize,
    pub challenges: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ServerState {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn challenges(&self) -> usize {
        self.challenges.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
}

impl TestServer {
    /// Base URL of the plain test procedures.
    pub fn base_url(&self) -> String {
        format!("http://{}/httprpc-server-test/test", self.addr)
    }
}

/// Start the test service on `127.0.0.1:0`.
pub async fn start_server() -> TestServer {
    let state = Arc::new(ServerState::default());

    let test = Router::new()
        .route("/add", post(add))
        .route("/addValues", post(add_values))
        .route("/invertValue", post(invert_value))
        .route("/getCharacters", post(get_characters))
        .route("/getSelection", post(get_selection))
        .route("/getStatistics", post(get_statistics))
        .route("/getTestData", post(get_test_data))
        .route("/getVoid", post(get_void))
        .route("/getNull", post(get_null))
        .route("/getLocaleCode", post(get_locale_code))
        .route("/getUserName", post(get_user_name))
        .route("/isUserInRole", post(is_user_in_role))
        .route("/getAttachmentInfo", post(get_attachment_info))
        .route("/echoFields", post(echo_fields))
        .route("/getHeaders", post(get_headers))
        .route("/fail", post(fail))
        .route("/failPlain", post(fail_plain))
        .route("/getMalformed", post(get_malformed))
        .route("/slow", post(slow))
        .route("/track", post(track))
        .route("/challengeWithoutScheme", post(challenge_without_scheme));

    let app = Router::new()
        .nest("/httprpc-server-test/test", test)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to read local address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    TestServer { addr, state }
}

fn count(state: &ServerState) {
    state.requests.fetch_add(1, Ordering::SeqCst);
}

fn field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn all<'a>(fields: &'a [(String, String)], name: &'a str) -> impl Iterator<Item = &'a str> {
    fields
        .iter()
        .filter(move |(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn number(text: &str) -> f64 {
    text.parse().unwrap_or_default()
}

fn json_number(n: f64) -> JsonValue {
    if n.fract() == 0.0 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, message.to_string()).into_response()
}

async fn add(State(state): State<Arc<ServerState>>, Form(fields): Fields) -> Response {
    count(&state);
    match (field(&fields, "a"), field(&fields, "b")) {
        (Some(a), Some(b)) => Json(json_number(number(a) + number(b))).into_response(),
        _ => bad_request("Missing argument"),
    }
}

async fn add_values(State(state): State<Arc<ServerState>>, Form(fields): Fields) -> Response {
    count(&state);
    let sum: f64 = all(&fields, "values").map(number).sum();
    Json(json_number(sum)).into_response()
}

async fn invert_value(State(state): State<Arc<ServerState>>, Form(fields): Fields) -> Response {
    count(&state);
    match field(&fields, "value") {
        Some(value) => Json(json!(value != "true")).into_response(),
        None => bad_request("Missing argument 'value'"),
    }
}

async fn get_characters(State(state): State<Arc<ServerState>>, Form(fields): Fields) -> Response {
    count(&state);
    match field(&fields, "text") {
        Some(text) => {
            let characters: Vec<String> = text.chars().map(String::from).collect();
            Json(json!(characters)).into_response()
        }
        None => Json(JsonValue::Null).into_response(),
    }
}

async fn get_selection(State(state): State<Arc<ServerState>>, Form(fields): Fields) -> Response {
    count(&state);
    let items: Vec<&str> = all(&fields, "items").collect();
    Json(json!(items.join(", "))).into_response()
}

async fn get_statistics(State(state): State<Arc<ServerState>>, Form(fields): Fields) -> Response {
    count(&state);
    let values: Vec<f64> = all(&fields, "values").map(number).collect();
    let sum: f64 = values.iter().sum();
    let average = if values.is_empty() {
        0.0
    } else {
        sum / values.len() as f64
    };
    Json(json!({
        "count": values.len(),
        "sum": json_number(sum),
        "average": json_number(average),
    }))
    .into_response()
}

async fn get_test_data(State(state): State<Arc<ServerState>>) -> Response {
    count(&state);
    Json(json!([
        {"a": "hello", "b": 1, "c": 2.0},
        {"a": "goodbye", "b": 2, "c": 4.0}
    ]))
    .into_response()
}

async fn get_void(State(state): State<Arc<ServerState>>) -> Response {
    count(&state);
    StatusCode::NO_CONTENT.into_response()
}

async fn get_null(State(state): State<Arc<ServerState>>) -> Response {
    count(&state);
    Json(JsonValue::Null).into_response()
}

async fn get_locale_code(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    count(&state);
    let language = headers
        .get(ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    Json(json!(language)).into_response()
}

fn challenge(state: &ServerState) -> Response {
    state.challenges.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, "Basic realm=\"tomcat\"")],
        "<html><body>Unauthorized</body></html>",
    )
        .into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == TOMCAT_AUTHORIZATION)
        .unwrap_or(false)
}

async fn get_user_name(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    count(&state);
    if !authorized(&headers) {
        return challenge(&state);
    }
    Json(json!("tomcat")).into_response()
}

async fn is_user_in_role(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Form(fields): Fields,
) -> Response {
    count(&state);
    if !authorized(&headers) {
        return challenge(&state);
    }
    Json(json!(field(&fields, "role") == Some("tomcat"))).into_response()
}

async fn get_attachment_info(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> Response {
    count(&state);

    let mut text = serde_json::Map::new();
    let mut attachments = Vec::new();

    while let Ok(Some(part)) = multipart.next_field().await {
        let name = part.name().unwrap_or_default().to_string();
        let file_name = part.file_name().map(str::to_string);
        let content_type = part.content_type().map(str::to_string);
        let Ok(data) = part.bytes().await else {
            return bad_request("Unreadable part");
        };

        match file_name {
            Some(file_name) => {
                let checksum: u64 = data.iter().map(|&b| u64::from(b)).sum();
                attachments.push(json!({
                    "parameter": name,
                    "fileName": file_name,
                    "contentType": content_type,
                    "bytes": data.len(),
                    "checksum": checksum,
                }));
            }
            None => {
                let value = String::from_utf8_lossy(&data).to_string();
                let entry = json!({"value": value, "contentType": content_type});
                match text.get_mut(&name) {
                    Some(JsonValue::Array(list)) => list.push(entry),
                    _ => {
                        text.insert(name, json!([entry]));
                    }
                }
            }
        }
    }

    Json(json!({"fields": text, "attachments": attachments})).into_response()
}

async fn echo_fields(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Form(fields): Fields,
) -> Response {
    count(&state);
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let pairs: Vec<JsonValue> = fields.iter().map(|(k, v)| json!([k, v])).collect();
    Json(json!({"contentType": content_type, "fields": pairs})).into_response()
}

async fn get_headers(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    count(&state);
    let mut map = serde_json::Map::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            map.insert(name.as_str().to_string(), json!(value));
        }
    }
    Json(JsonValue::Object(map)).into_response()
}

async fn fail(State(state): State<Arc<ServerState>>) -> Response {
    count(&state);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"message": "Division by zero"})),
    )
        .into_response()
}

async fn fail_plain(State(state): State<Arc<ServerState>>) -> Response {
    count(&state);
    (StatusCode::FORBIDDEN, "Role 'admin' required\n").into_response()
}

async fn get_malformed(State(state): State<Arc<ServerState>>) -> Response {
    count(&state);
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        "{\"a\": [1, 2",
    )
        .into_response()
}

async fn slow(State(state): State<Arc<ServerState>>) -> Response {
    count(&state);
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!("late")).into_response()
}

async fn track(State(state): State<Arc<ServerState>>, Form(fields): Fields) -> Response {
    count(&state);
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(now, Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(100)).await;

    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    let id = field(&fields, "id").map(number).unwrap_or_default();
    Json(json_number(id)).into_response()
}

async fn challenge_without_scheme(State(state): State<Arc<ServerState>>) -> Response {
    count(&state);
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, "Bearer realm=\"api\"")],
        "",
    )
        .into_response()
}
