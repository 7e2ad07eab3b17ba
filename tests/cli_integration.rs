// CLI integration tests: argument handling, exit codes, and calls against a loopback service.
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_annorpc");
    Command::new(exe)
}

fn parse_json(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().next().expect("json line");
    serde_json::from_str(line).expect("valid json")
}

struct Service {
    _runtime: tokio::runtime::Runtime,
    addr: SocketAddr,
    methods: Arc<Mutex<Vec<String>>>,
}

impl Service {
    fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime");
        let methods = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/rpc", post(rpc))
            .route("/auth/api/V2/token", get(validate_token))
            .with_state(methods.clone());
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        runtime.spawn(axum::serve(listener, app).into_future());
        Self {
            _runtime: runtime,
            addr,
            methods,
        }
    }

    fn url(&self) -> String {
        format!("http://{}/rpc", self.addr)
    }

    fn auth_url(&self) -> String {
        format!("http://{}/auth/", self.addr)
    }

    fn methods(&self) -> Vec<String> {
        self.methods.lock().expect("methods").clone()
    }
}

async fn rpc(State(methods): State<Arc<Mutex<Vec<String>>>>, Json(request): Json<Value>) -> Response {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    methods.lock().expect("methods").push(method.clone());
    let id = request["id"].clone();
    match method.as_str() {
        "svc.get_widget" => Json(json!({
            "version": "1.1",
            "id": id,
            "result": [{"id": request["params"][0], "name": "Widget"}]
        }))
        .into_response(),
        "genome_annotaiton_api.get_taxon" => {
            Json(json!({"version": "1.1", "id": id, "result": ["1779/523209/1"]})).into_response()
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "version": "1.1",
                "error": {
                    "name": "JSONRPCError",
                    "code": -32601,
                    "message": "method not found",
                    "error": "Traceback: no such method"
                }
            })),
        )
            .into_response(),
    }
}

const GOOD_TOKEN: &str = "good-token";

async fn validate_token(headers: HeaderMap) -> Response {
    let expected = format!("Bearer {GOOD_TOKEN}");
    let presented = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    if presented == Some(expected.as_str()) {
        Json(json!({"user": "alice"})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "invalid token"}})),
        )
            .into_response()
    }
}

fn assert_error(output: &Output, exit_code: i32, kind: &str) -> Value {
    assert_eq!(output.status.code(), Some(exit_code));
    let err = parse_json(&output.stderr);
    assert_eq!(err["error"]["kind"], kind);
    err
}

#[test]
fn missing_url_is_usage_error() {
    let output = cmd().args(["taxon", "REF"]).output().expect("taxon");
    let err = assert_error(&output, 2, "Usage");
    assert!(err["error"]["hint"].as_str().is_some());
}

#[test]
fn unknown_flag_is_usage_error() {
    let output = cmd().args(["--bogus", "taxon", "REF"]).output().expect("bogus");
    assert_error(&output, 2, "Usage");
}

#[test]
fn params_must_be_a_json_array() {
    let output = cmd()
        .args([
            "--url",
            "https://svc.example/rpc",
            "call",
            "svc.m",
            "--params",
            "{\"a\":1}",
        ])
        .output()
        .expect("call");
    assert_error(&output, 2, "Usage");
}

#[test]
fn completion_prints_script() {
    let output = cmd().args(["completion", "bash"]).output().expect("completion");
    assert!(output.status.success());
    let script = String::from_utf8_lossy(&output.stdout);
    assert!(script.contains("annorpc"));
}

#[test]
fn plain_http_requires_opt_in() {
    let service = Service::start();
    let output = cmd()
        .args(["--url", &service.url(), "call", "svc.get_widget", "--params", "[\"w1\"]"])
        .output()
        .expect("call");
    assert_error(&output, 3, "Transport");
    assert!(service.methods().is_empty());
}

#[test]
fn call_prints_first_result_element() {
    let service = Service::start();
    let output = cmd()
        .args([
            "--url",
            &service.url(),
            "--insecure-http",
            "call",
            "svc.get_widget",
            "--params",
            "[\"w1\"]",
        ])
        .output()
        .expect("call");
    assert!(output.status.success());
    assert_eq!(parse_json(&output.stdout), json!({"id": "w1", "name": "Widget"}));
}

#[test]
fn typed_subcommand_qualifies_service_name() {
    let service = Service::start();
    let output = cmd()
        .args(["--url", &service.url(), "--insecure-http", "taxon", "REF"])
        .output()
        .expect("taxon");
    assert_error(&output, 4, "Authorization");
    assert!(service.methods().is_empty());

    let output = cmd()
        .args(["--url", &service.url(), "--auth-url", &service.auth_url(), "--insecure-http"])
        .args(["--token", GOOD_TOKEN, "taxon", "REF"])
        .output()
        .expect("taxon");
    assert!(output.status.success());
    assert_eq!(parse_json(&output.stdout), json!("1779/523209/1"));
    assert_eq!(service.methods(), vec!["genome_annotaiton_api.get_taxon"]);

    let output = cmd()
        .args(["--url", &service.url(), "--insecure-http", "call", "get_taxon", "--params", "[\"REF\"]"])
        .output()
        .expect("call");
    assert!(output.status.success());
    assert_eq!(service.methods().len(), 2);
    assert_eq!(service.methods()[1], "genome_annotaiton_api.get_taxon");
}

#[test]
fn remote_fault_maps_to_protocol_exit_code() {
    let service = Service::start();
    let output = cmd()
        .args(["--url", &service.url(), "--insecure-http", "call", "svc.missing"])
        .output()
        .expect("call");
    let err = assert_error(&output, 5, "Protocol");
    assert_eq!(err["error"]["code"], -32601);
    assert_eq!(err["error"]["message"], "method not found");
    assert_eq!(err["error"]["method"], "svc.missing");
    assert_eq!(err["error"]["trace"], "Traceback: no such method");
}

#[test]
fn capture_response_writes_raw_body() {
    let service = Service::start();
    let temp = tempfile::tempdir().expect("tempdir");
    let capture = temp.path().join("raw.json");
    let output = cmd()
        .args(["--url", &service.url(), "--insecure-http", "--capture-response"])
        .arg(&capture)
        .args(["call", "svc.get_widget", "--params", "[\"w9\"]"])
        .output()
        .expect("call");
    assert!(output.status.success());
    let raw: Value =
        serde_json::from_str(&std::fs::read_to_string(&capture).expect("capture")).expect("json");
    assert_eq!(raw["result"][0]["id"], "w9");
}

#[test]
fn rejected_token_fails_construction() {
    let service = Service::start();
    let temp = tempfile::tempdir().expect("tempdir");
    let token_file = temp.path().join("token");
    std::fs::write(&token_file, "forged\n").expect("write token");
    let output = cmd()
        .args(["--url", &service.url(), "--auth-url", &service.auth_url(), "--insecure-http"])
        .arg("--token-file")
        .arg(&token_file)
        .args(["taxon", "REF"])
        .output()
        .expect("taxon");
    assert_error(&output, 6, "Construction");
    assert!(service.methods().is_empty());
}
