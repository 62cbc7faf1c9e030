use std::{borrow::Cow, convert::Infallible, net::SocketAddr, sync::Arc, time::Instant};

use anyhow::{Context, Result};
use http_body_util::{BodyExt, Full};
use hyper::{
    Method, Request, Response, StatusCode,
    body::{Bytes, Incoming},
    header::{self, HeaderName, HeaderValue},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::json;
use tokio::{
    net::{TcpListener, TcpStream},
    signal::unix::{SignalKind, signal},
};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    config::{Config, StoreConfig},
    routing::{
        FileTargetStore, InMemoryTargetStore, RouteDecision, RoutingEngine, RoutingError,
        RoutingErrorKind, Target, TargetStorePort, Visitor,
    },
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const CORS_ALLOW_HEADERS: &str = "authorization, accept, content-type";
const CORS_ALLOW_METHODS: &str = "GET, POST, OPTIONS";

pub struct AppState {
    engine: RoutingEngine,
}

impl AppState {
    pub fn new(engine: RoutingEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &RoutingEngine {
        &self.engine
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint<'a> {
    Health,
    Favicon,
    Targets,
    Target(Cow<'a, str>),
    Route,
}

impl<'a> Endpoint<'a> {
    fn resolve(path: &'a str) -> Option<Self> {
        match path {
            "/health" => Some(Endpoint::Health),
            "/favicon.ico" => Some(Endpoint::Favicon),
            "/api/targets" => Some(Endpoint::Targets),
            "/route" => Some(Endpoint::Route),
            _ => path
                .strip_prefix("/api/target/")
                .filter(|id| !id.is_empty() && !id.contains('/'))
                .map(|id| Endpoint::Target(decode_path_segment(id))),
        }
    }
}

/// Percent-decodes one path segment. Malformed escapes are kept literally, and a result that is
/// not UTF-8 falls back to the raw segment.
fn decode_path_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains('%') {
        return Cow::Borrowed(segment);
    }

    let bytes = segment.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        let escaped = (bytes[index] == b'%')
            .then(|| bytes.get(index + 1..index + 3))
            .flatten()
            .and_then(|pair| Some((hex_value(pair[0])? << 4) | hex_value(pair[1])?));
        match escaped {
            Some(byte) => {
                decoded.push(byte);
                index += 3;
            }
            None => {
                decoded.push(bytes[index]);
                index += 1;
            }
        }
    }

    match String::from_utf8(decoded) {
        Ok(text) => Cow::Owned(text),
        Err(_) => Cow::Borrowed(segment),
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn TargetStorePort>> {
    let store: Arc<dyn TargetStorePort> = match config {
        StoreConfig::Memory => Arc::new(InMemoryTargetStore::new()),
        StoreConfig::File { dir, collection } => Arc::new(
            FileTargetStore::open(dir, collection)
                .with_context(|| format!("failed to open target store in {}", dir.display()))?,
        ),
    };
    Ok(store)
}

pub async fn run(config: Config) -> Result<()> {
    let store = build_store(&config.store)?;
    let state = Arc::new(AppState::new(RoutingEngine::new(store)));

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("unable to bind {}", config.server.listen_addr))?;
    tracing::info!(
        target: "http",
        listen_addr = %config.server.listen_addr,
        store = ?config.store,
        version = VERSION,
        "server_listening"
    );

    let mut sigint =
        signal(SignalKind::interrupt()).context("unable to listen for SIGINT (Ctrl+C)")?;
    let mut sigterm = signal(SignalKind::terminate()).context("unable to listen for SIGTERM")?;

    let signal_name = loop {
        tokio::select! {
            _ = sigint.recv() => break "SIGINT",
            _ = sigterm.recv() => break "SIGTERM",
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => spawn_connection(Arc::clone(&state), stream, peer),
                Err(err) => tracing::warn!(target: "http", error = %err, "accept_failed"),
            },
        }
    };

    tracing::info!(target: "http", signal = signal_name, "server_stopped");
    Ok(())
}

fn spawn_connection(state: Arc<AppState>, stream: TcpStream, peer: SocketAddr) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |request| {
        let state = Arc::clone(&state);
        async move { Ok::<_, Infallible>(handle(state, request).await) }
    });

    tokio::spawn(async move {
        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            tracing::debug!(target: "http", peer = %peer, error = %err, "connection_closed_with_error");
        }
    });
}

async fn handle(state: Arc<AppState>, request: Request<Incoming>) -> Response<Full<Bytes>> {
    let request_id = Uuid::now_v7();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = tracing::info_span!(
        target: "http",
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %path
    );

    async move {
        let started = Instant::now();
        let mut response = match request.into_body().collect().await {
            Ok(collected) => dispatch(&state, &method, &path, collected.to_bytes()).await,
            Err(err) => error_reply(
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {err}"),
            ),
        };
        apply_common_headers(&mut response, request_id);

        let status = response.status().as_u16();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if status >= 500 {
            tracing::error!(target: "http", status, elapsed_ms, "request_completed");
        } else if status >= 400 {
            tracing::warn!(target: "http", status, elapsed_ms, "request_completed");
        } else {
            tracing::info!(target: "http", status, elapsed_ms, "request_completed");
        }
        response
    }
    .instrument(span)
    .await
}

/// Maps one request onto the engine. Transport concerns (CORS, request id, logging) are
/// applied by the caller.
pub async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    if *method == Method::OPTIONS {
        return empty_reply(StatusCode::NO_CONTENT);
    }
    let Some(endpoint) = Endpoint::resolve(path) else {
        return error_reply(StatusCode::NOT_FOUND, "Not Found");
    };

    match endpoint {
        Endpoint::Favicon => empty_reply(StatusCode::NO_CONTENT),
        Endpoint::Health if *method == Method::GET => health(state).await,
        Endpoint::Targets if *method == Method::GET => list_targets(state).await,
        Endpoint::Targets if *method == Method::POST => create_target(state, &body).await,
        Endpoint::Target(id) if *method == Method::GET => get_target(state, &id).await,
        Endpoint::Target(id) if *method == Method::POST => update_target(state, &id, &body).await,
        Endpoint::Route if *method == Method::POST => route_visitor(state, &body).await,
        _ => error_reply(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
    }
}

async fn health(state: &AppState) -> Response<Full<Bytes>> {
    match state.engine.health_check().await {
        Ok(()) => json_reply(StatusCode::OK, &json!({ "status": "OK", "version": VERSION })),
        Err(err) => json_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({ "status": "ERROR", "version": VERSION, "error": err.message }),
        ),
    }
}

async fn list_targets(state: &AppState) -> Response<Full<Bytes>> {
    match state.engine.list_targets().await {
        Ok(targets) if targets.is_empty() => {
            message_reply(StatusCode::NOT_FOUND, "Targets not found")
        }
        Ok(targets) => json_reply(StatusCode::OK, &targets),
        Err(err) => failure_reply(err),
    }
}

async fn create_target(state: &AppState, body: &[u8]) -> Response<Full<Bytes>> {
    let target: Target = match serde_json::from_slice(body) {
        Ok(target) => target,
        Err(err) => return error_reply(StatusCode::BAD_REQUEST, format!("invalid target: {err}")),
    };
    match state.engine.create_target(target).await {
        Ok(()) => message_reply(StatusCode::OK, "SUCCESS"),
        Err(err) => failure_reply(err),
    }
}

async fn get_target(state: &AppState, id: &str) -> Response<Full<Bytes>> {
    match state.engine.get_target(id).await {
        Ok(target) => json_reply(StatusCode::OK, &target),
        Err(err) => failure_reply(err),
    }
}

async fn update_target(state: &AppState, id: &str, body: &[u8]) -> Response<Full<Bytes>> {
    let target: Target = match serde_json::from_slice(body) {
        Ok(target) => target,
        Err(err) => return error_reply(StatusCode::BAD_REQUEST, format!("invalid target: {err}")),
    };
    match state.engine.update_target(id, target).await {
        Ok(()) => message_reply(StatusCode::OK, "UPDATED"),
        Err(err) => failure_reply(err),
    }
}

async fn route_visitor(state: &AppState, body: &[u8]) -> Response<Full<Bytes>> {
    let visitor: Visitor = match serde_json::from_slice(body) {
        Ok(visitor) => visitor,
        Err(err) => return error_reply(StatusCode::BAD_REQUEST, format!("invalid visitor: {err}")),
    };
    match state.engine.route(visitor).await {
        Ok(RouteDecision::Selected(target)) => json_reply(StatusCode::OK, &target.url),
        Ok(RouteDecision::Reject) => json_reply(StatusCode::OK, &json!({ "decision": "reject" })),
        Err(err) => failure_reply(err),
    }
}

fn failure_reply(err: RoutingError) -> Response<Full<Bytes>> {
    match err.kind {
        RoutingErrorKind::NotFound => message_reply(StatusCode::NOT_FOUND, "Target not found"),
        RoutingErrorKind::Conflict => message_reply(StatusCode::FORBIDDEN, "Target already exists"),
        RoutingErrorKind::StorageError => {
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, err.message)
        }
    }
}

fn message_reply(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_reply(status, &json!({ "message": message }))
}

fn error_reply(status: StatusCode, error: impl Into<String>) -> Response<Full<Bytes>> {
    let error = error.into();
    if status.is_server_error() {
        tracing::error!(target: "http", status = status.as_u16(), error = %error, "request_failed");
    } else {
        tracing::warn!(target: "http", status = status.as_u16(), error = %error, "request_failed");
    }
    json_reply(status, &json!({ "error": error }))
}

fn json_reply<T: Serialize + ?Sized>(status: StatusCode, payload: &T) -> Response<Full<Bytes>> {
    let (status, bytes) = match serde_json::to_vec(payload) {
        Ok(bytes) => (status, Bytes::from(bytes)),
        Err(err) => {
            tracing::error!(target: "http", error = %err, "response_encoding_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(br#"{"error":"failed to encode response"}"#),
            )
        }
    };

    let mut response = Response::new(Full::new(bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn empty_reply(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn apply_common_headers(response: &mut Response<Full<Bytes>>, request_id: Uuid) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
}
