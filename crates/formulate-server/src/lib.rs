use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use formulate_config::Config;
use formulate_contracts::{ClientEvent, ConnectionId, ServerEvent};
use futures::{SinkExt, StreamExt};

pub mod completion;
pub mod generator;
pub mod orchestrator;
pub mod registry;
pub mod sinks;
pub mod validator;

pub use completion::{CompletionClient, CompletionRequest, OpenAiCompletionClient, UpstreamError};
pub use orchestrator::{OrchestrationError, Request, RequestOrchestrator};
pub use registry::{ConnectionRegistry, SocketRegistry};

pub async fn serve(cfg: Config, api_key: String) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg, api_key).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub async fn build_app(cfg: Config, api_key: String) -> Result<Router, String> {
    let client = OpenAiCompletionClient::new(
        &cfg.completion.api_base,
        api_key,
        cfg.completion.timeout_ms,
    )?;
    build_app_with_client(cfg, Arc::new(client)).await
}

pub async fn build_app_with_client(
    cfg: Config,
    client: Arc<dyn CompletionClient>,
) -> Result<Router, String> {
    let state = AppState::new(cfg, client).await?;
    Ok(Router::new()
        .route("/", get(index_page))
        .route("/about", get(about_page))
        .route("/pricing", get(pricing_page))
        .route("/login", get(login_page))
        .route("/register", get(register_page))
        .route("/public/{*path}", get(public_asset))
        .route("/socket", get(socket))
        .route("/healthz", get(healthz))
        .with_state(state))
}

#[derive(Clone)]
struct AppState {
    public_dir: PathBuf,
    registry: Arc<SocketRegistry>,
    orchestrator: Arc<RequestOrchestrator>,
}

impl AppState {
    async fn new(cfg: Config, client: Arc<dyn CompletionClient>) -> Result<Self, String> {
        let registry = Arc::new(SocketRegistry::default());
        let orchestrator =
            RequestOrchestrator::from_config(&cfg, client, registry.clone()).await?;
        Ok(Self {
            public_dir: PathBuf::from(&cfg.server.public_dir),
            registry,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown requested");
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (id, mut outbound) = state.registry.register().await;
    tracing::info!(connection = %id, "client connected");

    let (mut sender, mut receiver) = socket.split();
    state
        .registry
        .send(&id, ServerEvent::Connected { id: id.clone() })
        .await;

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let frame = match event.encode() {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "event encode failed");
                    continue;
                }
            };
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                if let Some(request) = request_from_frame(&id, text.as_str()) {
                    let orchestrator = state.orchestrator.clone();
                    tokio::spawn(async move { orchestrator.handle(request).await });
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.registry.unregister(&id).await;
    writer.abort();
    tracing::info!(connection = %id, "client disconnected");
}

fn request_from_frame(id: &ConnectionId, frame: &str) -> Option<Request> {
    match ClientEvent::decode(frame) {
        Ok(ClientEvent::RequestSolution(payload)) => Some(Request {
            connection_id: id.clone(),
            text: payload.request,
        }),
        Err(e) => {
            tracing::warn!(connection = %id, error = %e, "unreadable frame ignored");
            None
        }
    }
}

async fn index_page(State(state): State<AppState>) -> Response {
    serve_file(&state.public_dir, "pages/index.html").await
}

async fn about_page(State(state): State<AppState>) -> Response {
    serve_file(&state.public_dir, "pages/about.html").await
}

async fn pricing_page(State(state): State<AppState>) -> Response {
    serve_file(&state.public_dir, "pages/pricing.html").await
}

async fn login_page(State(state): State<AppState>) -> Response {
    serve_file(&state.public_dir, "pages/login.html").await
}

async fn register_page(State(state): State<AppState>) -> Response {
    serve_file(&state.public_dir, "pages/register.html").await
}

async fn public_asset(State(state): State<AppState>, UrlPath(path): UrlPath<String>) -> Response {
    serve_file(&state.public_dir, &path).await
}

async fn serve_file(root: &Path, relative: &str) -> Response {
    let rel = Path::new(relative);
    if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let full = root.join(rel);
    match tokio::fs::read(&full).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&full).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
