use crate::core::AppEvent;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use groove_core::protocol::{Command, Snapshot};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    snapshot: Arc<RwLock<Snapshot>>,
    event_tx: mpsc::Sender<AppEvent>,
}

pub fn router(snapshot: Arc<RwLock<Snapshot>>, event_tx: mpsc::Sender<AppEvent>) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/next", get(next).post(next))
        .route("/api/prev", get(prev).post(prev))
        .route("/api/toggle", get(toggle).post(toggle))
        .route("/api/shuffle", get(shuffle).post(shuffle))
        .route("/api/repeat", get(repeat).post(repeat))
        .route("/api/volume/:pct", get(set_volume).post(set_volume))
        .route("/api/search/:term", get(search).post(search))
        .route("/api/command", post(command))
        .with_state(HttpState { snapshot, event_tx })
}

pub fn start_server(
    bind_address: String,
    port: u16,
    snapshot: Arc<RwLock<Snapshot>>,
    event_tx: mpsc::Sender<AppEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(snapshot, event_tx);
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("[http] failed to bind {}: {}", addr, e);
                return;
            }
        };

        info!("[http] API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("[http] server error: {}", e);
        }
    })
}

async fn dispatch(state: &HttpState, cmd: Command) -> StatusCode {
    info!("[http] {:?}", cmd);
    if state.event_tx.send(AppEvent::Command(cmd)).await.is_err() {
        error!("[http] event loop gone");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn get_state(State(state): State<HttpState>) -> Json<Snapshot> {
    Json(state.snapshot.read().await.clone())
}

async fn next(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::Next).await
}

async fn prev(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::Prev).await
}

async fn toggle(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::TogglePause).await
}

async fn shuffle(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::ToggleShuffle).await
}

async fn repeat(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::CycleRepeat).await
}

async fn set_volume(State(state): State<HttpState>, Path(pct): Path<i32>) -> StatusCode {
    let value = (pct as f32 / 100.0).clamp(0.0, 1.0);
    dispatch(&state, Command::Volume { value }).await
}

async fn search(State(state): State<HttpState>, Path(term): Path<String>) -> StatusCode {
    if term.trim().is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    dispatch(&state, Command::Search { term }).await
}

async fn command(State(state): State<HttpState>, Json(cmd): Json<Command>) -> StatusCode {
    dispatch(&state, cmd).await
}
