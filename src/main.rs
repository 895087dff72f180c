//! Pacman Arena 게임 서버

mod config;
mod error;
mod game;
mod handlers;
mod protocol;
mod state;
mod store;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use config::Config;
use futures::StreamExt;
use handlers::{Endpoint, Lobby};
use protocol::ClientMessage;
use serde::Deserialize;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use store::{InMemoryScores, InMemorySessions};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 세션 저장소
    let sessions = Arc::new(InMemorySessions::new(Duration::from_secs(
        config.auth.session_ttl_secs,
    )));
    for (token, nickname) in &config.auth.dev_sessions {
        sessions.insert(token, nickname);
        tracing::info!(nickname = %nickname, "Seeded development session");
    }

    // 만료 세션 정리 스케줄러
    let sweeper = sessions.clone();
    let cleanup_every = Duration::from_secs(config.auth.cleanup_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_every);
        loop {
            interval.tick().await;
            sweeper.purge_expired();
        }
    });

    let lobby = Arc::new(Lobby::new(
        Arc::new(InMemoryScores::new()),
        config.game.clone(),
    ));
    let state = Arc::new(AppState::new(config.clone(), lobby, sessions));

    // CORS 설정
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Pacman Arena server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/api/ws?token=...", addr);

    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>Pacman Arena Server</h1><p>WebSocket endpoint: /api/ws</p>")
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "pacman-arena-server",
        "online": state.lobby.online_count().await,
        "queued": state.lobby.queue_len().await,
        "active_games": state.lobby.active_games().await,
    }))
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN) {
        let allowed = origin
            .to_str()
            .map(|origin| state.config.is_origin_allowed(origin))
            .unwrap_or(false);
        if !allowed {
            tracing::warn!(origin = ?origin, "Rejected WebSocket origin");
            return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
        }
    }

    let Some(token) = query.token.filter(|token| !token.is_empty()) else {
        return (StatusCode::UNAUTHORIZED, "Missing authentication token").into_response();
    };
    let Some(nickname) = state.sessions.validate_session(&token) else {
        return (StatusCode::UNAUTHORIZED, "Invalid or expired session").into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, nickname))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, nickname: String) {
    let (ws_sender, mut ws_receiver) = socket.split();

    // 연결 처리 (송신 태스크 시작 + 로비 등록)
    let (endpoint, pump) = handlers::handle_connection(&state, nickname, ws_sender).await;

    // 수신 처리
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(&state, &endpoint, msg).await,
                Err(err) => {
                    tracing::debug!(nickname = %endpoint.nickname, error = %err, "Ignoring malformed message");
                }
            },
            Ok(Message::Close(_)) => break,
            Err(err) => {
                tracing::debug!(nickname = %endpoint.nickname, error = %err, "WebSocket read failed");
                break;
            }
            _ => {}
        }
    }

    // 연결 해제
    handlers::handle_disconnect(&state, &endpoint).await;
    let _ = pump.await;
}

async fn handle_client_message(state: &AppState, endpoint: &Arc<Endpoint>, msg: ClientMessage) {
    match msg {
        ClientMessage::JoinPair => {
            handlers::handle_join_pair(state, endpoint).await;
        }
        ClientMessage::Input { direction } => {
            handlers::handle_input(endpoint, direction).await;
        }
        ClientMessage::StartSingle { ghost_count } => {
            handlers::handle_start_single(state, endpoint, ghost_count).await;
        }
        ClientMessage::UpdateGhostCount { count } => {
            handlers::handle_update_ghost_count(endpoint, count).await;
        }
    }
}
