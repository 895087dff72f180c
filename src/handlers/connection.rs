//! 연결 핸들러
//!
//! 엔드포인트는 "시뮬레이션이 보내려는 것"과 "네트워크가 지금 받을 수 있는 것"을
//! 분리한다. 송신은 항상 논블로킹이며, 실제 소켓 쓰기는 전용 송신 태스크가 담당한다.

use crate::error::SendError;
use crate::state::{AppState, SharedSimulation};
use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// 단일 프레임 쓰기 제한 시간
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// 인증된 네트워크 피어 하나
pub struct Endpoint {
    pub id: Uuid,
    pub nickname: String,
    outbound: mpsc::Sender<String>,
    stop: watch::Sender<bool>,
    game: RwLock<Option<SharedSimulation>>,
    pub connected_at: Instant,
}

/// 송신 큐의 수신 측. 송신 태스크가 소유한다.
pub struct Outbound {
    pub(crate) queue: mpsc::Receiver<String>,
    pub(crate) stop: watch::Receiver<bool>,
}

impl Endpoint {
    pub fn new(nickname: impl Into<String>, capacity: usize) -> (Arc<Self>, Outbound) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);

        let endpoint = Arc::new(Self {
            id: Uuid::new_v4(),
            nickname: nickname.into(),
            outbound: tx,
            stop: stop_tx,
            game: RwLock::new(None),
            connected_at: Instant::now(),
        });

        (
            endpoint,
            Outbound {
                queue: rx,
                stop: stop_rx,
            },
        )
    }

    /// 직렬화 후 논블로킹으로 큐에 넣는다
    pub fn enqueue<T: Serialize>(&self, message: &T) -> Result<(), SendError> {
        let payload = serde_json::to_string(message)?;
        self.enqueue_text(payload)
    }

    pub fn enqueue_text(&self, payload: String) -> Result<(), SendError> {
        if self.is_terminating() {
            return Err(SendError::Disconnected);
        }
        match self.outbound.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SendError::Backpressure),
            Err(TrySendError::Closed(_)) => Err(SendError::Disconnected),
        }
    }

    /// 송신 태스크에 종료 신호
    pub fn terminate(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_terminating(&self) -> bool {
        *self.stop.borrow()
    }

    /// 시뮬레이션에 연결. 이전 연결은 끊긴다.
    pub async fn attach(&self, game: SharedSimulation) -> Option<SharedSimulation> {
        self.game.write().await.replace(game)
    }

    /// 아직 `game`에 연결되어 있을 때만 연결 해제
    pub async fn detach_from(&self, game: &SharedSimulation) -> bool {
        let mut current = self.game.write().await;
        if current.as_ref().is_some_and(|g| g.same_as(game)) {
            *current = None;
            return true;
        }
        false
    }

    pub async fn current_simulation(&self) -> Option<SharedSimulation> {
        self.game.read().await.clone()
    }

    pub async fn is_playing(&self, game: &SharedSimulation) -> bool {
        self.game
            .read()
            .await
            .as_ref()
            .is_some_and(|g| g.same_as(game))
    }
}

impl Outbound {
    /// 큐를 소켓으로 비우고 주기적으로 ping을 보낸다.
    /// 큐 닫힘, 전송 실패, 종료 신호 중 하나로 끝나며 항상 소켓을 닫는다.
    pub async fn pump<S>(mut self, mut sink: S, keepalive: Duration)
    where
        S: Sink<Message> + Unpin,
    {
        let mut keepalive = tokio::time::interval_at(
            tokio::time::Instant::now() + keepalive,
            keepalive,
        );
        let mut transport_ok = true;

        loop {
            if *self.stop.borrow() {
                break;
            }

            tokio::select! {
                next = self.queue.recv() => match next {
                    Some(payload) => {
                        if !write_frame(&mut sink, Message::Text(payload)).await {
                            transport_ok = false;
                            break;
                        }
                    }
                    None => break,
                },
                _ = keepalive.tick() => {
                    if !write_frame(&mut sink, Message::Ping(Vec::new())).await {
                        transport_ok = false;
                        break;
                    }
                }
                changed = self.stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.queue.close();
        if transport_ok {
            let _ = write_frame(&mut sink, Message::Close(None)).await;
        }
        let _ = sink.close().await;
    }
}

async fn write_frame<S>(sink: &mut S, frame: Message) -> bool
where
    S: Sink<Message> + Unpin,
{
    matches!(
        tokio::time::timeout(WRITE_TIMEOUT, sink.send(frame)).await,
        Ok(Ok(()))
    )
}

/// 새 연결 처리: 송신 태스크 시작 후 로비에 등록
pub async fn handle_connection<S>(
    state: &AppState,
    nickname: String,
    sink: S,
) -> (Arc<Endpoint>, JoinHandle<()>)
where
    S: Sink<Message> + Unpin + Send + 'static,
{
    let game_config = &state.config.game;
    let (endpoint, outbound) = Endpoint::new(nickname, game_config.outbound_queue);

    let pump = tokio::spawn(outbound.pump(sink, game_config.keepalive()));
    state.lobby.register(endpoint.clone()).await;

    tracing::info!(
        endpoint_id = %endpoint.id,
        nickname = %endpoint.nickname,
        "New connection established"
    );
    (endpoint, pump)
}

/// 연결 해제 처리
pub async fn handle_disconnect(state: &AppState, endpoint: &Endpoint) {
    state.lobby.unregister(endpoint).await;
    tracing::info!(
        endpoint_id = %endpoint.id,
        nickname = %endpoint.nickname,
        connected_ms = endpoint.connected_at.elapsed().as_millis() as u64,
        "Connection closed"
    );
}
