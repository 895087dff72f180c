//! 로비: 접속 레지스트리, 매칭 큐, 세션 틱 구동
//!
//! 로비 락은 레지스트리/큐/진행 중 게임 목록만 보호한다. 시뮬레이션 락과는 별개이며
//! 네트워크 대기 중에 잡고 있지 않는다 (엔드포인트 송신은 논블로킹).

use crate::config::GameConfig;
use crate::error::SendError;
use crate::game::Simulation;
use crate::handlers::connection::Endpoint;
use crate::protocol::{GameMode, ServerMessage};
use crate::state::SharedSimulation;
use crate::store::ScoreStore;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// 매칭 큐 참가 결과
#[derive(Clone)]
pub enum JoinOutcome {
    AlreadyQueued,
    Waiting,
    Paired(SharedSimulation),
}

pub struct Lobby {
    inner: Mutex<LobbyInner>,
    scores: Arc<dyn ScoreStore>,
    settings: GameConfig,
}

#[derive(Default)]
struct LobbyInner {
    endpoints: HashMap<Uuid, Arc<Endpoint>>,
    waiting: VecDeque<Arc<Endpoint>>,
    games: HashMap<Uuid, SharedSimulation>,
}

/// 틱 태스크 하나가 구동하는 세션
struct ActiveSession {
    game: SharedSimulation,
    mode: GameMode,
    members: Vec<Arc<Endpoint>>,
}

enum TickOutcome {
    Running,
    Over,
    DeliveryFailed { nickname: String, error: SendError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Finished,
    DeliveryFailed,
    Abandoned,
}

impl Lobby {
    pub fn new(scores: Arc<dyn ScoreStore>, settings: GameConfig) -> Self {
        Self {
            inner: Mutex::new(LobbyInner::default()),
            scores,
            settings,
        }
    }

    pub async fn register(&self, endpoint: Arc<Endpoint>) {
        let mut inner = self.inner.lock().await;
        inner.endpoints.insert(endpoint.id, endpoint.clone());
        tracing::info!(
            nickname = %endpoint.nickname,
            online = inner.endpoints.len(),
            "Client registered"
        );
        broadcast_population(&inner);
    }

    /// 레지스트리와 큐에서 제거하고 송신 태스크를 멈춘다.
    /// 연결된 시뮬레이션은 다음 틱의 송신 실패로 종료된다.
    pub async fn unregister(&self, endpoint: &Endpoint) {
        let mut inner = self.inner.lock().await;
        if inner.endpoints.remove(&endpoint.id).is_some() {
            endpoint.terminate();
        }
        inner.waiting.retain(|queued| queued.id != endpoint.id);
        tracing::info!(
            nickname = %endpoint.nickname,
            online = inner.endpoints.len(),
            "Client unregistered"
        );
        broadcast_population(&inner);
    }

    /// 매칭 큐 참가. 두 명이 모이면 즉시 짝 게임을 시작한다.
    pub async fn join_queue(self: &Arc<Self>, endpoint: Arc<Endpoint>) -> JoinOutcome {
        let mut inner = self.inner.lock().await;

        // 같은 계정의 다른 연결도 이미 대기 중인 것으로 본다
        if inner
            .waiting
            .iter()
            .any(|queued| queued.id == endpoint.id || queued.nickname == endpoint.nickname)
        {
            return JoinOutcome::AlreadyQueued;
        }

        inner.waiting.push_back(endpoint.clone());
        tracing::info!(
            nickname = %endpoint.nickname,
            queue_len = inner.waiting.len(),
            "Joined pair queue"
        );

        if inner.waiting.len() >= 2 {
            if let (Some(first), Some(second)) = (inner.waiting.pop_front(), inner.waiting.pop_front()) {
                drop(inner);
                return JoinOutcome::Paired(self.start_paired(first, second).await);
            }
        }

        if let Err(err) = endpoint.enqueue(&ServerMessage::Waiting) {
            tracing::warn!(nickname = %endpoint.nickname, error = %err, "Failed to send waiting notice");
        }
        JoinOutcome::Waiting
    }

    /// 짝 게임 시작. 두 엔드포인트는 큐에서 빠진다.
    pub async fn start_paired(
        self: &Arc<Self>,
        first: Arc<Endpoint>,
        second: Arc<Endpoint>,
    ) -> SharedSimulation {
        let mut inner = self.inner.lock().await;
        inner
            .waiting
            .retain(|queued| queued.id != first.id && queued.id != second.id);
        self.launch(&mut inner, GameMode::Pair, vec![first, second], None)
            .await
    }

    /// 1인 게임 시작. 기존 게임에 연결되어 있었다면 그 게임은 버려진다.
    pub async fn start_solo(
        self: &Arc<Self>,
        endpoint: Arc<Endpoint>,
        ghost_count: Option<i64>,
    ) -> SharedSimulation {
        let mut inner = self.inner.lock().await;
        inner.waiting.retain(|queued| queued.id != endpoint.id);
        self.launch(&mut inner, GameMode::Single, vec![endpoint], ghost_count)
            .await
    }

    pub async fn online_count(&self) -> usize {
        self.inner.lock().await.endpoints.len()
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.lock().await.waiting.len()
    }

    pub async fn active_games(&self) -> usize {
        self.inner.lock().await.games.len()
    }

    async fn launch(
        self: &Arc<Self>,
        inner: &mut LobbyInner,
        mode: GameMode,
        members: Vec<Arc<Endpoint>>,
        ghost_count: Option<i64>,
    ) -> SharedSimulation {
        let ghost_count = ghost_count.unwrap_or(self.settings.default_ghosts as i64);
        let nicknames: Vec<&str> = members.iter().map(|m| m.nickname.as_str()).collect();
        let simulation =
            Simulation::new(&nicknames, ghost_count).with_tick_ms(self.settings.tick_ms);
        let game = SharedSimulation::new(simulation);

        inner.games.insert(game.id(), game.clone());
        for member in &members {
            member.attach(game.clone()).await;
        }

        tracing::info!(
            game_id = %game.id(),
            mode = ?mode,
            players = ?nicknames,
            active_games = inner.games.len(),
            "Game started"
        );

        let session = ActiveSession {
            game: game.clone(),
            mode,
            members,
        };
        tokio::spawn(self.clone().drive(session));
        game
    }

    /// 세션 하나의 틱 루프
    async fn drive(self: Arc<Self>, session: ActiveSession) {
        let start = ServerMessage::GameStart {
            mode: session.mode,
            p1: session.members[0].nickname.clone(),
            p2: session.members.get(1).map(|m| m.nickname.clone()),
        };
        for member in &session.members {
            if let Err(err) = member.enqueue(&start) {
                tracing::warn!(nickname = %member.nickname, error = %err, "Failed to send game start");
            }
        }

        let mut ticker = tokio::time::interval(self.settings.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let end = loop {
            ticker.tick().await;

            if !self.members_attached(&session).await {
                break SessionEnd::Abandoned;
            }

            match tick_once(&session).await {
                TickOutcome::Running => continue,
                TickOutcome::Over => break SessionEnd::Finished,
                TickOutcome::DeliveryFailed { nickname, error } => {
                    tracing::warn!(
                        game_id = %session.game.id(),
                        nickname = %nickname,
                        error = %error,
                        "Delivery failed, ending game"
                    );
                    break SessionEnd::DeliveryFailed;
                }
            }
        };

        self.finish(session, end).await;
    }

    async fn members_attached(&self, session: &ActiveSession) -> bool {
        for member in &session.members {
            if !member.is_playing(&session.game).await {
                return false;
            }
        }
        true
    }

    /// 최종 상태 전송, 점수 저장(세션당 한 번), 연결 해제, 게임 목록에서 제거
    async fn finish(&self, session: ActiveSession, end: SessionEnd) {
        let (score, ghost_count, final_state) = {
            let mut game = session.game.write().await;
            game.force_over();
            let game = game.downgrade();
            (
                game.score(),
                game.ghost_count(),
                serde_json::to_string(&ServerMessage::GameState(game.snapshot())),
            )
        };

        // 다른 게임으로 옮겨 간 참가자에게는 보내지 않는다
        match final_state {
            Ok(payload) => {
                for member in &session.members {
                    if !member.is_playing(&session.game).await {
                        continue;
                    }
                    if let Err(err) = member.enqueue_text(payload.clone()) {
                        tracing::debug!(nickname = %member.nickname, error = %err, "Final state not delivered");
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "Failed to encode final state"),
        }

        self.persist(&session, score, ghost_count);

        for member in &session.members {
            member.detach_from(&session.game).await;
        }

        let remaining = {
            let mut inner = self.inner.lock().await;
            inner.games.remove(&session.game.id());
            inner.games.len()
        };

        tracing::info!(
            game_id = %session.game.id(),
            end = ?end,
            score,
            active_games = remaining,
            "Game over"
        );
    }

    fn persist(&self, session: &ActiveSession, score: u32, ghost_count: usize) {
        let result = match (session.mode, session.members.as_slice()) {
            (GameMode::Pair, [first, second, ..]) => {
                self.scores
                    .save_pair_score(&first.nickname, &second.nickname, score)
            }
            (_, [solo, ..]) => self
                .scores
                .save_score(&solo.nickname, score, ghost_count as i64),
            (_, []) => return,
        };

        if let Err(err) = result {
            tracing::warn!(game_id = %session.game.id(), error = %err, "Failed to save score");
        }
    }
}

/// 한 틱 진행 후 같은 락 안에서 직렬화하여 모든 참가자에게 전송
async fn tick_once(session: &ActiveSession) -> TickOutcome {
    let mut game = session.game.write().await;
    game.advance();
    let game = game.downgrade();

    let payload = match serde_json::to_string(&ServerMessage::GameState(game.snapshot())) {
        Ok(payload) => payload,
        Err(err) => {
            return TickOutcome::DeliveryFailed {
                nickname: String::new(),
                error: err.into(),
            }
        }
    };

    // 한 명이 실패해도 나머지는 같은 틱을 받는다
    let mut failure = None;
    for member in &session.members {
        if let Err(error) = member.enqueue_text(payload.clone()) {
            if failure.is_none() {
                failure = Some(TickOutcome::DeliveryFailed {
                    nickname: member.nickname.clone(),
                    error,
                });
            }
        }
    }
    if let Some(failure) = failure {
        return failure;
    }

    if game.is_over() {
        TickOutcome::Over
    } else {
        TickOutcome::Running
    }
}

fn broadcast_population(inner: &LobbyInner) {
    let stats = ServerMessage::LobbyStats {
        online_count: inner.endpoints.len(),
    };
    for endpoint in inner.endpoints.values() {
        if let Err(err) = endpoint.enqueue(&stats) {
            tracing::debug!(nickname = %endpoint.nickname, error = %err, "Lobby stats not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::handlers::connection::Outbound;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingScores {
        single: StdMutex<Vec<(String, u32, i64)>>,
        pair: StdMutex<Vec<(String, String, u32)>>,
    }

    impl ScoreStore for RecordingScores {
        fn save_score(&self, nickname: &str, score: u32, ghost_count: i64) -> Result<(), StoreError> {
            self.single
                .lock()
                .unwrap()
                .push((nickname.to_string(), score, ghost_count));
            Ok(())
        }

        fn save_pair_score(&self, player1: &str, player2: &str, score: u32) -> Result<(), StoreError> {
            self.pair
                .lock()
                .unwrap()
                .push((player1.to_string(), player2.to_string(), score));
            Ok(())
        }
    }

    fn settings() -> GameConfig {
        GameConfig {
            tick_ms: 10,
            ..GameConfig::default()
        }
    }

    fn lobby_with(scores: Arc<RecordingScores>) -> Arc<Lobby> {
        Arc::new(Lobby::new(scores, settings()))
    }

    fn drain_types(outbound: &mut Outbound) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(raw) = outbound.queue.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            types.push(value["type"].as_str().unwrap_or_default().to_string());
        }
        types
    }

    async fn wait_until_idle(lobby: &Lobby) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while lobby.active_games().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("game should be retired");
    }

    #[tokio::test]
    async fn register_and_unregister_broadcast_population() {
        let lobby = lobby_with(Arc::default());
        let (alice, mut alice_out) = Endpoint::new("alice", 16);
        let (bob, _bob_out) = Endpoint::new("bob", 16);

        lobby.register(alice.clone()).await;
        lobby.register(bob.clone()).await;
        assert_eq!(lobby.online_count().await, 2);

        lobby.unregister(&bob).await;
        assert_eq!(lobby.online_count().await, 1);
        assert!(bob.is_terminating());
        assert!(matches!(
            bob.enqueue(&ServerMessage::Waiting),
            Err(SendError::Disconnected)
        ));

        let mut counts = Vec::new();
        while let Ok(raw) = alice_out.queue.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(value["type"], "lobby_stats");
            counts.push(value["online_count"].as_u64().unwrap());
        }
        assert_eq!(counts, vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn joining_twice_is_idempotent() {
        let lobby = lobby_with(Arc::default());
        let (alice, mut alice_out) = Endpoint::new("alice", 16);

        assert!(matches!(lobby.join_queue(alice.clone()).await, JoinOutcome::Waiting));
        assert!(matches!(
            lobby.join_queue(alice.clone()).await,
            JoinOutcome::AlreadyQueued
        ));

        assert_eq!(lobby.queue_len().await, 1);
        assert_eq!(drain_types(&mut alice_out), vec!["waiting"]);
    }

    #[tokio::test]
    async fn second_connection_of_same_account_is_not_paired_with_itself() {
        let lobby = lobby_with(Arc::default());
        let (first, _a) = Endpoint::new("alice", 16);
        let (second, mut second_out) = Endpoint::new("alice", 16);

        lobby.join_queue(first).await;
        let outcome = lobby.join_queue(second.clone()).await;

        assert!(matches!(outcome, JoinOutcome::AlreadyQueued));
        assert_eq!(lobby.queue_len().await, 1);
        assert_eq!(lobby.active_games().await, 0);
        assert!(second.current_simulation().await.is_none());
        assert!(drain_types(&mut second_out).is_empty());
    }

    #[tokio::test]
    async fn two_queued_endpoints_are_paired() {
        let lobby = lobby_with(Arc::default());
        let (alice, _alice_out) = Endpoint::new("alice", 64);
        let (bob, _bob_out) = Endpoint::new("bob", 64);

        lobby.join_queue(alice.clone()).await;
        let outcome = lobby.join_queue(bob.clone()).await;

        let JoinOutcome::Paired(game) = outcome else {
            panic!("expected a pair game");
        };
        assert_eq!(lobby.queue_len().await, 0);
        assert_eq!(lobby.active_games().await, 1);
        assert!(alice.is_playing(&game).await);
        assert!(bob.is_playing(&game).await);

        let sim = game.read().await;
        assert!(sim.player("alice").is_some());
        assert!(sim.player("bob").is_some());
    }

    #[tokio::test]
    async fn third_join_waits_alone_while_pair_plays() {
        let lobby = lobby_with(Arc::default());
        let (alice, _a) = Endpoint::new("alice", 64);
        let (bob, _b) = Endpoint::new("bob", 64);
        let (carol, mut carol_out) = Endpoint::new("carol", 64);

        lobby.join_queue(alice).await;
        lobby.join_queue(bob).await;
        let outcome = lobby.join_queue(carol.clone()).await;

        assert!(matches!(outcome, JoinOutcome::Waiting));
        assert_eq!(lobby.queue_len().await, 1);
        assert_eq!(lobby.active_games().await, 1);
        assert!(carol.current_simulation().await.is_none());
        assert_eq!(drain_types(&mut carol_out), vec!["waiting"]);
    }

    #[tokio::test]
    async fn unregister_purges_queue() {
        let lobby = lobby_with(Arc::default());
        let (alice, _a) = Endpoint::new("alice", 16);

        lobby.register(alice.clone()).await;
        lobby.join_queue(alice.clone()).await;
        lobby.unregister(&alice).await;

        assert_eq!(lobby.queue_len().await, 0);
    }

    #[tokio::test]
    async fn peer_disconnect_ends_pair_game_for_both() {
        let scores = Arc::new(RecordingScores::default());
        let lobby = lobby_with(scores.clone());
        let (alice, _a) = Endpoint::new("alice", 1024);
        let (bob, mut bob_out) = Endpoint::new("bob", 1024);
        lobby.register(alice.clone()).await;
        lobby.register(bob.clone()).await;

        let game = lobby.start_paired(alice.clone(), bob.clone()).await;
        lobby.unregister(&alice).await;
        wait_until_idle(&lobby).await;

        assert!(game.read().await.is_over());
        assert!(bob.current_simulation().await.is_none());
        assert_eq!(scores.pair.lock().unwrap().len(), 1);
        assert!(drain_types(&mut bob_out).contains(&"game_start".to_string()));
    }

    #[tokio::test]
    async fn remaining_peer_receives_final_state_after_disconnect() {
        let lobby = lobby_with(Arc::default());
        let (alice, mut alice_out) = Endpoint::new("alice", 1024);
        let (bob, _b) = Endpoint::new("bob", 1024);

        lobby.start_paired(alice.clone(), bob.clone()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        lobby.unregister(&bob).await;
        wait_until_idle(&lobby).await;

        let mut last_state = None;
        while let Ok(raw) = alice_out.queue.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            if value["type"] == "game_state" {
                last_state = Some(value);
            }
        }
        let last_state = last_state.expect("alice should have received game states");
        assert_eq!(last_state["gameOver"], true);
    }

    #[tokio::test]
    async fn failed_delivery_still_reaches_other_member() {
        let (slow, _slow_out) = Endpoint::new("slow", 1);
        let (fast, mut fast_out) = Endpoint::new("fast", 16);
        slow.enqueue_text("filler".to_string()).unwrap();

        let session = ActiveSession {
            game: SharedSimulation::new(Simulation::new(&["slow", "fast"], 1)),
            mode: GameMode::Pair,
            members: vec![slow, fast],
        };

        let outcome = tick_once(&session).await;

        assert!(matches!(
            outcome,
            TickOutcome::DeliveryFailed { ref nickname, error: SendError::Backpressure } if nickname == "slow"
        ));
        assert_eq!(drain_types(&mut fast_out), vec!["game_state"]);
    }

    #[tokio::test]
    async fn backpressure_ends_the_game() {
        let scores = Arc::new(RecordingScores::default());
        let lobby = lobby_with(scores.clone());
        let (slow, _slow_out) = Endpoint::new("slow", 2);

        lobby.start_solo(slow.clone(), Some(3)).await;
        wait_until_idle(&lobby).await;

        assert!(slow.current_simulation().await.is_none());
        let saved = scores.single.lock().unwrap().clone();
        assert_eq!(saved, vec![("slow".to_string(), 0, 3)]);
    }

    #[tokio::test]
    async fn finished_solo_game_saves_score_with_ghost_count() {
        let scores = Arc::new(RecordingScores::default());
        let lobby = lobby_with(scores.clone());
        let (alice, mut alice_out) = Endpoint::new("alice", 1024);

        let game = lobby.start_solo(alice.clone(), Some(50)).await;
        assert_eq!(game.read().await.ghost_count(), 10);

        game.write().await.force_over();
        wait_until_idle(&lobby).await;

        let saved = scores.single.lock().unwrap().clone();
        assert_eq!(saved, vec![("alice".to_string(), 0, 10)]);
        assert!(scores.pair.lock().unwrap().is_empty());

        let types = drain_types(&mut alice_out);
        assert_eq!(types.first().map(String::as_str), Some("game_start"));
        // 마지막 틱 상태 + 최종 상태
        assert!(types.iter().filter(|t| *t == "game_state").count() >= 2);
    }

    #[tokio::test]
    async fn solo_without_ghost_count_uses_default() {
        let lobby = lobby_with(Arc::default());
        let (alice, _a) = Endpoint::new("alice", 1024);

        let game = lobby.start_solo(alice, None).await;

        assert_eq!(game.read().await.ghost_count(), settings().default_ghosts);
    }

    #[tokio::test]
    async fn starting_solo_abandons_previous_game() {
        let scores = Arc::new(RecordingScores::default());
        let lobby = lobby_with(scores.clone());
        let (alice, _a) = Endpoint::new("alice", 1024);

        let first = lobby.start_solo(alice.clone(), None).await;
        let second = lobby.start_solo(alice.clone(), None).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while lobby.active_games().await > 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first game should be retired");

        assert!(first.read().await.is_over());
        assert!(alice.is_playing(&second).await);
        assert_eq!(scores.single.lock().unwrap().len(), 1);
    }
}
