//! 게임 입력 핸들러

use crate::game::Direction;
use crate::handlers::connection::Endpoint;
use crate::handlers::lobby::JoinOutcome;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use std::sync::Arc;

/// 매칭 큐 참가 요청
pub async fn handle_join_pair(state: &AppState, endpoint: &Arc<Endpoint>) {
    match state.lobby.join_queue(endpoint.clone()).await {
        JoinOutcome::AlreadyQueued => {
            tracing::debug!(nickname = %endpoint.nickname, "Already in pair queue");
        }
        JoinOutcome::Waiting => {}
        JoinOutcome::Paired(game) => {
            tracing::debug!(nickname = %endpoint.nickname, game_id = %game.id(), "Paired");
        }
    }
}

/// 1인 게임 시작 요청
pub async fn handle_start_single(state: &AppState, endpoint: &Arc<Endpoint>, ghost_count: Option<i64>) {
    state.lobby.start_solo(endpoint.clone(), ghost_count).await;
}

/// 방향 입력. 게임에 연결되어 있지 않으면 무시.
pub async fn handle_input(endpoint: &Endpoint, direction: Direction) {
    let Some(game) = endpoint.current_simulation().await else {
        return;
    };
    game.write()
        .await
        .set_next_direction(&endpoint.nickname, direction);
}

/// 유령 수 변경 후 즉시 현재 상태를 돌려준다. 이동이 시작된 뒤면 변경은 거부된다.
pub async fn handle_update_ghost_count(endpoint: &Endpoint, count: i64) -> bool {
    let Some(game) = endpoint.current_simulation().await else {
        return false;
    };

    let mut sim = game.write().await;
    let applied = sim.update_ghost_count(count);
    let sim = sim.downgrade();

    if let Err(err) = endpoint.enqueue(&ServerMessage::GameState(sim.snapshot())) {
        tracing::warn!(nickname = %endpoint.nickname, error = %err, "Failed to send ghost count update");
    }

    tracing::debug!(
        nickname = %endpoint.nickname,
        requested = count,
        applied,
        ghost_count = sim.ghost_count(),
        "Ghost count update"
    );
    applied
}
