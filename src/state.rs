//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::game::Simulation;
use crate::handlers::Lobby;
use crate::store::SessionValidator;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 접속 레지스트리, 매칭 큐, 진행 중 게임
    pub lobby: Arc<Lobby>,
    /// 토큰 검증기
    pub sessions: Arc<dyn SessionValidator>,
    /// 설정
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, lobby: Arc<Lobby>, sessions: Arc<dyn SessionValidator>) -> Self {
        Self {
            lobby,
            sessions,
            config: Arc::new(config),
        }
    }
}

/// 세션 하나의 시뮬레이션. 모든 접근은 읽기/쓰기 락을 거친다.
#[derive(Clone)]
pub struct SharedSimulation {
    id: Uuid,
    inner: Arc<RwLock<Simulation>>,
}

impl SharedSimulation {
    pub fn new(simulation: Simulation) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Arc::new(RwLock::new(simulation)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Simulation> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, Simulation> {
        self.inner.write().await
    }

    pub fn same_as(&self, other: &SharedSimulation) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
