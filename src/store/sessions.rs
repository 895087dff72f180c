//! 인증 세션 저장소

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// 웹소켓 업그레이드 전에 토큰을 닉네임으로 확인하는 경계
pub trait SessionValidator: Send + Sync {
    fn validate_session(&self, token: &str) -> Option<String>;
}

struct AuthSession {
    nickname: String,
    expires_at: Instant,
}

/// 메모리 기반 세션 토큰 저장소
pub struct InMemorySessions {
    sessions: DashMap<String, AuthSession>,
    ttl: Duration,
}

impl InMemorySessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// 지정한 토큰으로 세션 등록
    pub fn insert(&self, token: &str, nickname: &str) {
        self.sessions.insert(
            token.to_string(),
            AuthSession {
                nickname: nickname.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// 만료된 세션 정리
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);
        let purged = before.saturating_sub(self.sessions.len());

        if purged > 0 {
            tracing::info!(purged_sessions = purged, "Expired sessions cleaned up");
        }
        purged
    }
}

impl SessionValidator for InMemorySessions {
    fn validate_session(&self, token: &str) -> Option<String> {
        let session = self.sessions.get(token)?;
        if session.expires_at <= Instant::now() {
            return None;
        }
        Some(session.nickname.clone())
    }
}
