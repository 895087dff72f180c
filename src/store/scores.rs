//! 점수 저장소

use crate::error::StoreError;
use dashmap::DashMap;

const FALLBACK_GHOST_COUNT: i64 = 4;

/// 종료된 세션의 점수를 받는 영속화 경계
pub trait ScoreStore: Send + Sync {
    fn save_score(&self, nickname: &str, score: u32, ghost_count: i64) -> Result<(), StoreError>;
    fn save_pair_score(&self, player1: &str, player2: &str, score: u32) -> Result<(), StoreError>;
}

/// 메모리 기반 최고 점수 보관
#[derive(Default)]
pub struct InMemoryScores {
    single: DashMap<(String, i64), u32>,
    pair: DashMap<(String, String), u32>,
}

impl InMemoryScores {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl InMemoryScores {
    pub fn best_score(&self, nickname: &str, ghost_count: i64) -> Option<u32> {
        self.single
            .get(&(nickname.to_string(), ghost_count))
            .map(|entry| *entry)
    }

    pub fn best_pair_score(&self, player1: &str, player2: &str) -> Option<u32> {
        self.pair.get(&pair_key(player1, player2)).map(|entry| *entry)
    }
}

impl ScoreStore for InMemoryScores {
    fn save_score(&self, nickname: &str, score: u32, ghost_count: i64) -> Result<(), StoreError> {
        if nickname.is_empty() {
            return Err(StoreError::Invalid("empty nickname".to_string()));
        }
        let ghost_count = if ghost_count <= 0 {
            FALLBACK_GHOST_COUNT
        } else {
            ghost_count
        };

        let mut best = self
            .single
            .entry((nickname.to_string(), ghost_count))
            .or_insert(score);
        if *best < score {
            *best = score;
        }

        tracing::debug!(nickname = %nickname, score, ghost_count, "Score recorded");
        Ok(())
    }

    fn save_pair_score(&self, player1: &str, player2: &str, score: u32) -> Result<(), StoreError> {
        if player1.is_empty() || player2.is_empty() {
            return Err(StoreError::Invalid("empty nickname".to_string()));
        }

        let mut best = self.pair.entry(pair_key(player1, player2)).or_insert(score);
        if *best < score {
            *best = score;
        }

        tracing::debug!(player1 = %player1, player2 = %player2, score, "Pair score recorded");
        Ok(())
    }
}

/// 순서와 무관한 짝 키 (사전순 정렬)
fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}
