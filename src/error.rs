//! 에러 타입 정의

use thiserror::Error;

/// 엔드포인트 송신 실패
#[derive(Debug, Error)]
pub enum SendError {
    /// 엔드포인트가 종료 중이거나 송신 큐가 닫힘
    #[error("client disconnected")]
    Disconnected,
    /// 송신 큐가 가득 참
    #[error("client send buffer full")]
    Backpressure,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 점수 저장소 실패
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid score entry: {0}")]
    Invalid(String),
}
