//! 외부 협력자 경계 (점수 영속화, 세션 인증)

pub mod scores;
pub mod sessions;

pub use scores::*;
pub use sessions::*;
