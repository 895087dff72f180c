//! 핸들러 모듈

pub mod connection;
pub mod game;
pub mod lobby;

pub use connection::*;
pub use game::*;
pub use lobby::*;
