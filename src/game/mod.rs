//! 게임 로직 모듈 (I/O 없음)

pub mod ghost_ai;
pub mod maze;
pub mod simulation;

pub use maze::Direction;
pub use simulation::{GameSnapshot, Simulation};
