//! 유령 방향 선택

use super::maze::{Direction, Grid, Position};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 진행 중에도 방향을 바꿀 확률
pub const TURN_PROBABILITY: f64 = 0.2;

/// 유령 AI의 무작위 요소. 테스트에서 교체 가능.
pub trait DirectionSource: Send + Sync {
    /// 확률 `probability`로 true
    fn chance(&mut self, probability: f64) -> bool;
    /// `0..len` 범위의 인덱스
    fn pick(&mut self, len: usize) -> usize;
}

pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectionSource for RandomSource {
    fn chance(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    fn pick(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}

/// 되돌아가기를 제외한 합법 방향 목록. 다른 선택지가 없으면 되돌아가기 허용.
pub fn allowed_directions(grid: &Grid, pos: Position, heading: Option<Direction>) -> Vec<Direction> {
    let legal: Vec<Direction> = Direction::ALL
        .into_iter()
        .filter(|dir| grid.can_move(pos, *dir))
        .collect();

    let Some(heading) = heading else {
        return legal;
    };

    let forward: Vec<Direction> = legal
        .iter()
        .copied()
        .filter(|dir| *dir != heading.reverse())
        .collect();

    if forward.is_empty() {
        legal
    } else {
        forward
    }
}

/// 이번 틱에 유령이 향할 방향
pub fn choose_direction(
    grid: &Grid,
    pos: Position,
    heading: Option<Direction>,
    source: &mut dyn DirectionSource,
) -> Option<Direction> {
    let allowed = allowed_directions(grid, pos, heading);

    let must_turn = match heading {
        None => true,
        Some(dir) => !grid.can_move(pos, dir),
    };

    if (must_turn || source.chance(TURN_PROBABILITY)) && !allowed.is_empty() {
        return Some(allowed[source.pick(allowed.len())]);
    }
    heading
}
