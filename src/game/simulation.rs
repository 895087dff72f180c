//! 게임 세션 시뮬레이션
//!
//! 한 틱의 처리 순서는 플레이어 이동 → 유령 이동 → 충돌 판정으로 고정된다.
//! 교차 충돌 판정은 양쪽의 이전/현재 위치에 의존하므로 순서를 바꾸면 안 된다.

use super::ghost_ai::{choose_direction, DirectionSource, RandomSource};
use super::maze::{clone_for_session, load_template, wrap, Cell, Direction, Grid, Position};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

pub const DEFAULT_TICK_MS: u64 = 150;
pub const DOT_POINTS: u32 = 10;
pub const POWER_POINTS: u32 = 50;
pub const GHOST_POINTS: u32 = 200;
pub const POWER_DURATION_MS: u64 = 5_000;
/// 연속 섭취 보너스가 유지되는 시간
pub const COMBO_WINDOW_MS: u64 = 1_000;
pub const MAX_COMBO_BONUS: u64 = 100;

pub const MIN_GHOSTS: usize = 1;
pub const MAX_GHOSTS: usize = 10;

const PLAYER_SPAWNS: [Position; 2] = [Position::new(9, 16), Position::new(10, 16)];

struct GhostTemplate {
    pos: Position,
    dir: Direction,
    color: &'static str,
}

const GHOST_TEMPLATES: [GhostTemplate; 4] = [
    GhostTemplate {
        pos: Position::new(8, 7),
        dir: Direction::Left,
        color: "red",
    },
    GhostTemplate {
        pos: Position::new(9, 8),
        dir: Direction::Right,
        color: "pink",
    },
    GhostTemplate {
        pos: Position::new(10, 7),
        dir: Direction::Up,
        color: "cyan",
    },
    GhostTemplate {
        pos: Position::new(10, 8),
        dir: Direction::Down,
        color: "orange",
    },
];

/// 요청된 유령 수를 지원 범위로 보정
pub fn clamp_ghost_count(requested: i64) -> usize {
    requested.clamp(MIN_GHOSTS as i64, MAX_GHOSTS as i64) as usize
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub nickname: String,
    pub pos: Position,
    #[serde(skip)]
    pub prev_pos: Position,
    pub dir: Option<Direction>,
    pub next_dir: Option<Direction>,
    pub alive: bool,
}

impl Player {
    fn spawn(nickname: &str, pos: Position) -> Self {
        Self {
            nickname: nickname.to_string(),
            pos,
            prev_pos: pos,
            dir: None,
            next_dir: None,
            alive: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ghost {
    pub id: u32,
    pub pos: Position,
    #[serde(skip)]
    pub prev_pos: Position,
    pub dir: Option<Direction>,
    pub color: &'static str,
}

/// 클라이언트로 전송되는 전체 상태
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub grid: Grid,
    pub players: BTreeMap<String, Player>,
    pub ghosts: Vec<Ghost>,
    pub score: u32,
    pub game_over: bool,
    pub power_mode_time: u64,
    pub ghost_count: usize,
}

pub struct Simulation {
    grid: Grid,
    players: BTreeMap<String, Player>,
    ghosts: Vec<Ghost>,
    score: u32,
    game_over: bool,
    power_mode_ms: u64,
    last_eat: Option<Instant>,
    ghost_count: usize,
    tick_ms: u64,
    source: Box<dyn DirectionSource>,
}

impl Simulation {
    pub fn new(nicknames: &[&str], ghost_count: i64) -> Self {
        let players = nicknames
            .iter()
            .enumerate()
            .map(|(idx, nickname)| {
                let spawn = PLAYER_SPAWNS[idx % PLAYER_SPAWNS.len()];
                (nickname.to_string(), Player::spawn(nickname, spawn))
            })
            .collect();

        let ghost_count = clamp_ghost_count(ghost_count);

        Self {
            grid: clone_for_session(load_template()),
            players,
            ghosts: build_roster(ghost_count),
            score: 0,
            game_over: false,
            power_mode_ms: 0,
            last_eat: None,
            ghost_count,
            tick_ms: DEFAULT_TICK_MS,
            source: Box::new(RandomSource::new()),
        }
    }

    pub fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.tick_ms = tick_ms;
        self
    }

    pub fn with_source(mut self, source: Box<dyn DirectionSource>) -> Self {
        self.source = source;
        self
    }

    pub fn is_over(&self) -> bool {
        self.game_over
    }

    /// 전송 실패 등으로 세션을 즉시 종료
    pub fn force_over(&mut self) {
        self.game_over = true;
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn ghost_count(&self) -> usize {
        self.ghost_count
    }

    #[cfg(test)]
    pub fn power_mode_ms(&self) -> u64 {
        self.power_mode_ms
    }

    #[cfg(test)]
    pub fn player(&self, nickname: &str) -> Option<&Player> {
        self.players.get(nickname)
    }

    /// 다음 방향 예약. 합법성은 이동 시점에 판정한다.
    pub fn set_next_direction(&mut self, nickname: &str, dir: Direction) {
        if let Some(player) = self.players.get_mut(nickname) {
            player.next_dir = Some(dir);
        }
    }

    /// 유령 수 재설정. 누군가 이미 움직이기 시작했으면 거부.
    pub fn update_ghost_count(&mut self, requested: i64) -> bool {
        if self.players.values().any(|p| p.dir.is_some()) {
            return false;
        }
        self.ghost_count = clamp_ghost_count(requested);
        self.ghosts = build_roster(self.ghost_count);
        true
    }

    pub fn advance(&mut self) {
        self.advance_at(Instant::now());
    }

    pub fn advance_at(&mut self, now: Instant) {
        if self.game_over {
            return;
        }

        self.move_players(now);
        self.move_ghosts();
        self.resolve_collisions();

        self.power_mode_ms = self.power_mode_ms.saturating_sub(self.tick_ms);
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            grid: self.grid.clone(),
            players: self.players.clone(),
            ghosts: self.ghosts.clone(),
            score: self.score,
            game_over: self.game_over,
            power_mode_time: self.power_mode_ms,
            ghost_count: self.ghost_count,
        }
    }

    fn move_players(&mut self, now: Instant) {
        let Self {
            grid,
            players,
            score,
            power_mode_ms,
            last_eat,
            ..
        } = self;

        for player in players.values_mut().filter(|p| p.alive) {
            player.prev_pos = player.pos;

            if let Some(next) = player.next_dir {
                if grid.can_move(player.pos, next) {
                    player.dir = Some(next);
                }
            }

            let Some(dir) = player.dir else {
                continue;
            };
            if !grid.can_move(player.pos, dir) {
                continue;
            }

            let dest = wrap(player.pos.step(dir));
            match grid.cell(dest) {
                Some(Cell::Dot) => {
                    grid.set(dest, Cell::Empty);
                    *score += DOT_POINTS + combo_bonus(*last_eat, now);
                    *last_eat = Some(now);
                }
                Some(Cell::Power) => {
                    grid.set(dest, Cell::Empty);
                    *score += POWER_POINTS;
                    *power_mode_ms = POWER_DURATION_MS;
                }
                _ => {}
            }
            player.pos = dest;
        }
    }

    fn move_ghosts(&mut self) {
        let Self {
            grid,
            ghosts,
            source,
            ..
        } = self;

        for ghost in ghosts.iter_mut() {
            ghost.prev_pos = ghost.pos;

            let Some(dir) = choose_direction(grid, ghost.pos, ghost.dir, source.as_mut()) else {
                continue;
            };
            if grid.can_move(ghost.pos, dir) {
                ghost.pos = wrap(ghost.pos.step(dir));
                ghost.dir = Some(dir);
            }
        }
    }

    fn resolve_collisions(&mut self) {
        let hits: Vec<(usize, String)> = self
            .ghosts
            .iter()
            .enumerate()
            .flat_map(|(idx, ghost)| {
                self.players
                    .values()
                    .filter(move |p| p.alive && collides(ghost, p))
                    .map(move |p| (idx, p.nickname.clone()))
            })
            .collect();

        let home = self.grid.spawn_tile();
        for (ghost_idx, nickname) in hits {
            if self.power_mode_ms > 0 {
                self.score += GHOST_POINTS;
                let ghost = &mut self.ghosts[ghost_idx];
                ghost.pos = home;
                ghost.prev_pos = home;
            } else if let Some(player) = self.players.get_mut(&nickname) {
                player.alive = false;
            }
        }

        if self.players.values().all(|p| !p.alive) {
            self.game_over = true;
        }
    }
}

/// 같은 칸에 있거나, 한 틱 안에 서로 자리를 바꿨으면 충돌
fn collides(ghost: &Ghost, player: &Player) -> bool {
    ghost.pos == player.pos || (ghost.pos == player.prev_pos && ghost.prev_pos == player.pos)
}

fn combo_bonus(last_eat: Option<Instant>, now: Instant) -> u32 {
    let Some(last) = last_eat else {
        return 0;
    };
    let elapsed_ms = now.saturating_duration_since(last).as_millis() as u64;
    if elapsed_ms >= COMBO_WINDOW_MS {
        return 0;
    }
    MAX_COMBO_BONUS.saturating_sub(elapsed_ms / 10) as u32
}

fn build_roster(count: usize) -> Vec<Ghost> {
    (0..count)
        .map(|idx| {
            let template = &GHOST_TEMPLATES[idx % GHOST_TEMPLATES.len()];
            Ghost {
                id: idx as u32 + 1,
                pos: template.pos,
                prev_pos: template.pos,
                dir: Some(template.dir),
                color: template.color,
            }
        })
        .collect()
}
