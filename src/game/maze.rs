//! 미로 격자 모델

use serde::{Deserialize, Serialize, Serializer};
use std::sync::OnceLock;

pub const ROWS: usize = 21;
pub const COLS: usize = 19;

/// 격자 좌표 (x = 열, y = 행)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// 한 칸 이동한 좌표 (경계 처리 없음)
    pub fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.delta();
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn reverse(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Wall,
    Dot,
    Power,
    Spawn,
}

impl Cell {
    /// 클라이언트가 사용하는 숫자 코드
    pub fn code(self) -> u8 {
        match self {
            Cell::Empty => 0,
            Cell::Wall => 1,
            Cell::Dot => 2,
            Cell::Power => 3,
            Cell::Spawn => 9,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => Cell::Wall,
            2 => Cell::Dot,
            3 => Cell::Power,
            9 => Cell::Spawn,
            _ => Cell::Empty,
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

#[rustfmt::skip]
const LAYOUT: [[u8; COLS]; ROWS] = [
    [1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1],
    [1,2,2,2,2,2,2,2,2,1,2,2,2,2,2,2,2,2,1],
    [1,3,1,1,2,1,1,1,2,1,2,1,1,1,2,1,1,3,1],
    [1,2,1,1,2,1,1,1,2,1,2,1,1,1,2,1,1,2,1],
    [1,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,1],
    [1,2,1,1,2,1,2,1,1,1,1,1,2,1,2,1,1,2,1],
    [1,2,2,2,2,1,2,2,2,1,2,2,2,1,2,2,2,2,1],
    [1,1,1,1,2,1,1,1,0,1,0,1,1,1,2,1,1,1,1],
    [0,0,0,1,2,1,0,0,0,0,0,0,0,1,2,1,0,0,0],
    [1,1,1,1,2,1,0,1,1,9,1,1,0,1,2,1,1,1,1],
    [0,2,2,2,2,0,0,1,0,0,0,1,0,0,2,2,2,2,0],
    [1,1,1,1,2,1,0,1,1,1,1,1,0,1,2,1,1,1,1],
    [0,0,0,1,2,1,0,0,0,0,0,0,0,1,2,1,0,0,0],
    [1,1,1,1,2,1,2,1,1,1,1,1,2,1,2,1,1,1,1],
    [1,2,2,2,2,2,2,2,2,1,2,2,2,2,2,2,2,2,1],
    [1,2,1,1,2,1,1,1,2,1,2,1,1,1,2,1,1,2,1],
    [1,2,2,1,2,2,2,2,2,0,2,2,2,2,2,1,2,2,1],
    [1,1,2,1,2,1,2,1,1,1,1,1,2,1,2,1,2,1,1],
    [1,3,2,2,2,1,2,2,2,1,2,2,2,1,2,2,2,3,1],
    [1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1],
    [1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1],
];

/// 미로 격자. 세션마다 독립된 사본을 가진다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Grid {
    cells: [[Cell; COLS]; ROWS],
}

static TEMPLATE: OnceLock<Grid> = OnceLock::new();

/// 공유 원본 미로
pub fn load_template() -> &'static Grid {
    TEMPLATE.get_or_init(|| {
        let mut cells = [[Cell::Empty; COLS]; ROWS];
        for (y, row) in LAYOUT.iter().enumerate() {
            for (x, code) in row.iter().enumerate() {
                cells[y][x] = Cell::from_code(*code);
            }
        }
        let grid = Grid { cells };
        tracing::debug!(
            dots = grid.count(Cell::Dot),
            power_pellets = grid.count(Cell::Power),
            "Maze template loaded"
        );
        grid
    })
}

/// 세션 전용 깊은 복사본
pub fn clone_for_session(template: &Grid) -> Grid {
    template.clone()
}

impl Grid {
    pub fn cell(&self, pos: Position) -> Option<Cell> {
        if !Self::in_bounds(pos) {
            return None;
        }
        Some(self.cells[pos.y as usize][pos.x as usize])
    }

    pub fn set(&mut self, pos: Position, cell: Cell) {
        if Self::in_bounds(pos) {
            self.cells[pos.y as usize][pos.x as usize] = cell;
        }
    }

    /// 유령 귀환 타일
    pub fn spawn_tile(&self) -> Position {
        for (y, row) in self.cells.iter().enumerate() {
            if let Some(x) = row.iter().position(|cell| *cell == Cell::Spawn) {
                return Position::new(x as i32, y as i32);
            }
        }
        Position::new(COLS as i32 / 2, ROWS as i32 / 2)
    }

    /// 목적지가 세로 범위 안이고 벽이 아니면 이동 가능. 가로 범위 밖은 터널.
    pub fn can_move(&self, from: Position, dir: Direction) -> bool {
        let next = from.step(dir);
        if next.y < 0 || next.y >= ROWS as i32 {
            return false;
        }
        if next.x < 0 || next.x >= COLS as i32 {
            return true;
        }
        self.cells[next.y as usize][next.x as usize] != Cell::Wall
    }

    pub fn count(&self, kind: Cell) -> usize {
        self.cells
            .iter()
            .flat_map(|row| row.iter())
            .filter(|cell| **cell == kind)
            .count()
    }

    fn in_bounds(pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < COLS && (pos.y as usize) < ROWS
    }
}

/// 가로 방향 텔레포트 보정
pub fn wrap(pos: Position) -> Position {
    let cols = COLS as i32;
    let x = if pos.x < 0 {
        cols - 1
    } else if pos.x >= cols {
        0
    } else {
        pos.x
    };
    Position::new(x, pos.y)
}
