//! 환경 변수 기반 설정 관리

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub allowed_origins: Vec<String>,
    pub game: GameConfig,
    pub auth: AuthConfig,
    pub log_level: String,
}

/// 게임 세션 설정
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub tick_ms: u64,
    pub outbound_queue: usize,
    pub keepalive_secs: u64,
    pub default_ghosts: usize,
}

impl GameConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_ms: 150,
            outbound_queue: 256,
            keepalive_secs: 50,
            default_ghosts: 4,
        }
    }
}

/// 인증 세션 설정
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    /// 개발용 사전 등록 세션 (token, nickname)
    pub dev_sessions: Vec<(String, String)>,
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let game_defaults = GameConfig::default();

        Self {
            port: parse_var("PORT", 6060),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            allowed_origins: parse_origins(env::var("ALLOWED_ORIGINS").ok().as_deref()),
            game: GameConfig {
                tick_ms: parse_var("TICK_MS", game_defaults.tick_ms),
                outbound_queue: parse_var("OUTBOUND_QUEUE", game_defaults.outbound_queue),
                keepalive_secs: parse_var("KEEPALIVE_SECS", game_defaults.keepalive_secs),
                default_ghosts: parse_var("DEFAULT_GHOSTS", game_defaults.default_ghosts),
            },
            auth: AuthConfig {
                session_ttl_secs: parse_var("SESSION_TTL_SECS", 86_400),
                cleanup_interval_secs: parse_var("SESSION_CLEANUP_SECS", 3_600),
                dev_sessions: parse_dev_sessions(&env::var("DEV_SESSIONS").unwrap_or_default()),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_origins(raw: Option<&str>) -> Vec<String> {
    let origins: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if origins.is_empty() {
        // 로컬 개발 기본값
        return [
            "http://localhost:6060",
            "http://localhost:5173",
            "http://127.0.0.1:6060",
            "http://127.0.0.1:5173",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
    }
    origins
}

fn parse_dev_sessions(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (token, nickname) = pair.trim().split_once(':')?;
            let (token, nickname) = (token.trim(), nickname.trim());
            if token.is_empty() || nickname.is_empty() {
                return None;
            }
            Some((token.to_string(), nickname.to_string()))
        })
        .collect()
}
