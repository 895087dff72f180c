//! 클라이언트-서버 메시지 프로토콜 정의

use crate::game::{Direction, GameSnapshot};
use serde::{Deserialize, Serialize};

/// 클라이언트 → 서버 메시지
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    // Matchmaking
    JoinPair,

    // Gameplay
    Input {
        direction: Direction,
    },
    StartSingle {
        #[serde(rename = "ghostCount", default)]
        ghost_count: Option<i64>,
    },
    UpdateGhostCount {
        count: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Single,
    Pair,
}

/// 서버 → 클라이언트 메시지
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    // Session Events
    GameStart {
        mode: GameMode,
        p1: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        p2: Option<String>,
    },
    GameState(GameSnapshot),

    // Lobby Events
    Waiting,
    LobbyStats {
        online_count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Simulation;

    #[test]
    fn parses_inbound_intents() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"join_pair"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::JoinPair));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"input","direction":"LEFT"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Input {
                direction: Direction::Left
            }
        ));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"start_single"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::StartSingle { ghost_count: None }));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"start_single","ghostCount":7}"#).unwrap();
        assert!(matches!(msg, ClientMessage::StartSingle { ghost_count: Some(7) }));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"update_ghost_count","count":2}"#).unwrap();
        assert!(matches!(msg, ClientMessage::UpdateGhostCount { count: 2 }));
    }

    #[test]
    fn rejects_unknown_direction() {
        let parsed = serde_json::from_str::<ClientMessage>(r#"{"type":"input","direction":"NORTH"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn outbound_messages_are_tagged() {
        let json = serde_json::to_value(ServerMessage::GameStart {
            mode: GameMode::Single,
            p1: "alice".to_string(),
            p2: None,
        })
        .unwrap();
        assert_eq!(json["type"], "game_start");
        assert_eq!(json["mode"], "single");
        assert!(json.get("p2").is_none());

        let json = serde_json::to_value(ServerMessage::LobbyStats { online_count: 3 }).unwrap();
        assert_eq!(json["type"], "lobby_stats");
        assert_eq!(json["online_count"], 3);

        let json = serde_json::to_value(ServerMessage::Waiting).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "waiting" }));

        let snapshot = Simulation::new(&["alice"], 4).snapshot();
        let json = serde_json::to_value(ServerMessage::GameState(snapshot)).unwrap();
        assert_eq!(json["type"], "game_state");
        assert_eq!(json["score"], 0);
        assert_eq!(json["ghostCount"], 4);
    }
}
