//! Session configuration.

use std::time::Duration;

use chess_core::Color;
use serde::{Deserialize, Serialize};

/// Who plays against whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    /// Human against the move priority policy.
    #[serde(rename = "ai")]
    HumanVsPolicy,
    /// Two humans sharing the board.
    #[serde(rename = "pvp")]
    HumanVsHuman,
}

/// How the opponent policy picks among legal moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Uniformly random legal move.
    Random,
    /// Queen promotions first, then captures, then anything.
    #[default]
    Easy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub mode: GameMode,

    /// Side the human plays in `HumanVsPolicy` mode.
    #[serde(with = "color_tag")]
    pub human_side: Color,

    pub difficulty: Difficulty,

    /// Pause before the opponent's move is applied, in milliseconds
    pub opponent_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::HumanVsPolicy,
            human_side: Color::White,
            difficulty: Difficulty::Easy,
            opponent_delay_ms: 500,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn opponent_delay(&self) -> Duration {
        Duration::from_millis(self.opponent_delay_ms)
    }

    /// The side the policy plays, if any.
    pub fn policy_side(&self) -> Option<Color> {
        match self.mode {
            GameMode::HumanVsPolicy => Some(self.human_side.other()),
            GameMode::HumanVsHuman => None,
        }
    }
}

/// Serialize a color as its FEN letter ("w" / "b").
pub(crate) mod color_tag {
    use chess_core::Color;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(color: &Color, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match color {
            Color::White => "w",
            Color::Black => "b",
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
        let tag = String::deserialize(deserializer)?;
        match tag.as_str() {
            "w" | "white" => Ok(Color::White),
            "b" | "black" => Ok(Color::Black),
            other => Err(de::Error::custom(format!("unknown side '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.mode, GameMode::HumanVsPolicy);
        assert_eq!(config.human_side, Color::White);
        assert_eq!(config.policy_side(), Some(Color::Black));
        assert_eq!(config.opponent_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SessionConfig::from_json(r#"{"mode":"pvp","opponentDelayMs":0}"#).unwrap();
        assert_eq!(config.mode, GameMode::HumanVsHuman);
        assert_eq!(config.policy_side(), None);
        assert_eq!(config.opponent_delay_ms, 0);
        assert_eq!(config.difficulty, Difficulty::Easy);
    }

    #[test]
    fn test_human_side_tag() {
        let config = SessionConfig::from_json(r#"{"humanSide":"b"}"#).unwrap();
        assert_eq!(config.human_side, Color::Black);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""humanSide":"b""#));
        assert!(SessionConfig::from_json(r#"{"humanSide":"x"}"#).is_err());
    }
}
