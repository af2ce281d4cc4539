// Battle state helpers: defeat checks and turn labels.
//
// Pure functions over a character record and the slot it occupies. The
// arena has two primary combat slots ("player1", "player2"); every other
// slot id is a support role.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::db::Character;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerSlot {
    Player1,
    Player2,
    Support(String),
}

impl PlayerSlot {
    pub fn parse(player_id: &str) -> Self {
        match player_id {
            "player1" => PlayerSlot::Player1,
            "player2" => PlayerSlot::Player2,
            other => PlayerSlot::Support(other.to_string()),
        }
    }

    pub fn is_primary(&self) -> bool {
        !matches!(self, PlayerSlot::Support(_))
    }
}

/// Whether the player in `player_id` is out of the fight.
///
/// A primary slot is defeated when it is the explicitly recorded loser.
/// Any slot is defeated at zero or fewer hit points; a missing character or
/// missing hit points count as zero.
pub fn is_player_defeated(
    character: Option<&Character>,
    explicitly_defeated: Option<&str>,
    player_id: &str,
) -> bool {
    let explicit = PlayerSlot::parse(player_id).is_primary()
        && explicitly_defeated == Some(player_id);
    let hit_points = character.and_then(|c| c.hit_points).unwrap_or(0);
    explicit || hit_points <= 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnLabel {
    #[serde(rename = "YOUR TURN")]
    YourTurn,
    #[serde(rename = "ENEMY TURN")]
    EnemyTurn,
}

impl fmt::Display for TurnLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnLabel::YourTurn => f.write_str("YOUR TURN"),
            TurnLabel::EnemyTurn => f.write_str("ENEMY TURN"),
        }
    }
}

/// Only the second primary slot, when controlled by the opponent, shows
/// the enemy label.
pub fn turn_label(player_id: &str, is_opponent: bool) -> TurnLabel {
    if is_opponent && PlayerSlot::parse(player_id) == PlayerSlot::Player2 {
        TurnLabel::EnemyTurn
    } else {
        TurnLabel::YourTurn
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combatant {
    pub player_id: String,
    #[serde(default)]
    pub is_opponent: bool,
    #[serde(default)]
    pub character: Option<Character>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatantStatus {
    pub player_id: String,
    pub defeated: bool,
    pub turn_label: TurnLabel,
}

pub fn battle_status(defeated_player: Option<&str>, combatants: &[Combatant]) -> Vec<CombatantStatus> {
    combatants
        .iter()
        .map(|c| CombatantStatus {
            player_id: c.player_id.clone(),
            defeated: is_player_defeated(c.character.as_ref(), defeated_player, &c.player_id),
            turn_label: turn_label(&c.player_id, c.is_opponent),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_hp(hp: Option<i64>) -> Character {
        Character {
            name: "Test".to_string(),
            hit_points: hp,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_or_negative_hp_always_defeated() {
        for hp in [0, -1, -50] {
            let c = with_hp(Some(hp));
            for slot in ["player1", "player2", "support1"] {
                assert!(is_player_defeated(Some(&c), None, slot));
                assert!(is_player_defeated(Some(&c), Some("player1"), slot));
            }
        }
    }

    #[test]
    fn test_missing_hp_counts_as_zero() {
        assert!(is_player_defeated(Some(&with_hp(None)), None, "player1"));
        assert!(is_player_defeated(None, None, "player2"));
    }

    #[test]
    fn test_healthy_player_not_defeated() {
        let c = with_hp(Some(10));
        assert!(!is_player_defeated(Some(&c), None, "player1"));
        assert!(!is_player_defeated(Some(&c), Some("player2"), "player1"));
        assert!(!is_player_defeated(Some(&c), Some("player1"), "support1"));
    }

    #[test]
    fn test_explicit_defeat_on_primary_slots() {
        let c = with_hp(Some(10));
        assert!(is_player_defeated(Some(&c), Some("player1"), "player1"));
        assert!(is_player_defeated(Some(&c), Some("player2"), "player2"));
    }

    #[test]
    fn test_support_slot_ignores_explicit_defeat() {
        let c = with_hp(Some(10));
        assert!(!is_player_defeated(Some(&c), Some("support1"), "support1"));
    }

    #[test]
    fn test_turn_label() {
        assert_eq!(turn_label("player2", true), TurnLabel::EnemyTurn);
        assert_eq!(turn_label("player2", false), TurnLabel::YourTurn);
        assert_eq!(turn_label("player1", true), TurnLabel::YourTurn);
        assert_eq!(turn_label("player1", false), TurnLabel::YourTurn);
        assert_eq!(turn_label("support1", true), TurnLabel::YourTurn);
        assert_eq!(TurnLabel::EnemyTurn.to_string(), "ENEMY TURN");
        assert_eq!(
            serde_json::to_value(TurnLabel::YourTurn).unwrap(),
            serde_json::json!("YOUR TURN")
        );
    }

    #[test]
    fn test_battle_status() {
        let combatants = vec![
            Combatant {
                player_id: "player1".to_string(),
                is_opponent: false,
                character: Some(with_hp(Some(12))),
            },
            Combatant {
                player_id: "player2".to_string(),
                is_opponent: true,
                character: Some(with_hp(Some(3))),
            },
        ];
        let status = battle_status(Some("player2"), &combatants);
        assert_eq!(status.len(), 2);
        assert!(!status[0].defeated);
        assert_eq!(status[0].turn_label, TurnLabel::YourTurn);
        assert!(status[1].defeated);
        assert_eq!(status[1].turn_label, TurnLabel::EnemyTurn);
    }
}
