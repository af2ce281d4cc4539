// Bundled default monsters and the best-effort loader that seeds them.

use crate::db::{Character, Persistence};

const DEFAULT_MONSTERS_JSON: &str = include_str!("../../data/default_monsters.json");

/// Parse the bundled fixture and mark every entry as a default record.
pub fn default_monsters() -> Result<Vec<Character>, serde_json::Error> {
    let mut monsters: Vec<Character> = serde_json::from_str(DEFAULT_MONSTERS_JSON)?;
    for monster in &mut monsters {
        monster.is_default = true;
    }
    Ok(monsters)
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub monsters: Vec<Character>,
    /// Whether the store accepted the write. Not reported to HTTP callers.
    pub persisted: bool,
}

/// Seed the default monsters into the store.
///
/// A storage failure is logged and swallowed: the caller always gets the
/// in-memory set back, so a successful result does not mean the monsters
/// were saved.
pub async fn load_defaults(store: &Persistence) -> Result<LoadOutcome, serde_json::Error> {
    let monsters = default_monsters()?;

    let write = match store.database() {
        Ok(db) => db.upsert_monsters(&monsters, None).await,
        Err(e) => Err(e),
    };

    let persisted = match write {
        Ok(()) => {
            tracing::info!(count = monsters.len(), "Default monsters saved");
            true
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                count = monsters.len(),
                "Failed to save default monsters, returning them unsaved"
            );
            false
        }
    };

    Ok(LoadOutcome {
        monsters,
        persisted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use std::sync::Arc;

    #[test]
    fn test_fixture_parses_and_is_flagged() {
        let monsters = default_monsters().unwrap();
        assert!(!monsters.is_empty());
        assert!(monsters.iter().all(|m| m.is_default));
        assert!(monsters.iter().all(|m| !m.name.is_empty()));
        assert!(monsters.iter().all(|m| m.hit_points.unwrap_or(0) > 0));
        assert!(monsters.iter().any(|m| m.name == "Goblin"));
    }

    #[test]
    fn test_fixture_names_are_unique() {
        let monsters = default_monsters().unwrap();
        let mut names: Vec<&str> = monsters.iter().map(|m| m.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), monsters.len());
    }

    #[tokio::test]
    async fn test_load_defaults_persists() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let store = Persistence::Connected(db.clone());

        let outcome = load_defaults(&store).await.unwrap();
        assert!(outcome.persisted);

        let stored = db.get_all_monsters().await.unwrap();
        assert_eq!(stored.len(), outcome.monsters.len());
        assert!(stored.iter().all(|m| m.is_default));
    }

    #[tokio::test]
    async fn test_load_defaults_survives_store_failure() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        db.close().await;
        let store = Persistence::Connected(db);

        let outcome = load_defaults(&store).await.unwrap();
        assert!(!outcome.persisted);
        assert!(!outcome.monsters.is_empty());
    }

    #[tokio::test]
    async fn test_load_defaults_without_store() {
        let store = Persistence::Unavailable {
            reason: "not configured".to_string(),
        };
        let outcome = load_defaults(&store).await.unwrap();
        assert!(!outcome.persisted);
        assert_eq!(outcome.monsters.len(), default_monsters().unwrap().len());
    }
}
