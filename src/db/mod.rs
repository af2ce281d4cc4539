// Persistence gateway for heroes and monsters (SQLite via sqlx).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

// ── Records ──────────────────────────────────────────────────────────

/// Which roster a character belongs to. Names are unique per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterKind {
    Hero,
    Monster,
}

impl CharacterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CharacterKind::Hero => "hero",
            CharacterKind::Monster => "monster",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ability {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<String>,
}

/// A hero or monster as stored and as sent over the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    /// Natural key. Defaults to empty so handlers can reject it explicitly.
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub hit_points: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub armor_class: Option<i64>,
    #[serde(default)]
    pub abilities: Vec<Ability>,
    /// Name of the asset directory holding this monster's image. Blank
    /// values read as unset.
    #[serde(
        default,
        deserialize_with = "non_blank",
        skip_serializing_if = "Option::is_none"
    )]
    pub monster_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "non_blank",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

fn non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

#[derive(Debug, sqlx::FromRow)]
struct CharacterRow {
    name: String,
    description: Option<String>,
    hit_points: Option<i64>,
    armor_class: Option<i64>,
    abilities: String,
    monster_id: Option<String>,
    image_url: Option<String>,
    is_default: bool,
}

impl TryFrom<CharacterRow> for Character {
    type Error = StoreError;

    fn try_from(row: CharacterRow) -> Result<Self, Self::Error> {
        let abilities = serde_json::from_str(&row.abilities).map_err(|source| {
            StoreError::Corrupt {
                name: row.name.clone(),
                source,
            }
        })?;
        Ok(Character {
            name: row.name,
            description: row.description,
            hit_points: row.hit_points,
            armor_class: row.armor_class,
            abilities,
            monster_id: row.monster_id.filter(|v| !v.trim().is_empty()),
            image_url: row.image_url.filter(|v| !v.trim().is_empty()),
            is_default: row.is_default,
        })
    }
}

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Could not encode abilities: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Stored abilities for {name} are not valid JSON: {source}")]
    Corrupt {
        name: String,
        source: serde_json::Error,
    },

    #[error("Persistence unavailable: {0}")]
    Unavailable(String),
}

// ── Gateway ──────────────────────────────────────────────────────────

const SELECT_COLUMNS: &str = "SELECT name, description, hit_points, armor_class, abilities, \
     monster_id, image_url, is_default FROM characters";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = if database_url.contains(":memory:") {
            // Every connection to `:memory:` opens its own empty database,
            // so keep exactly one alive for the life of the pool.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                hit_points INTEGER,
                armor_class INTEGER,
                abilities TEXT NOT NULL DEFAULT '[]',
                monster_id TEXT,
                image_url TEXT,
                is_default INTEGER NOT NULL DEFAULT 0,
                search_context TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(kind, name)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close the pool. Later calls fail with `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub async fn get_all_heroes(&self) -> Result<Vec<Character>, StoreError> {
        self.list(CharacterKind::Hero).await
    }

    pub async fn get_all_monsters(&self) -> Result<Vec<Character>, StoreError> {
        self.list(CharacterKind::Monster).await
    }

    async fn list(&self, kind: CharacterKind) -> Result<Vec<Character>, StoreError> {
        let rows = sqlx::query_as::<_, CharacterRow>(&format!(
            "{SELECT_COLUMNS} WHERE kind = ? ORDER BY id"
        ))
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Character::try_from).collect()
    }

    // ── Upserts ───────────────────────────────────────────────────────

    pub async fn upsert_hero(
        &self,
        hero: &Character,
        search_context: Option<&str>,
    ) -> Result<(), StoreError> {
        self.upsert(CharacterKind::Hero, std::slice::from_ref(hero), search_context)
            .await
    }

    pub async fn upsert_heroes(
        &self,
        heroes: &[Character],
        search_context: Option<&str>,
    ) -> Result<(), StoreError> {
        self.upsert(CharacterKind::Hero, heroes, search_context).await
    }

    pub async fn upsert_monster(
        &self,
        monster: &Character,
        search_context: Option<&str>,
    ) -> Result<(), StoreError> {
        self.upsert(
            CharacterKind::Monster,
            std::slice::from_ref(monster),
            search_context,
        )
        .await
    }

    pub async fn upsert_monsters(
        &self,
        monsters: &[Character],
        search_context: Option<&str>,
    ) -> Result<(), StoreError> {
        self.upsert(CharacterKind::Monster, monsters, search_context)
            .await
    }

    /// Insert or fully replace each record by name, all-or-nothing.
    async fn upsert(
        &self,
        kind: CharacterKind,
        records: &[Character],
        search_context: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            let abilities = serde_json::to_string(&record.abilities)?;
            sqlx::query(
                r#"
                INSERT INTO characters
                    (kind, name, description, hit_points, armor_class, abilities,
                     monster_id, image_url, is_default, search_context)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(kind, name) DO UPDATE SET
                    description = excluded.description,
                    hit_points = excluded.hit_points,
                    armor_class = excluded.armor_class,
                    abilities = excluded.abilities,
                    monster_id = excluded.monster_id,
                    image_url = excluded.image_url,
                    is_default = excluded.is_default,
                    search_context = excluded.search_context,
                    updated_at = datetime('now')
            "#,
            )
            .bind(kind.as_str())
            .bind(&record.name)
            .bind(&record.description)
            .bind(record.hit_points)
            .bind(record.armor_class)
            .bind(abilities)
            .bind(&record.monster_id)
            .bind(&record.image_url)
            .bind(record.is_default)
            .bind(search_context)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Set the image reference of one monster. Returns false if no monster
    /// has that name.
    pub async fn update_monster_image(
        &self,
        name: &str,
        monster_id: &str,
        image_url: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE characters SET monster_id = ?, image_url = ?, updated_at = datetime('now') \
             WHERE kind = 'monster' AND name = ?",
        )
        .bind(monster_id)
        .bind(image_url)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// The store as seen by handlers: either a live database or the reason it
/// could not be opened.
#[derive(Clone)]
pub enum Persistence {
    Connected(Arc<Database>),
    Unavailable { reason: String },
}

impl Persistence {
    /// Open the database, recording a failure instead of aborting startup.
    pub async fn connect(database_url: &str) -> Self {
        match Database::new(database_url).await {
            Ok(db) => Persistence::Connected(Arc::new(db)),
            Err(e) => {
                tracing::error!(error = %e, "Database unavailable, continuing without persistence");
                Persistence::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn database(&self) -> Result<&Database, StoreError> {
        match self {
            Persistence::Connected(db) => Ok(db.as_ref()),
            Persistence::Unavailable { reason } => Err(StoreError::Unavailable(reason.clone())),
        }
    }
}
