//! SQLite-backed user and guild state
//!
//! Information Hiding:
//! - Schema creation and column migrations run on open
//! - Discord ids are u64 outside, INTEGER (i64) inside
//! - Channel lists are stored as JSON arrays of integers
//!
//! A `SqliteStore` owns one synchronous connection. Async callers reach it
//! through `crate::actors::StoreHandle`, which serializes every call onto a
//! dedicated thread.

use super::{StoreError, StoreResult};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS user_facts (
    fact_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    fact_text TEXT NOT NULL,
    added_by_id INTEGER NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_user_facts_user ON user_facts (user_id);

CREATE TABLE IF NOT EXISTS user_sentiment (
    user_id INTEGER PRIMARY KEY,
    sentiment_score REAL NOT NULL DEFAULT 0.0,
    last_updated DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS oauth_users (
    user_id INTEGER PRIMARY KEY,
    access_token TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS server_configs (
    guild_id INTEGER PRIMARY KEY,
    autonomy_channels TEXT,
    restricted_channels TEXT
);
"#;

/// Columns added to `server_configs` after the first release.
const SERVER_CONFIG_MIGRATIONS: &[(&str, &str)] = &[
    ("verified_role_id", "INTEGER"),
    ("unverified_role_id", "INTEGER"),
];

/// The fixed set of per-guild settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    AutonomyChannels,
    RestrictedChannels,
    VerifiedRole,
    UnverifiedRole,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 4] = [
        ConfigKey::AutonomyChannels,
        ConfigKey::RestrictedChannels,
        ConfigKey::VerifiedRole,
        ConfigKey::UnverifiedRole,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            ConfigKey::AutonomyChannels => "autonomy_channels",
            ConfigKey::RestrictedChannels => "restricted_channels",
            ConfigKey::VerifiedRole => "verified_role_id",
            ConfigKey::UnverifiedRole => "unverified_role_id",
        }
    }

    pub fn is_channel_list(&self) -> bool {
        matches!(
            self,
            ConfigKey::AutonomyChannels | ConfigKey::RestrictedChannels
        )
    }

    fn unset(&self) -> ConfigValue {
        if self.is_channel_list() {
            ConfigValue::Channels(Vec::new())
        } else {
            ConfigValue::Role(None)
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for ConfigKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.column() == s)
            .ok_or_else(|| StoreError::UnknownKey(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Channels(Vec<u64>),
    Role(Option<u64>),
}

impl ConfigValue {
    pub fn channels(&self) -> &[u64] {
        match self {
            ConfigValue::Channels(ids) => ids,
            ConfigValue::Role(_) => &[],
        }
    }

    pub fn role(&self) -> Option<u64> {
        match self {
            ConfigValue::Role(id) => *id,
            ConfigValue::Channels(_) => None,
        }
    }
}

/// One guild's full configuration row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildConfig {
    pub guild_id: u64,
    pub autonomy_channels: Vec<u64>,
    pub restricted_channels: Vec<u64>,
    pub verified_role_id: Option<u64>,
    pub unverified_role_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
}

// Discord snowflakes stay well below 2^63.
fn sql_id(id: u64) -> i64 {
    id as i64
}

fn decode_channels(raw: Option<String>) -> StoreResult<Vec<u64>> {
    match raw {
        Some(text) if !text.trim().is_empty() => Ok(serde_json::from_str(&text)?),
        _ => Ok(Vec::new()),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.migrate()?;
        tracing::info!("[SqliteStore] Database initialized at {:?}", path);
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> StoreResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.ensure_columns("server_configs", SERVER_CONFIG_MIGRATIONS)
    }

    fn ensure_columns(&self, table: &str, columns: &[(&str, &str)]) -> StoreResult<()> {
        let existing: Vec<String> = {
            let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", table))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
            rows.collect::<Result<_, _>>()?
        };

        for (name, sql_type) in columns {
            if !existing.iter().any(|c| c == name) {
                tracing::info!(
                    "[SqliteStore] Schema migration: adding column '{}' to '{}'",
                    name,
                    table
                );
                self.conn.execute(
                    &format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, sql_type),
                    [],
                )?;
            }
        }
        Ok(())
    }

    // --- Sentiment ---

    /// Adds `delta` to the user's score, creating the row at 0.0 first if
    /// needed. Returns the new score.
    pub fn adjust_sentiment(&self, user_id: u64, delta: f64) -> StoreResult<f64> {
        let score = self.conn.query_row(
            "INSERT INTO user_sentiment (user_id, sentiment_score, last_updated)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(user_id) DO UPDATE SET
                 sentiment_score = sentiment_score + excluded.sentiment_score,
                 last_updated = CURRENT_TIMESTAMP
             RETURNING sentiment_score",
            params![sql_id(user_id), delta],
            |row| row.get(0),
        )?;
        tracing::info!(
            "[SqliteStore] Updated sentiment for user {} by {:.2}. New score: {:.2}",
            user_id,
            delta,
            score
        );
        Ok(score)
    }

    pub fn read_sentiment(&self, user_id: u64) -> StoreResult<f64> {
        let score = self
            .conn
            .query_row(
                "SELECT sentiment_score FROM user_sentiment WHERE user_id = ?1",
                params![sql_id(user_id)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(score.unwrap_or(0.0))
    }

    // --- Facts ---

    pub fn add_fact(&self, user_id: u64, text: &str, added_by: u64) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO user_facts (user_id, fact_text, added_by_id) VALUES (?1, ?2, ?3)",
            params![sql_id(user_id), text, sql_id(added_by)],
        )?;
        tracing::info!("[SqliteStore] Added fact for user {}: '{}'", user_id, text);
        Ok(self.conn.last_insert_rowid())
    }

    /// Newest first. Facts added within the same second are ordered by id.
    pub fn list_facts(&self, user_id: u64, limit: usize) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT fact_text FROM user_facts WHERE user_id = ?1
             ORDER BY timestamp DESC, fact_id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![sql_id(user_id), limit as i64], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    // --- Guild configuration ---

    pub fn get_config(&self, guild_id: u64, key: ConfigKey) -> StoreResult<ConfigValue> {
        let sql = format!(
            "SELECT {} FROM server_configs WHERE guild_id = ?1",
            key.column()
        );
        let raw: Option<SqlValue> = self
            .conn
            .query_row(&sql, params![sql_id(guild_id)], |row| row.get(0))
            .optional()?;

        match (key.is_channel_list(), raw) {
            (_, None) | (_, Some(SqlValue::Null)) => Ok(key.unset()),
            (true, Some(SqlValue::Text(text))) => {
                Ok(ConfigValue::Channels(decode_channels(Some(text))?))
            }
            (false, Some(SqlValue::Integer(id))) => Ok(ConfigValue::Role(Some(id as u64))),
            (_, Some(other)) => {
                tracing::warn!(
                    "[SqliteStore] Unexpected value {:?} in {} for guild {}",
                    other,
                    key,
                    guild_id
                );
                Ok(key.unset())
            }
        }
    }

    /// Creates the guild row if needed and updates only `key`.
    pub fn set_config(&self, guild_id: u64, key: ConfigKey, value: ConfigValue) -> StoreResult<()> {
        let sql_value = match (&value, key.is_channel_list()) {
            (ConfigValue::Channels(ids), true) => SqlValue::Text(serde_json::to_string(ids)?),
            (ConfigValue::Role(Some(id)), false) => SqlValue::Integer(sql_id(*id)),
            (ConfigValue::Role(None), false) => SqlValue::Null,
            _ => return Err(StoreError::ValueMismatch { key, value }),
        };

        let column = key.column();
        let sql = format!(
            "INSERT INTO server_configs (guild_id, {column}) VALUES (?1, ?2)
             ON CONFLICT(guild_id) DO UPDATE SET {column} = excluded.{column}"
        );
        self.conn.execute(&sql, params![sql_id(guild_id), sql_value])?;
        tracing::info!(
            "[SqliteStore] Updated server config for guild {}: set {} to {:?}",
            guild_id,
            key,
            value
        );
        Ok(())
    }

    /// Adds `channel_id` to a channel-list key. Returns false if it was
    /// already present.
    pub fn add_channel(&self, guild_id: u64, key: ConfigKey, channel_id: u64) -> StoreResult<bool> {
        let mut channels = self.channel_list(guild_id, key)?;
        if channels.contains(&channel_id) {
            return Ok(false);
        }
        channels.push(channel_id);
        self.set_config(guild_id, key, ConfigValue::Channels(channels))?;
        Ok(true)
    }

    /// Removes `channel_id` from a channel-list key. Returns false if it was
    /// not present.
    pub fn remove_channel(
        &self,
        guild_id: u64,
        key: ConfigKey,
        channel_id: u64,
    ) -> StoreResult<bool> {
        let mut channels = self.channel_list(guild_id, key)?;
        let before = channels.len();
        channels.retain(|id| *id != channel_id);
        if channels.len() == before {
            return Ok(false);
        }
        self.set_config(guild_id, key, ConfigValue::Channels(channels))?;
        Ok(true)
    }

    fn channel_list(&self, guild_id: u64, key: ConfigKey) -> StoreResult<Vec<u64>> {
        match self.get_config(guild_id, key)? {
            ConfigValue::Channels(ids) => Ok(ids),
            value => Err(StoreError::ValueMismatch { key, value }),
        }
    }

    pub fn guild_config(&self, guild_id: u64) -> StoreResult<GuildConfig> {
        let row = self
            .conn
            .query_row(
                "SELECT autonomy_channels, restricted_channels, verified_role_id, unverified_role_id
                 FROM server_configs WHERE guild_id = ?1",
                params![sql_id(guild_id)],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((autonomy, restricted, verified, unverified)) = row else {
            return Ok(GuildConfig {
                guild_id,
                ..GuildConfig::default()
            });
        };

        Ok(GuildConfig {
            guild_id,
            autonomy_channels: decode_channels(autonomy)?,
            restricted_channels: decode_channels(restricted)?,
            verified_role_id: verified.map(|id| id as u64),
            unverified_role_id: unverified.map(|id| id as u64),
        })
    }

    pub fn guilds_with_autonomy(&self) -> StoreResult<Vec<u64>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT guild_id FROM server_configs
             WHERE autonomy_channels IS NOT NULL AND autonomy_channels != '[]'
             ORDER BY guild_id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        Ok(rows
            .map(|id| id.map(|id| id as u64))
            .collect::<Result<_, _>>()?)
    }

    // --- OAuth tokens ---

    pub fn store_tokens(
        &self,
        user_id: u64,
        access_token: &str,
        refresh_token: &str,
        expires_in_secs: i64,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO oauth_users (user_id, access_token, refresh_token, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 expires_at = excluded.expires_at",
            params![
                sql_id(user_id),
                access_token,
                refresh_token,
                unix_now() + expires_in_secs
            ],
        )?;
        tracing::info!("[SqliteStore] Stored OAuth tokens for user {}", user_id);
        Ok(())
    }

    pub fn tokens(&self, user_id: u64) -> StoreResult<Option<OAuthTokens>> {
        Ok(self
            .conn
            .query_row(
                "SELECT access_token, refresh_token, expires_at FROM oauth_users WHERE user_id = ?1",
                params![sql_id(user_id)],
                |row| {
                    Ok(OAuthTokens {
                        access_token: row.get(0)?,
                        refresh_token: row.get(1)?,
                        expires_at: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn delete_tokens(&self, user_id: u64) -> StoreResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM oauth_users WHERE user_id = ?1",
            params![sql_id(user_id)],
        )?;
        if removed > 0 {
            tracing::info!("[SqliteStore] Deleted OAuth tokens for user {}", user_id);
        }
        Ok(removed > 0)
    }

    pub fn authorized_users(&self) -> StoreResult<Vec<u64>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT user_id FROM oauth_users ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        Ok(rows
            .map(|id| id.map(|id| id as u64))
            .collect::<Result<_, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_sentiment_accumulates() {
        let store = store();
        store.adjust_sentiment(1, 1.0).unwrap();
        let score = store.adjust_sentiment(1, -0.3).unwrap();

        assert!((score - 0.7).abs() < 1e-9);
        assert!((store.read_sentiment(1).unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_user_reads_zero() {
        assert_eq!(store().read_sentiment(12345).unwrap(), 0.0);
    }

    #[test]
    fn test_sentiment_is_unbounded() {
        let store = store();
        for _ in 0..20 {
            store.adjust_sentiment(3, -1.0).unwrap();
        }
        assert_eq!(store.read_sentiment(3).unwrap(), -20.0);
    }

    #[test]
    fn test_facts_newest_first_and_limited() {
        let store = store();
        store.add_fact(7, "likes tea", 1).unwrap();
        store.add_fact(7, "has a cat named Whiskers", 1).unwrap();
        store.add_fact(7, "works as a software engineer", 2).unwrap();
        store.add_fact(8, "someone else", 1).unwrap();

        let facts = store.list_facts(7, 5).unwrap();
        assert_eq!(
            facts,
            vec![
                "works as a software engineer",
                "has a cat named Whiskers",
                "likes tea"
            ]
        );

        let limited = store.list_facts(7, 2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0], "works as a software engineer");

        assert!(store.list_facts(9, 5).unwrap().is_empty());
    }

    #[test]
    fn test_config_channel_round_trip() {
        let store = store();
        store
            .set_config(10, ConfigKey::RestrictedChannels, ConfigValue::Channels(vec![1, 2]))
            .unwrap();

        assert_eq!(
            store.get_config(10, ConfigKey::RestrictedChannels).unwrap(),
            ConfigValue::Channels(vec![1, 2])
        );
    }

    #[test]
    fn test_unset_config_reads_empty() {
        let store = store();
        assert_eq!(
            store.get_config(10, ConfigKey::AutonomyChannels).unwrap(),
            ConfigValue::Channels(vec![])
        );
        assert_eq!(
            store.get_config(10, ConfigKey::VerifiedRole).unwrap(),
            ConfigValue::Role(None)
        );

        // Row exists, other column still unset
        store
            .set_config(10, ConfigKey::VerifiedRole, ConfigValue::Role(Some(55)))
            .unwrap();
        assert_eq!(
            store.get_config(10, ConfigKey::AutonomyChannels).unwrap(),
            ConfigValue::Channels(vec![])
        );
    }

    #[test]
    fn test_set_config_leaves_other_fields() {
        let store = store();
        store
            .set_config(10, ConfigKey::AutonomyChannels, ConfigValue::Channels(vec![5]))
            .unwrap();
        store
            .set_config(10, ConfigKey::UnverifiedRole, ConfigValue::Role(Some(77)))
            .unwrap();
        store
            .set_config(10, ConfigKey::VerifiedRole, ConfigValue::Role(Some(66)))
            .unwrap();

        let config = store.guild_config(10).unwrap();
        assert_eq!(
            config,
            GuildConfig {
                guild_id: 10,
                autonomy_channels: vec![5],
                restricted_channels: vec![],
                verified_role_id: Some(66),
                unverified_role_id: Some(77),
            }
        );
    }

    #[test]
    fn test_set_config_rejects_wrong_shape() {
        let store = store();
        let result = store.set_config(10, ConfigKey::VerifiedRole, ConfigValue::Channels(vec![1]));
        assert!(matches!(result, Err(StoreError::ValueMismatch { .. })));
    }

    #[test]
    fn test_config_key_parsing() {
        assert_eq!(
            "restricted_channels".parse::<ConfigKey>().unwrap(),
            ConfigKey::RestrictedChannels
        );
        assert!(matches!(
            "guild_id; DROP TABLE".parse::<ConfigKey>(),
            Err(StoreError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_add_and_remove_channel() {
        let store = store();
        assert!(store.add_channel(1, ConfigKey::AutonomyChannels, 100).unwrap());
        assert!(!store.add_channel(1, ConfigKey::AutonomyChannels, 100).unwrap());
        assert!(store.add_channel(1, ConfigKey::AutonomyChannels, 200).unwrap());

        assert!(store.remove_channel(1, ConfigKey::AutonomyChannels, 100).unwrap());
        assert!(!store.remove_channel(1, ConfigKey::AutonomyChannels, 100).unwrap());

        assert_eq!(
            store.guild_config(1).unwrap().autonomy_channels,
            vec![200]
        );
    }

    #[test]
    fn test_guilds_with_autonomy_skips_empty_lists() {
        let store = store();
        store.add_channel(1, ConfigKey::AutonomyChannels, 100).unwrap();
        store.add_channel(2, ConfigKey::AutonomyChannels, 200).unwrap();
        store.remove_channel(2, ConfigKey::AutonomyChannels, 200).unwrap();
        store.add_channel(3, ConfigKey::RestrictedChannels, 300).unwrap();

        assert_eq!(store.guilds_with_autonomy().unwrap(), vec![1]);
    }

    #[test]
    fn test_oauth_tokens_upsert_and_delete() {
        let store = store();
        store.store_tokens(4, "access-1", "refresh-1", 3600).unwrap();
        store.store_tokens(4, "access-2", "refresh-2", 3600).unwrap();

        let tokens = store.tokens(4).unwrap().unwrap();
        assert_eq!(tokens.access_token, "access-2");
        assert_eq!(tokens.refresh_token, "refresh-2");
        assert!(tokens.expires_at > unix_now());
        assert_eq!(store.authorized_users().unwrap(), vec![4]);

        assert!(store.delete_tokens(4).unwrap());
        assert!(store.tokens(4).unwrap().is_none());
        assert!(!store.delete_tokens(4).unwrap());
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("bot_memory.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.adjust_sentiment(1, 2.5).unwrap();
            store.add_fact(1, "likes tea", 9).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.read_sentiment(1).unwrap(), 2.5);
        assert_eq!(store.list_facts(1, 5).unwrap(), vec!["likes tea"]);
    }

    #[test]
    fn test_migrates_old_server_config_table() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("old.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE server_configs (
                    guild_id INTEGER PRIMARY KEY,
                    autonomy_channels TEXT,
                    restricted_channels TEXT
                );
                INSERT INTO server_configs (guild_id, autonomy_channels) VALUES (1, '[9]');",
            )
            .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        store
            .set_config(1, ConfigKey::VerifiedRole, ConfigValue::Role(Some(3)))
            .unwrap();

        let config = store.guild_config(1).unwrap();
        assert_eq!(config.autonomy_channels, vec![9]);
        assert_eq!(config.verified_role_id, Some(3));
    }
}
