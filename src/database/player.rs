use std::sync::Arc;

use rusqlite::{params, OptionalExtension, Row};
use tracing::{error, info, warn};

use super::{is_unique_violation, DatabaseManager};

/// A per-account, per-kingdom profile. At most one row per
/// (account, kingdom) pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerData {
    pub id: i64,
    pub account_id: i64,
    pub kingdom_id: i32,
    pub pos_x: f32,
    pub pos_y: f32,
    pub food: i32,
    pub wood: i32,
    pub stone: i32,
    pub gold: i32,
}

impl PlayerData {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            kingdom_id: row.get(2)?,
            pos_x: row.get::<_, f64>(3)? as f32,
            pos_y: row.get::<_, f64>(4)? as f32,
            food: row.get(5)?,
            wood: row.get(6)?,
            stone: row.get(7)?,
            gold: row.get(8)?,
        })
    }
}

/// Asynchronous player-profile store. Same callback contract as
/// [`AccountRepository`](super::AccountRepository).
#[derive(Clone)]
pub struct PlayerRepository {
    db: Arc<DatabaseManager>,
}

impl PlayerRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub fn get_by_account_and_kingdom(
        &self,
        account_id: i64,
        kingdom_id: i32,
        callback: impl FnOnce(Option<PlayerData>) + Send + 'static,
    ) {
        self.db.enqueue(move |conn| {
            let result = conn
                .query_row(
                    "SELECT id, account_id, kingdom_id, pos_x, pos_y, food, wood, stone, gold \
                     FROM player_data WHERE account_id = ?1 AND kingdom_id = ?2",
                    params![account_id, kingdom_id],
                    PlayerData::from_row,
                )
                .optional();

            match result {
                Ok(data) => callback(data),
                Err(e) => {
                    error!(account_id, kingdom_id, "player lookup failed: {e}");
                    callback(None);
                }
            }
        });
    }

    /// Creates the profile for a first join, populated with the starting
    /// position and resources.
    pub fn create(
        &self,
        account_id: i64,
        kingdom_id: i32,
        callback: impl FnOnce(Option<PlayerData>) + Send + 'static,
    ) {
        self.db.enqueue(move |conn| {
            let result = (|| -> rusqlite::Result<PlayerData> {
                let tx = conn.transaction()?;

                tx.execute(
                    "INSERT INTO player_data (account_id, kingdom_id) VALUES (?1, ?2)",
                    params![account_id, kingdom_id],
                )?;
                let id = tx.last_insert_rowid();

                let data = tx.query_row(
                    "SELECT id, account_id, kingdom_id, pos_x, pos_y, food, wood, stone, gold \
                     FROM player_data WHERE id = ?1",
                    params![id],
                    PlayerData::from_row,
                )?;

                tx.commit()?;
                Ok(data)
            })();

            match result {
                Ok(data) => {
                    info!(account_id, kingdom_id, profile_id = data.id, "player profile created");
                    callback(Some(data));
                }
                Err(e) => {
                    if is_unique_violation(&e) {
                        warn!(account_id, kingdom_id, "player profile creation failed: {e}");
                    } else {
                        error!(account_id, kingdom_id, "player profile creation failed: {e}");
                    }
                    callback(None);
                }
            }
        });
    }

    /// Fire-and-forget resource save keyed by (account, kingdom).
    pub fn update_resources(
        &self,
        account_id: i64,
        kingdom_id: i32,
        food: i32,
        wood: i32,
        stone: i32,
        gold: i32,
    ) {
        self.db.enqueue(move |conn| {
            if let Err(e) = conn.execute(
                "UPDATE player_data SET food = ?1, wood = ?2, stone = ?3, gold = ?4 \
                 WHERE account_id = ?5 AND kingdom_id = ?6",
                params![food, wood, stone, gold, account_id, kingdom_id],
            ) {
                error!(account_id, kingdom_id, "failed to save resources: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::test_util::wait_for;
    use super::*;
    use crate::database::DatabaseManager;

    fn repo() -> (tempfile::TempDir, PlayerRepository) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("players.db");
        let db = DatabaseManager::open(path.to_str().unwrap()).unwrap();
        (dir, PlayerRepository::new(Arc::clone(&db)))
    }

    #[test]
    fn create_populates_defaults() {
        let (_dir, repo) = repo();

        let data = wait_for(|cb| repo.create(1, 1, cb)).unwrap();
        assert_eq!(data.account_id, 1);
        assert_eq!(data.kingdom_id, 1);
        assert_eq!(data.pos_x, 0.0);
        assert_eq!(data.pos_y, 0.0);
        assert_eq!(
            (data.food, data.wood, data.stone, data.gold),
            (500, 500, 200, 100)
        );
    }

    #[test]
    fn at_most_one_profile_per_account_and_kingdom() {
        let (_dir, repo) = repo();

        assert!(wait_for(|cb| repo.create(1, 1, cb)).is_some());
        assert!(wait_for(|cb| repo.create(1, 1, cb)).is_none());

        // Same account in another kingdom is a separate profile.
        assert!(wait_for(|cb| repo.create(1, 2, cb)).is_some());
    }

    #[test]
    fn lookup_misses_then_hits() {
        let (_dir, repo) = repo();

        assert!(wait_for(|cb| repo.get_by_account_and_kingdom(1, 1, cb)).is_none());

        let created = wait_for(|cb| repo.create(1, 1, cb)).unwrap();
        let found = wait_for(|cb| repo.get_by_account_and_kingdom(1, 1, cb)).unwrap();
        assert_eq!(found, created);
    }

    #[test]
    fn resource_update_is_applied() {
        let (_dir, repo) = repo();

        wait_for(|cb| repo.create(1, 1, cb)).unwrap();
        repo.update_resources(1, 1, 700, 500, 200, 100);

        let found = wait_for(|cb| repo.get_by_account_and_kingdom(1, 1, cb)).unwrap();
        assert_eq!(found.food, 700);
        assert_eq!(found.gold, 100);
    }
}
