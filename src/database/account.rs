use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{error, info, warn};

use super::{is_unique_violation, DatabaseManager};
use crate::auth;

/// A persisted player identity.
#[derive(Clone, Debug)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub password_hash: Option<String>,
    pub device_id: Option<String>,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

const ACCOUNT_COLUMNS: &str = "id, username, password_hash, device_id, created_at, last_login_at";

impl Account {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            device_id: row.get(3)?,
            created_at: row.get(4)?,
            last_login_at: row.get(5)?,
        })
    }
}

/// Asynchronous account store. All methods enqueue work on the persistence
/// worker; callbacks run on the worker thread and must re-post to the main
/// thread before touching game state.
#[derive(Clone)]
pub struct AccountRepository {
    db: Arc<DatabaseManager>,
}

impl AccountRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub fn get_by_username(
        &self,
        username: String,
        callback: impl FnOnce(Option<Account>) + Send + 'static,
    ) {
        self.db.enqueue(move |conn| {
            let result = conn
                .query_row(
                    "SELECT id, username, password_hash, device_id, created_at, last_login_at \
                     FROM accounts WHERE username = ?1",
                    params![username],
                    Account::from_row,
                )
                .optional();

            match result {
                Ok(account) => callback(account),
                Err(e) => {
                    error!("account lookup by username failed: {e}");
                    callback(None);
                }
            }
        });
    }

    pub fn get_by_id(&self, account_id: i64, callback: impl FnOnce(Option<Account>) + Send + 'static) {
        self.db.enqueue(move |conn| {
            let result = conn
                .query_row(
                    "SELECT id, username, password_hash, device_id, created_at, last_login_at \
                     FROM accounts WHERE id = ?1",
                    params![account_id],
                    Account::from_row,
                )
                .optional();

            match result {
                Ok(account) => callback(account),
                Err(e) => {
                    error!("account lookup by id failed: {e}");
                    callback(None);
                }
            }
        });
    }

    pub fn get_by_device_id(
        &self,
        device_id: String,
        callback: impl FnOnce(Option<Account>) + Send + 'static,
    ) {
        self.db.enqueue(move |conn| {
            let result = conn
                .query_row(
                    "SELECT id, username, password_hash, device_id, created_at, last_login_at \
                     FROM accounts WHERE device_id = ?1",
                    params![device_id],
                    Account::from_row,
                )
                .optional();

            match result {
                Ok(account) => callback(account),
                Err(e) => {
                    error!("account lookup by device id failed: {e}");
                    callback(None);
                }
            }
        });
    }

    pub fn get_by_social_id(
        &self,
        provider: String,
        provider_id: String,
        callback: impl FnOnce(Option<Account>) + Send + 'static,
    ) {
        self.db.enqueue(move |conn| {
            let result = conn
                .query_row(
                    "SELECT a.id, a.username, a.password_hash, a.device_id, a.created_at, \
                            a.last_login_at \
                     FROM accounts a \
                     JOIN account_bindings b ON b.account_id = a.id \
                     WHERE b.auth_provider = ?1 AND b.auth_provider_id = ?2",
                    params![provider, provider_id],
                    Account::from_row,
                )
                .optional();

            match result {
                Ok(account) => callback(account),
                Err(e) => {
                    error!("account lookup by social id failed: {e}");
                    callback(None);
                }
            }
        });
    }

    /// Creates an account from a raw password. The KDF runs inline on the
    /// worker thread; the insert is transactional, so a unique violation
    /// leaves no partial row behind.
    pub fn create_account(
        &self,
        username: String,
        raw_password: String,
        callback: impl FnOnce(bool, Option<Account>) + Send + 'static,
    ) {
        self.db.enqueue(move |conn| {
            let hash = match auth::hash_password(&raw_password) {
                Ok(hash) => hash,
                Err(e) => {
                    error!(username = %username, "password hashing failed: {e}");
                    callback(false, None);
                    return;
                }
            };

            match insert_account(conn, &username, Some(&hash), None) {
                Ok(account) => callback(true, Some(account)),
                Err(e) => {
                    if is_unique_violation(&e) {
                        warn!(username = %username, "account creation failed: {e}");
                    } else {
                        error!(username = %username, "account creation failed: {e}");
                    }
                    callback(false, None);
                }
            }
        });
    }

    /// Creates a device-bound guest account with an empty password hash.
    pub fn create_guest_account(
        &self,
        device_id: String,
        username: String,
        callback: impl FnOnce(bool, Option<Account>) + Send + 'static,
    ) {
        self.db.enqueue(move |conn| {
            match insert_account(conn, &username, None, Some(&device_id)) {
                Ok(account) => callback(true, Some(account)),
                Err(e) => {
                    if is_unique_violation(&e) {
                        warn!(username = %username, "guest account creation failed: {e}");
                    } else {
                        error!(username = %username, "guest account creation failed: {e}");
                    }
                    callback(false, None);
                }
            }
        });
    }

    /// Attaches classic credentials to an existing (typically guest)
    /// account. `password_hash` must already be hashed by the caller.
    pub fn bind_account(
        &self,
        account_id: i64,
        username: String,
        password_hash: String,
        callback: impl FnOnce(bool) + Send + 'static,
    ) {
        self.db.enqueue(move |conn| {
            let result = conn.execute(
                "UPDATE accounts SET username = ?1, password_hash = ?2 WHERE id = ?3",
                params![username, password_hash, account_id],
            );

            match result {
                Ok(rows) if rows > 0 => {
                    info!(account_id, username = %username, "account bound to credentials");
                    callback(true);
                }
                Ok(_) => {
                    warn!(account_id, "account bind failed: account not found");
                    callback(false);
                }
                Err(e) => {
                    if is_unique_violation(&e) {
                        warn!(account_id, "account bind failed: {e}");
                    } else {
                        error!(account_id, "account bind failed: {e}");
                    }
                    callback(false);
                }
            }
        });
    }

    /// Links an account to an external auth provider. At most one account
    /// per (provider, provider id) pair.
    pub fn bind_social_account(
        &self,
        account_id: i64,
        provider: String,
        provider_id: String,
        callback: impl FnOnce(bool) + Send + 'static,
    ) {
        self.db.enqueue(move |conn| {
            let result = conn.execute(
                "INSERT INTO account_bindings (account_id, auth_provider, auth_provider_id) \
                 VALUES (?1, ?2, ?3)",
                params![account_id, provider, provider_id],
            );

            match result {
                Ok(_) => {
                    info!(account_id, provider = %provider, "social binding created");
                    callback(true);
                }
                Err(e) => {
                    if is_unique_violation(&e) {
                        warn!(account_id, provider = %provider, "social binding failed: {e}");
                    } else {
                        error!(account_id, provider = %provider, "social binding failed: {e}");
                    }
                    callback(false);
                }
            }
        });
    }

    /// Fire-and-forget last-login stamp.
    pub fn update_last_login(&self, account_id: i64) {
        self.db.enqueue(move |conn| {
            if let Err(e) = conn.execute(
                "UPDATE accounts SET last_login_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![account_id],
            ) {
                error!(account_id, "failed to update last login: {e}");
            }
        });
    }
}

fn insert_account(
    conn: &mut Connection,
    username: &str,
    password_hash: Option<&str>,
    device_id: Option<&str>,
) -> rusqlite::Result<Account> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO accounts (username, password_hash, device_id) VALUES (?1, ?2, ?3)",
        params![username, password_hash.unwrap_or(""), device_id],
    )?;
    let id = tx.last_insert_rowid();

    let account = tx.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
        params![id],
        Account::from_row,
    )?;

    tx.commit()?;
    Ok(account)
}
