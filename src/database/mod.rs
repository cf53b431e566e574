//! The persistence worker: a single background thread owning the SQL
//! connection, fed through a job queue. Repositories enqueue closures that
//! run serially on that thread and report back through callbacks.

mod account;
mod player;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Context;
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, error, info};

pub use account::{Account, AccountRepository};
pub use player::{PlayerData, PlayerRepository};

use crate::queue::ConcurrentQueue;

/// A unit of work executed on the persistence worker thread.
pub type DbJob = Box<dyn FnOnce(&mut Connection) + Send>;

/// Owns the SQL connection and the worker thread that serialises all
/// access to it.
pub struct DatabaseManager {
    jobs: Arc<ConcurrentQueue<DbJob>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DatabaseManager {
    /// Opens (or creates) the database, applies pragmas and schema, and
    /// starts the worker thread.
    pub fn open(db_path: &str) -> anyhow::Result<Arc<Self>> {
        let mut conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database at {db_path}"))?;
        info!(path = db_path, "database opened");

        init_schema(&mut conn).context("failed to initialize database schema")?;

        let jobs: Arc<ConcurrentQueue<DbJob>> = Arc::new(ConcurrentQueue::new());
        let running = Arc::new(AtomicBool::new(true));

        let worker = std::thread::Builder::new()
            .name("db-worker".to_owned())
            .spawn({
                let jobs = Arc::clone(&jobs);
                let running = Arc::clone(&running);
                move || worker_main(conn, &jobs, &running)
            })
            .context("failed to spawn database worker thread")?;

        Ok(Arc::new(Self {
            jobs,
            running,
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// Queues a job for the worker thread. Jobs run in FIFO order. Jobs
    /// queued after shutdown are silently discarded.
    pub fn enqueue(&self, job: impl FnOnce(&mut Connection) + Send + 'static) {
        if self.running.load(Ordering::Acquire) {
            self.jobs.push(Box::new(job));
        }
    }

    /// Drains the worker and closes the connection. Idempotent.
    ///
    /// The wake-up job must be pushed before the run flag is cleared: a
    /// worker blocked in `wait_pop` has to observe at least one item
    /// before it re-tests the flag.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        info!("shutting down database worker, waiting for pending jobs");
        self.jobs.push(Box::new(|_conn| {}));
        self.running.store(false, Ordering::Release);

        if worker.join().is_err() {
            error!("database worker thread panicked");
        } else {
            info!("database worker stopped");
        }
    }
}

impl Drop for DatabaseManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_main(mut conn: Connection, jobs: &ConcurrentQueue<DbJob>, running: &AtomicBool) {
    debug!("database worker thread started");

    while running.load(Ordering::Acquire) {
        let job = jobs.wait_pop();

        if !running.load(Ordering::Acquire) {
            break;
        }

        job(&mut conn);
    }

    debug!("database worker thread exiting");
}

fn init_schema(conn: &mut Connection) -> anyhow::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS accounts (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             username TEXT UNIQUE NOT NULL,
             password_hash TEXT,
             device_id TEXT,
             created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
             last_login_at DATETIME
         );

         CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_device_id
             ON accounts(device_id);

         CREATE TABLE IF NOT EXISTS player_data (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             account_id INTEGER NOT NULL,
             kingdom_id INTEGER NOT NULL,
             pos_x REAL DEFAULT 0.0,
             pos_y REAL DEFAULT 0.0,
             food INTEGER DEFAULT 500,
             wood INTEGER DEFAULT 500,
             stone INTEGER DEFAULT 200,
             gold INTEGER DEFAULT 100,
             FOREIGN KEY (account_id) REFERENCES accounts(id),
             UNIQUE(account_id, kingdom_id)
         );

         CREATE TABLE IF NOT EXISTS account_bindings (
             account_id INTEGER,
             auth_provider TEXT,
             auth_provider_id TEXT,
             UNIQUE(auth_provider, auth_provider_id)
         );",
    )?;

    debug!("database schema verified");
    Ok(())
}

/// Whether a statement failed on a UNIQUE (or other) constraint. These are
/// expected application-level conflicts and log at warn, not error.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::mpsc;
    use std::time::Duration;

    /// Runs an async repository call and blocks on its callback result.
    pub(crate) fn wait_for<T: Send + 'static>(
        run: impl FnOnce(Box<dyn FnOnce(T) + Send>),
    ) -> T {
        let (tx, rx) = mpsc::channel();
        run(Box::new(move |value| {
            let _ = tx.send(value);
        }));
        rx.recv_timeout(Duration::from_secs(30))
            .expect("timed out waiting for database callback")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::test_util::wait_for;
    use super::*;

    fn temp_db() -> (tempfile::TempDir, Arc<DatabaseManager>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = DatabaseManager::open(path.to_str().unwrap()).unwrap();
        (dir, db)
    }

    #[test]
    fn jobs_run_in_fifo_order() {
        let (_dir, db) = temp_db();

        let counter = Arc::new(AtomicUsize::new(0));
        let order: Arc<parking_lot::Mutex<Vec<usize>>> = Arc::default();

        for i in 0..16 {
            let counter = Arc::clone(&counter);
            let order = Arc::clone(&order);
            db.enqueue(move |_conn| {
                order.lock().push(i);
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        let done: bool = wait_for(|cb| db.enqueue(move |_conn| cb(true)));
        assert!(done);
        assert_eq!(counter.load(Ordering::SeqCst), 16);
        assert_eq!(*order.lock(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn shutdown_is_idempotent_and_drops_late_jobs() {
        let (_dir, db) = temp_db();

        db.shutdown();
        db.shutdown();

        // Queued after shutdown: must be discarded, not panic.
        db.enqueue(|_conn| panic!("job ran after shutdown"));
    }

    #[test]
    fn schema_is_reopenable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let path = path.to_str().unwrap();

        let db = DatabaseManager::open(path).unwrap();
        db.shutdown();

        // Second open must tolerate the existing schema.
        let db = DatabaseManager::open(path).unwrap();
        db.shutdown();
    }
}
