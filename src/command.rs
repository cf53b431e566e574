//! Console commands: a reader thread blocks on stdin and pushes lines to a
//! queue the main loop drains each tick.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::database::DatabaseManager;
use crate::queue::ConcurrentQueue;

type CommandFn = Box<dyn FnMut(&[String])>;

struct CommandEntry {
    description: String,
    handler: CommandFn,
}

/// Registry and pump for console commands. `help` is built in.
#[derive(Default)]
pub struct CommandSystem {
    commands: BTreeMap<String, CommandEntry>,
    pending: Arc<ConcurrentQueue<String>>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl CommandSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        handler: impl FnMut(&[String]) + 'static,
    ) {
        self.commands.insert(
            name.to_owned(),
            CommandEntry {
                description: description.to_owned(),
                handler: Box::new(handler),
            },
        );
    }

    /// Starts the stdin reader thread.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let pending = Arc::clone(&self.pending);
        let running = Arc::clone(&self.running);

        self.reader = std::thread::Builder::new()
            .name("console".to_owned())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };

                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    if line.trim().is_empty() {
                        continue;
                    }

                    pending.push(line);
                }
            })
            .ok();

        info!("command system started, type 'help' for the list");
    }

    /// Stops accepting new commands. The reader thread stays blocked on
    /// stdin until the next line or EOF; it is detached, not joined.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        drop(self.reader.take());
    }

    /// Runs all pending commands on the calling (main) thread.
    pub fn process_pending(&mut self) {
        while let Some(line) = self.pending.try_pop() {
            let tokens: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
            let Some((name, args)) = tokens.split_first() else {
                continue;
            };

            if name == "help" {
                self.print_help();
                continue;
            }

            match self.commands.get_mut(name) {
                Some(entry) => (entry.handler)(args),
                None => warn!("unknown command '{name}', type 'help' for the list"),
            }
        }
    }

    fn print_help(&self) {
        info!("=== available commands ===");
        info!("  help - print this list");
        for (name, entry) in &self.commands {
            info!("  {name} - {}", entry.description);
        }
        info!("==========================");
    }

    #[cfg(test)]
    pub(crate) fn push_line(&self, line: &str) {
        self.pending.push(line.to_owned());
    }
}

/// Shared context captured by the built-in server commands.
#[derive(Clone)]
pub struct CommandContext {
    pub db: Arc<DatabaseManager>,
    pub running: Arc<AtomicBool>,
}

/// Registers `stop` and `deletedb`.
pub fn register_server_commands(commands: &mut CommandSystem, ctx: CommandContext) {
    let stop_ctx = ctx.clone();
    commands.register("stop", "stop the server cleanly", move |_args| {
        info!("shutdown requested from the console");
        stop_ctx.running.store(false, Ordering::SeqCst);
    });

    commands.register(
        "deletedb",
        "stop the server and delete a database. usage: deletedb <name.db> | deletedb all",
        move |args| {
            let Some(target) = args.first() else {
                warn!("usage: deletedb <name.db> | deletedb all");
                return;
            };

            // Release the SQL handle before touching files: stop the loop
            // and drain the worker synchronously.
            warn!("stopping the server before deleting the database");
            ctx.running.store(false, Ordering::SeqCst);
            ctx.db.shutdown();

            if target == "all" {
                let mut count = 0;
                let entries = match std::fs::read_dir(".") {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!("cannot list current directory: {e}");
                        return;
                    }
                };

                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "db") {
                        info!("removing {}", path.display());
                        remove_db_files(&path);
                        count += 1;
                    }
                }
                info!("{count} database file(s) removed, restart the server");
            } else if Path::new(target).exists() {
                remove_db_files(Path::new(target));
                info!("removed {target}, restart the server");
            } else {
                warn!("file not found: {target}");
            }
        },
    );
}

/// Removes a database together with its WAL and SHM companions.
fn remove_db_files(path: &Path) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(format!("{}-wal", path.display()));
    let _ = std::fs::remove_file(format!("{}-shm", path.display()));
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn pending_commands_run_with_their_arguments() {
        let mut commands = CommandSystem::new();
        let seen = Rc::new(RefCell::new(vec![]));

        let sink = Rc::clone(&seen);
        commands.register("greet", "test command", move |args| {
            sink.borrow_mut().push(args.to_vec());
        });

        commands.push_line("greet alice bob");
        commands.push_line("unknown whatever");
        commands.push_line("greet");
        commands.process_pending();

        assert_eq!(
            *seen.borrow(),
            vec![vec!["alice".to_owned(), "bob".to_owned()], vec![]]
        );
    }

    #[test]
    fn help_does_not_require_registration() {
        let mut commands = CommandSystem::new();
        commands.push_line("help");
        commands.process_pending();
    }

    #[test]
    fn deletedb_removes_database_and_companions() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("game.db");
        let db_path_str = db_path.to_str().unwrap().to_owned();

        let db = DatabaseManager::open(&db_path_str).unwrap();
        std::fs::write(format!("{db_path_str}-wal"), b"wal").unwrap();
        std::fs::write(format!("{db_path_str}-shm"), b"shm").unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let mut commands = CommandSystem::new();
        register_server_commands(
            &mut commands,
            CommandContext {
                db,
                running: Arc::clone(&running),
            },
        );

        commands.push_line(&format!("deletedb {db_path_str}"));
        commands.process_pending();

        assert!(!running.load(Ordering::SeqCst));
        assert!(!db_path.exists());
        assert!(!Path::new(&format!("{db_path_str}-wal")).exists());
        assert!(!Path::new(&format!("{db_path_str}-shm")).exists());
    }

    #[test]
    fn stop_clears_the_run_flag() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("game.db");
        let db = DatabaseManager::open(db_path.to_str().unwrap()).unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let mut commands = CommandSystem::new();
        register_server_commands(
            &mut commands,
            CommandContext {
                db,
                running: Arc::clone(&running),
            },
        );

        commands.push_line("stop");
        commands.process_pending();
        assert!(!running.load(Ordering::SeqCst));
    }
}
