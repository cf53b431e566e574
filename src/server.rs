//! The fixed-cadence main loop and the state it drives.
//!
//! Every tick: pump transport events (handlers run inline), drain the
//! main-thread callback queue, tick every kingdom, pump console commands,
//! then sleep up to the next deadline.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{error, info, warn};

use crate::command::{self, CommandContext, CommandSystem};
use crate::config::ServerConfig;
use crate::database::{AccountRepository, DatabaseManager, PlayerRepository};
use crate::network::dispatcher::PacketDispatcher;
use crate::network::rate_limit::RateLimiter;
use crate::network::{handlers, NetworkManager};
use crate::queue::ConcurrentQueue;
use crate::session::SessionManager;
use crate::world::registry::KingdomRegistry;
use crate::world::KingdomWorld;

/// Margin subtracted from the OS sleep so the busy-yield tail can hit the
/// deadline precisely.
const SLEEP_MARGIN: Duration = Duration::from_millis(2);

/// A callback executed on the main thread with full access to game state.
pub type MainTask = Box<dyn FnOnce(&mut GameState) + Send>;

/// Handle for posting work back onto the main thread from worker threads.
#[derive(Clone, Default)]
pub struct MainThread {
    queue: Arc<ConcurrentQueue<MainTask>>,
}

impl MainThread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `task` to run during the next callback drain.
    pub fn run(&self, task: impl FnOnce(&mut GameState) + Send + 'static) {
        self.queue.push(Box::new(task));
    }

    pub(crate) fn try_pop(&self) -> Option<MainTask> {
        self.queue.try_pop()
    }
}

/// Everything the handlers and main-thread callbacks operate on. Owned by
/// the main thread; worker threads reach it only through [`MainThread`].
pub struct GameState {
    pub config: ServerConfig,
    pub sessions: SessionManager,
    pub kingdoms: BTreeMap<i32, KingdomWorld>,
    pub accounts: AccountRepository,
    pub players: PlayerRepository,
    pub main_thread: MainThread,
    pub rate_limiter: RateLimiter,
    started_at: Instant,
}

impl GameState {
    /// Monotonic server time in milliseconds, for pong timestamps.
    pub fn monotonic_ms(&self) -> i64 {
        self.started_at.elapsed().as_millis() as i64
    }
}

/// Handle that signals the loop to stop from another thread (console,
/// signal handler).
#[derive(Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The fixed-rate scheduler driving the whole server.
pub struct GameLoop {
    config: ServerConfig,
    running: Arc<AtomicBool>,
}

impl GameLoop {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.running))
    }

    /// Runs the server until the run flag is cleared, then shuts down the
    /// console, the network, and the persistence worker in that order.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut network =
            NetworkManager::bind(&self.config).context("network manager initialization failed")?;

        let db = DatabaseManager::open(&self.config.db_path)
            .context("database initialization failed")?;

        let main_thread = MainThread::new();

        let mut state = GameState {
            config: self.config.clone(),
            sessions: SessionManager::new(),
            kingdoms: load_kingdoms(&self.config.kingdoms_config_path),
            accounts: AccountRepository::new(Arc::clone(&db)),
            players: PlayerRepository::new(Arc::clone(&db)),
            main_thread: main_thread.clone(),
            rate_limiter: RateLimiter::default(),
            started_at: Instant::now(),
        };

        setup_disconnect_handler(&mut state.sessions, &main_thread);

        let mut dispatcher = PacketDispatcher::new();
        handlers::register_all(&mut dispatcher);

        let mut commands = CommandSystem::new();
        command::register_server_commands(
            &mut commands,
            CommandContext {
                db: Arc::clone(&db),
                running: Arc::clone(&self.running),
            },
        );
        commands.start();

        info!(
            tick_rate = self.config.tick_rate,
            port = self.config.port,
            kingdoms = state.kingdoms.len(),
            "server started"
        );

        let tick_rate = self.config.tick_rate.max(1);
        let tick_period = Duration::from_millis(1000 / u64::from(tick_rate));
        let dt = 1.0 / tick_rate as f32;
        let mut next_tick = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();

            // ProcessNetworkIn: handlers run inline and may queue async
            // persistence jobs.
            network.process_events(&dispatcher, &mut state);

            update_logic(dt, &mut state, &main_thread, &mut commands);

            // ProcessNetworkOut: reserved for batched broadcasts.

            let elapsed = tick_start.elapsed();
            if elapsed > tick_period {
                warn!("server overloaded, tick took {elapsed:.2?}");
            }

            next_tick += tick_period;
            let now = Instant::now();
            if next_tick > now {
                let os_sleep = (next_tick - now).saturating_sub(SLEEP_MARGIN);
                if os_sleep > Duration::ZERO {
                    std::thread::sleep(os_sleep);
                }
                while Instant::now() < next_tick {
                    std::thread::yield_now();
                }
            } else {
                error!("tick deadline missed entirely, resetting cadence");
                next_tick = Instant::now();
            }
        }

        info!("game loop stopped cleanly");

        commands.stop();
        network.shutdown();
        db.shutdown();
        Ok(())
    }
}

/// Drains the callback queue fully, ticks every kingdom, then pumps the
/// console.
fn update_logic(
    dt: f32,
    state: &mut GameState,
    main_thread: &MainThread,
    commands: &mut CommandSystem,
) {
    while let Some(task) = main_thread.try_pop() {
        task(state);
    }

    for world in state.kingdoms.values_mut() {
        world.on_tick(dt);
    }

    commands.process_pending();
}

/// Wires session teardown to entity cleanup: when an in-kingdom peer
/// disconnects, a main-thread callback removes its entity from the grid
/// and the store.
fn setup_disconnect_handler(sessions: &mut SessionManager, main_thread: &MainThread) {
    let main_thread = main_thread.clone();

    sessions.set_disconnect_callback(move |session| {
        let (Some(entity), Some(kingdom_id)) = (session.entity, session.kingdom_id) else {
            return;
        };
        let player_id = session.player_id;

        main_thread.run(move |state| {
            let Some(world) = state.kingdoms.get_mut(&kingdom_id) else {
                return;
            };
            if world.despawn_entity(entity) {
                info!(player_id, kingdom_id, "entity destroyed for disconnected player");
            }
        });
    });
}

/// Loads the kingdom worlds from the config file, falling back to a single
/// default kingdom when the file is missing or empty.
fn load_kingdoms(path: &str) -> BTreeMap<i32, KingdomWorld> {
    let mut kingdoms = BTreeMap::new();

    match KingdomRegistry::load_from_file(path) {
        Ok(registry) => {
            for info in registry.all() {
                kingdoms.insert(info.id, KingdomWorld::new(info.id, &info.name));
            }
        }
        Err(e) => {
            warn!("could not load kingdoms file {path}: {e:#}");
        }
    }

    if kingdoms.is_empty() {
        warn!("no kingdoms loaded, creating the default kingdom");
        kingdoms.insert(1, KingdomWorld::new(1, "Royaume Principal"));
    }

    info!("{} kingdom(s) loaded", kingdoms.len());
    kingdoms
}

#[cfg(test)]
impl GameState {
    /// A state with a temp database and the default kingdom, for driving
    /// handlers without a transport. Keep the returned guard alive.
    pub(crate) fn new_for_test() -> (Self, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = DatabaseManager::open(db_path.to_str().unwrap()).unwrap();

        let mut kingdoms = BTreeMap::new();
        kingdoms.insert(1, KingdomWorld::new(1, "Royaume Principal"));

        let main_thread = MainThread::new();
        let mut state = GameState {
            config: ServerConfig::default(),
            sessions: SessionManager::new(),
            kingdoms,
            accounts: AccountRepository::new(Arc::clone(&db)),
            players: PlayerRepository::new(Arc::clone(&db)),
            main_thread: main_thread.clone(),
            rate_limiter: RateLimiter::default(),
            started_at: Instant::now(),
        };
        setup_disconnect_handler(&mut state.sessions, &main_thread);

        (state, dir)
    }
}
