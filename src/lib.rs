//! Authoritative server core for a multi-kingdom online game.
//!
//! The server drives everything from a fixed-rate main loop: the transport
//! is pumped non-blockingly each tick, packet handlers run synchronously on
//! the main thread, database work is shipped to a single persistence worker
//! thread, and completions come back through a main-thread callback queue.
//! Each kingdom is an isolated world with its own component store and
//! spatial index.

pub mod auth;
pub mod command;
pub mod config;
pub mod database;
pub mod network;
pub mod queue;
pub mod server;
pub mod session;
pub mod world;
