// lib.rs
// Library modules for the bingo draw server and operator console

pub mod defs;
pub mod error;
pub mod logging;
pub mod config;
pub mod ticket;
pub mod catalog;
pub mod pattern;
pub mod prize;
pub mod engine;
pub mod pouch;
pub mod store;
pub mod session;
pub mod api_handlers;
pub mod server;
pub mod client;
