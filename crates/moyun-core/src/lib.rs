//! moyun-core - Local-first sync engine for MoYun
//!
//! This crate contains the models, local cache, remote store client, merge
//! engine, pending-change queue, backups and device presence shared by every
//! MoYun client.

pub mod backup;
pub mod clock;
pub mod config;
pub mod db;
pub mod devices;
pub mod engine;
pub mod error;
pub mod keys;
pub mod merge;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use engine::{EngineContext, SyncEngine};
pub use error::{Error, Result};
pub use state::SyncState;
