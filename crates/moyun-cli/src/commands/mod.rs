pub mod backup;
pub mod common;
pub mod config;
pub mod devices;
pub mod docs;
pub mod sync;
