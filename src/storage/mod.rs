pub mod blocked_store;
pub mod config;
