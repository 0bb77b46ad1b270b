pub mod config;
pub mod listings;
pub mod notifier;
pub mod persistence;
pub mod types;
