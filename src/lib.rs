pub mod chain;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod db;
pub mod error;
pub mod exchange;
pub mod health;
pub mod interfaces;
pub mod ledger;
pub mod logging;
pub mod platform;
pub mod reminders;
pub mod runtime_paths;
pub mod wake_lock;

pub type Result<T> = std::result::Result<T, error::ReminderChainError>;
