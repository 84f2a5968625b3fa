pub mod notifier;
pub mod platform;
pub mod power;
