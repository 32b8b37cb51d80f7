//! Infrastructure layer: user store adapters and configuration loading.

pub mod config;
pub mod user_store;

pub use config::{AppConfig, ConfigError, ConfigLoader};
pub use user_store::{InMemoryUserStore, NewUser, PostgresUserStore, UserPatch, UserStore, UserUpdate};
