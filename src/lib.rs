//! Kira - settings cache for a chat bot.
//!
//! ## Architecture
//!
//! - `store` - Read-through settings stores with write-through persistence
//! - `database` - MongoDB adapter for the stores
//! - `groups` - Group metadata cache with deduplicated upstream fetches
//! - `cache` - Bounded caching with Moka
//! - `config` - Environment configuration
//! - `bot` - Telegram dispatcher and runtime

pub mod bot;
pub mod cache;
pub mod config;
pub mod database;
pub mod groups;
pub mod store;
