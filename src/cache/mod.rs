//! Cache module - Bounded in-memory caches using Moka.
//!
//! ## Architecture
//!
//! - `CacheRegistry` - Central registry holding all named caches
//! - `TypedCache` - Typed wrapper over a Moka cache, cheap to clone
//! - `CacheConfig` - Capacity and expiry settings
//!
//! ## Usage
//!
//! ```rust,ignore
//! let metadata = registry.get_or_create::<String, GroupMetadata>(
//!     "group_metadata",
//!     CacheConfig::group_metadata(),
//! );
//! metadata.insert(group_id.clone(), md);
//! let md = metadata.get(&group_id);
//! ```

mod config;
mod registry;
mod typed;

pub use config::CacheConfig;
pub use registry::CacheRegistry;
pub use typed::TypedCache;
