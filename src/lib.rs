//! Strongly typed, always-current configuration cache over a watchable
//! key-value store.
//!
//! - [`StoreManager`] keeps registered prefixes decoded in memory and fans
//!   changes out to prefix watchers.
//! - [`RawWatchManager`] exposes untyped watch, get, put and delete.
//! - [`Engine`] combines both over one store.

mod config;
mod engine;
mod errors;
mod metrics;
mod notifier;
mod registry;
mod store;
mod store_manager;
mod utils;
mod watcher;

pub use config::*;
pub use engine::*;
pub use errors::*;
pub use metrics::*;
pub use notifier::*;
pub use registry::*;
pub use store::*;
pub use store_manager::*;
pub use watcher::*;
