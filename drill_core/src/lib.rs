#![forbid(unsafe_code)]

//! Core engine for the drill training client.
//!
//! This crate provides:
//! - Domain types (drills, session entries, groups, filter preferences)
//! - A default drill catalog
//! - The session manager: local-first state with a per-user cache
//! - Debounced auto-save and backend sync with identifier reconciliation
//! - Seams for cache, transport, auth and clock implementations

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod changes;
pub mod cache;
pub mod ids;
pub mod scheduler;
pub mod transport;
pub mod backend;
pub mod auth;
pub mod capabilities;
pub mod manager;
pub mod testing;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog, Catalog};
pub use config::Config;
pub use changes::Category;
pub use cache::{CacheKey, CacheStore, FileCache, MemoryCache};
pub use scheduler::{Clock, ManualClock, SystemClock};
pub use transport::{OfflineTransport, Transport};
pub use auth::{AuthProvider, StaticAuth};
pub use capabilities::{CacheManagement, DrillGroupManagement, DrillSelection, SessionDrillManagement};
pub use manager::{FlushReport, SessionManager, StateEvent};
