//! ============================================================================
//! CRAVEN-CORE: Driver access gates and rewards
//! ============================================================================
//! This crate holds the client-side logic of the Craven delivery apps:
//! - Access gates deciding who may enter the customer, onboarding, admin,
//!   business-portal and executive areas
//! - Driver tier, rating and performance calculations
//! - Live points and feature-flag watchers fed by realtime row changes
//! - Hosted backend client (REST + websocket) and an in-memory backend
//! - Local fixture database (redb) for offline runs
//! ============================================================================

pub mod access;
pub mod backend;
pub mod config;
pub mod db;
pub mod live;
pub mod routing;
pub mod storage;
pub mod tiers;
pub mod types;

// Re-export main types for convenience
pub use types::*;
pub use access::{AccessGate, GateHandle, GateOutcome, GateState, GateVariant, Navigator};
pub use backend::{CravenClient, MemoryBackend};
pub use config::CravenConfig;
pub use db::{FixtureDb, FixtureSeed, FixtureStats};
pub use live::{FlagWatcher, PointsWatcher};
pub use storage::SafeStorage;
