//! ============================================================================
//! Backend Module - External collaborators behind traits
//! ============================================================================
//! The hosted platform is reached through three narrow interfaces:
//! - AuthProvider: current identity, auth-state events, sign-out
//! - RecordStore: typed point lookups, one table per method
//! - RealtimeChannel: row-change subscriptions filtered by a key column
//!
//! A `CravenClient` bundles one implementation of each and is passed
//! explicitly to gates and watchers.
//!
//! ## Usage
//! ```rust,ignore
//! use craven_core::{CravenClient, CravenConfig};
//!
//! let client = CravenClient::init(CravenConfig::from_env()).await?;
//! let gate = AccessGate::new(GateVariant::Admin, &client, navigator);
//! // ...
//! client.teardown();
//! ```
//! ============================================================================

mod memory;
mod realtime;
mod rest;

pub use memory::MemoryBackend;
pub use realtime::RealtimeSocket;
pub use rest::{RestAuthProvider, RestRecordStore};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::config::CravenConfig;
use crate::types::{
    ApplicationRecord, DriverProfile, EmployeeRecord, ExecUserRecord, FeatureFlag, Identity,
    RoleAssignment,
};

/// Buffered change events per subscription
pub(crate) const SUBSCRIPTION_BUFFER: usize = 64;

/// Auth-state transitions consumed by gates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Identity),
    SignedOut,
}

/// Authentication collaborator
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The signed-in identity, if any
    async fn current_identity(&self) -> Result<Option<Identity>>;

    /// Receive auth-state transitions from now on
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;

    async fn sign_out(&self) -> Result<()>;
}

/// Remote record store: point queries only, no joins or transactions
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn application_for(&self, user_id: Uuid) -> Result<Option<ApplicationRecord>>;

    async fn roles_for(&self, user_id: Uuid) -> Result<Vec<RoleAssignment>>;

    async fn exec_user_for(&self, user_id: Uuid) -> Result<Option<ExecUserRecord>>;

    async fn employee_for_user(&self, user_id: Uuid) -> Result<Option<EmployeeRecord>>;

    /// Match on either `email` or `work_email`, case-insensitive
    async fn employee_by_email(&self, email: &str) -> Result<Option<EmployeeRecord>>;

    async fn driver_profile_for(&self, user_id: Uuid) -> Result<Option<DriverProfile>>;

    async fn feature_flag(&self, key: &str) -> Result<Option<FeatureFlag>>;
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change delivered by the realtime channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    /// New row for insert/update, old row for delete
    pub record: serde_json::Value,
}

/// Which rows a subscription receives: `table` where `column = value`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowFilter {
    pub table: String,
    pub column: String,
    pub value: String,
}

impl RowFilter {
    pub fn new(table: &str, column: &str, value: impl ToString) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    /// Whether a change event belongs to this filter
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table
            && event
                .record
                .get(&self.column)
                .map(|v| match v {
                    serde_json::Value::String(s) => *s == self.value,
                    other => other.to_string() == self.value,
                })
                .unwrap_or(false)
    }

    /// Filter expression in the hosted platform's syntax (`col=eq.value`)
    pub fn expression(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }
}

/// Receiving end of one realtime subscription.
/// Dropping it releases the subscription.
pub struct Subscription {
    rx: mpsc::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    /// Next change, or None once the channel has closed
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

/// Push-based row-change channel
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn subscribe(&self, filter: RowFilter) -> Result<Subscription>;
}

/// Explicitly constructed client handed to every gate and watcher
#[derive(Clone)]
pub struct CravenClient {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn RecordStore>,
    realtime: Arc<dyn RealtimeChannel>,
    config: CravenConfig,
    shutdown: CancellationToken,
}

impl CravenClient {
    /// Assemble a client from explicit collaborators
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn RecordStore>,
        realtime: Arc<dyn RealtimeChannel>,
        config: CravenConfig,
    ) -> Self {
        Self {
            auth,
            store,
            realtime,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Connect to the hosted platform described by `config`
    pub async fn init(config: CravenConfig) -> Result<Self> {
        let api_url = config
            .api_url
            .clone()
            .ok_or_else(|| anyhow!("CRAVEN_API_URL is not set"))?;
        let anon_key = config
            .anon_key
            .clone()
            .ok_or_else(|| anyhow!("CRAVEN_ANON_KEY is not set"))?;

        let auth = Arc::new(RestAuthProvider::new(&api_url, &anon_key)?);
        let store = Arc::new(RestRecordStore::new(&api_url, &anon_key, auth.session())?);
        let shutdown = CancellationToken::new();
        let realtime = Arc::new(RealtimeSocket::new(&api_url, &anon_key, shutdown.clone())?);

        info!("Craven client initialized for {}", api_url);

        Ok(Self {
            auth,
            store,
            realtime,
            config,
            shutdown,
        })
    }

    /// Client wired entirely to one in-process backend
    pub fn in_memory(backend: Arc<MemoryBackend>, config: CravenConfig) -> Self {
        Self::new(backend.clone(), backend.clone(), backend, config)
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn realtime(&self) -> &Arc<dyn RealtimeChannel> {
        &self.realtime
    }

    pub fn config(&self) -> &CravenConfig {
        &self.config
    }

    /// Token cancelled on teardown; watchers derive child tokens from it
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Release every subscription and background task tied to this client
    pub fn teardown(&self) {
        if !self.shutdown.is_cancelled() {
            self.shutdown.cancel();
            info!("Craven client torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(table: &str, record: serde_json::Value) -> ChangeEvent {
        ChangeEvent {
            table: table.to_string(),
            kind: ChangeKind::Update,
            record,
        }
    }

    #[test]
    fn test_row_filter_matches() {
        let id = Uuid::new_v4();
        let filter = RowFilter::new("driver_profiles", "user_id", id);

        assert!(filter.matches(&event("driver_profiles", json!({ "user_id": id }))));
        assert!(!filter.matches(&event("driver_profiles", json!({ "user_id": Uuid::new_v4() }))));
        assert!(!filter.matches(&event("orders", json!({ "user_id": id }))));
        assert!(!filter.matches(&event("driver_profiles", json!({ "points": 3 }))));
    }

    #[test]
    fn test_row_filter_non_string_column() {
        let filter = RowFilter::new("feature_flags", "id", 7);
        assert!(filter.matches(&event("feature_flags", json!({ "id": 7 }))));
        assert_eq!(filter.expression(), "id=eq.7");
    }

    #[tokio::test]
    async fn test_teardown_cancels_token() {
        let client = CravenClient::in_memory(Arc::new(MemoryBackend::new()), CravenConfig::default());
        let child = client.shutdown_token().child_token();
        assert!(!child.is_cancelled());
        client.teardown();
        assert!(child.is_cancelled());
    }
}
