//! ============================================================================
//! Memory Backend - In-process auth, records and realtime
//! ============================================================================
//! Implements every collaborator trait over plain collections. Used by the
//! tests and by the CLI when gates run against a local fixture set.
//! Supports latency and failure injection for exercising fail-closed paths.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{
    AuthEvent, AuthProvider, ChangeEvent, ChangeKind, RealtimeChannel, RecordStore, RowFilter,
    Subscription, SUBSCRIPTION_BUFFER,
};
use crate::types::{
    ApplicationRecord, DriverProfile, EmployeeRecord, ExecUserRecord, FeatureFlag, Identity,
    Role, RoleAssignment,
};

/// Capacity of the auth event broadcast
const AUTH_EVENT_CAPACITY: usize = 16;

#[derive(Default)]
struct Tables {
    applications: HashMap<Uuid, ApplicationRecord>,
    roles: Vec<RoleAssignment>,
    exec_users: HashMap<Uuid, ExecUserRecord>,
    employees: Vec<EmployeeRecord>,
    driver_profiles: HashMap<Uuid, DriverProfile>,
    feature_flags: HashMap<String, FeatureFlag>,
}

/// In-memory implementation of all three backend traits
pub struct MemoryBackend {
    identity: RwLock<Option<Identity>>,
    auth_events: broadcast::Sender<AuthEvent>,
    tables: RwLock<Tables>,
    subscribers: Mutex<Vec<(RowFilter, mpsc::Sender<ChangeEvent>)>>,
    lookup_delay: RwLock<Option<Duration>>,
    fail_lookups: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (auth_events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            identity: RwLock::new(None),
            auth_events,
            tables: RwLock::new(Tables::default()),
            subscribers: Mutex::new(Vec::new()),
            lookup_delay: RwLock::new(None),
            fail_lookups: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Auth
    // ========================================================================

    /// Sign an identity in and announce it
    pub async fn sign_in(&self, identity: Identity) {
        *self.identity.write().await = Some(identity.clone());
        // No receivers is fine: nothing is mounted yet
        let _ = self.auth_events.send(AuthEvent::SignedIn(identity));
    }

    /// Replace the identity without emitting an event
    pub async fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.write().await = identity;
    }

    // ========================================================================
    // Record fixtures
    // ========================================================================

    pub async fn put_application(&self, record: ApplicationRecord) {
        self.tables
            .write()
            .await
            .applications
            .insert(record.user_id, record);
    }

    pub async fn grant_role(&self, user_id: Uuid, role: Role) {
        let mut tables = self.tables.write().await;
        if !tables
            .roles
            .iter()
            .any(|r| r.user_id == user_id && r.role == role)
        {
            tables.roles.push(RoleAssignment { user_id, role });
        }
    }

    pub async fn revoke_role(&self, user_id: Uuid, role: Role) {
        self.tables
            .write()
            .await
            .roles
            .retain(|r| !(r.user_id == user_id && r.role == role));
    }

    pub async fn put_exec_user(&self, record: ExecUserRecord) {
        self.tables
            .write()
            .await
            .exec_users
            .insert(record.user_id, record);
    }

    pub async fn put_employee(&self, record: EmployeeRecord) {
        let mut tables = self.tables.write().await;
        tables.employees.retain(|e| e.id != record.id);
        tables.employees.push(record);
    }

    pub async fn put_driver_profile(&self, profile: DriverProfile) {
        self.tables
            .write()
            .await
            .driver_profiles
            .insert(profile.user_id, profile);
    }

    pub async fn put_feature_flag(&self, flag: FeatureFlag) {
        self.tables
            .write()
            .await
            .feature_flags
            .insert(flag.key.clone(), flag);
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Delay every record lookup (not identity lookups)
    pub async fn set_lookup_delay(&self, delay: Option<Duration>) {
        *self.lookup_delay.write().await = delay;
    }

    /// Make every record lookup fail
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    async fn before_lookup(&self, what: &str) -> Result<()> {
        let delay = *self.lookup_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(anyhow!("Simulated store failure looking up {}", what));
        }
        Ok(())
    }

    // ========================================================================
    // Realtime
    // ========================================================================

    /// Deliver a change to every matching subscriber; returns how many got it
    pub async fn publish(&self, event: ChangeEvent) -> usize {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|(_, tx)| !tx.is_closed());

        let mut delivered = 0;
        for (filter, tx) in subscribers.iter() {
            if filter.matches(&event) && tx.try_send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!("Published {} change to {} subscribers", event.table, delivered);
        delivered
    }

    /// Update a profile and publish the change, as the delivery workflow would
    pub async fn update_driver_profile(&self, profile: DriverProfile) -> Result<usize> {
        let record = serde_json::to_value(&profile)
            .map_err(|e| anyhow!("Failed to serialize driver profile: {}", e))?;
        self.put_driver_profile(profile).await;
        Ok(self
            .publish(ChangeEvent {
                table: "driver_profiles".to_string(),
                kind: ChangeKind::Update,
                record,
            })
            .await)
    }

    /// Number of live subscriptions
    pub async fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|(_, tx)| !tx.is_closed());
        subscribers.len()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn current_identity(&self) -> Result<Option<Identity>> {
        Ok(self.identity.read().await.clone())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }

    async fn sign_out(&self) -> Result<()> {
        *self.identity.write().await = None;
        let _ = self.auth_events.send(AuthEvent::SignedOut);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn application_for(&self, user_id: Uuid) -> Result<Option<ApplicationRecord>> {
        self.before_lookup("application").await?;
        Ok(self.tables.read().await.applications.get(&user_id).cloned())
    }

    async fn roles_for(&self, user_id: Uuid) -> Result<Vec<RoleAssignment>> {
        self.before_lookup("roles").await?;
        Ok(self
            .tables
            .read()
            .await
            .roles
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn exec_user_for(&self, user_id: Uuid) -> Result<Option<ExecUserRecord>> {
        self.before_lookup("exec user").await?;
        Ok(self.tables.read().await.exec_users.get(&user_id).cloned())
    }

    async fn employee_for_user(&self, user_id: Uuid) -> Result<Option<EmployeeRecord>> {
        self.before_lookup("employee").await?;
        Ok(self
            .tables
            .read()
            .await
            .employees
            .iter()
            .find(|e| e.user_id == Some(user_id))
            .cloned())
    }

    async fn employee_by_email(&self, email: &str) -> Result<Option<EmployeeRecord>> {
        self.before_lookup("employee").await?;
        Ok(self
            .tables
            .read()
            .await
            .employees
            .iter()
            .find(|e| e.matches_email(email))
            .cloned())
    }

    async fn driver_profile_for(&self, user_id: Uuid) -> Result<Option<DriverProfile>> {
        self.before_lookup("driver profile").await?;
        Ok(self.tables.read().await.driver_profiles.get(&user_id).cloned())
    }

    async fn feature_flag(&self, key: &str) -> Result<Option<FeatureFlag>> {
        self.before_lookup("feature flag").await?;
        Ok(self.tables.read().await.feature_flags.get(key).cloned())
    }
}

#[async_trait]
impl RealtimeChannel for MemoryBackend {
    async fn subscribe(&self, filter: RowFilter) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        debug!("Subscribed to {} where {}", filter.table, filter.expression());
        self.subscribers.lock().await.push((filter, tx));
        Ok(Subscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_roles_grant_and_revoke() {
        let backend = MemoryBackend::new();
        let id = Uuid::new_v4();

        backend.grant_role(id, Role::Admin).await;
        backend.grant_role(id, Role::Admin).await;
        assert_eq!(backend.roles_for(id).await.unwrap().len(), 1);

        backend.revoke_role(id, Role::Admin).await;
        assert!(backend.roles_for(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let backend = MemoryBackend::new();
        backend.set_fail_lookups(true);
        assert!(backend.application_for(Uuid::new_v4()).await.is_err());
        // Identity lookups are unaffected
        assert!(backend.current_identity().await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers_only() {
        let backend = MemoryBackend::new();
        let mine = Uuid::new_v4();

        let mut sub = backend
            .subscribe(RowFilter::new("driver_profiles", "user_id", mine))
            .await
            .unwrap();
        let _other = backend
            .subscribe(RowFilter::new("driver_profiles", "user_id", Uuid::new_v4()))
            .await
            .unwrap();

        let delivered = backend
            .publish(ChangeEvent {
                table: "driver_profiles".into(),
                kind: ChangeKind::Update,
                record: json!({ "user_id": mine, "diamond_points": 12 }),
            })
            .await;
        assert_eq!(delivered, 1);

        let event = sub.next().await.unwrap();
        assert_eq!(event.record["diamond_points"], 12);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_released() {
        let backend = MemoryBackend::new();
        let sub = backend
            .subscribe(RowFilter::new("feature_flags", "key", "surge"))
            .await
            .unwrap();
        assert_eq!(backend.subscriber_count().await, 1);

        drop(sub);
        assert_eq!(backend.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_sign_out_broadcasts() {
        let backend = MemoryBackend::new();
        let mut events = backend.auth_events();

        backend
            .sign_in(Identity::new(Uuid::new_v4(), "a@craven.test"))
            .await;
        backend.sign_out().await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), AuthEvent::SignedIn(_)));
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedOut);
        assert!(backend.current_identity().await.unwrap().is_none());
    }
}
