//! ============================================================================
//! Access Gate - Mounted gate state machine
//! ============================================================================
//! Checking → {Unauthenticated, Unauthorized, AuthorizedIncomplete, Authorized}
//!
//! A gate evaluates once when mounted and again on every sign-in event.
//! Sign-out forces `Unauthenticated` without a lookup. Each evaluation
//! captures a generation number; results that come back after a newer
//! evaluation, a sign-out or an unmount are discarded. Every state change
//! happens under the generation lock, so the staleness check and the
//! publish cannot be split by a concurrent sign-out. Mounted gates stop
//! when the client is torn down.
//! ============================================================================

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::checker::AccessChecker;
use super::navigator::Navigator;
use super::types::{GateError, GateOutcome, GateState, GateVariant};
use crate::backend::{AuthEvent, AuthProvider, CravenClient};
use crate::config::GateRoutes;
use crate::storage::{SafeStorage, RETURN_TO_KEY};

/// Where to remember the route a signed-out visitor was trying to reach
struct ReturnTo {
    storage: SafeStorage,
    route: String,
}

/// Gate guarding one protected area
pub struct AccessGate {
    variant: GateVariant,
    auth: Arc<dyn AuthProvider>,
    checker: AccessChecker,
    navigator: Arc<dyn Navigator>,
    routes: GateRoutes,
    return_to: Option<ReturnTo>,
    shutdown: CancellationToken,
    generation: Mutex<u64>,
    state: watch::Sender<GateState>,
}

impl AccessGate {
    pub fn new(variant: GateVariant, client: &CravenClient, navigator: Arc<dyn Navigator>) -> Self {
        let (state, _) = watch::channel(GateState::Checking);
        Self {
            variant,
            auth: client.auth().clone(),
            checker: AccessChecker::new(client.store().clone(), client.config().clone()),
            navigator,
            routes: client.config().routes.clone(),
            return_to: None,
            shutdown: client.shutdown_token().clone(),
            generation: Mutex::new(0),
            state,
        }
    }

    /// Stash `route` under `craven.return_to` whenever this gate sends the
    /// visitor to a login page
    pub fn with_return_to(mut self, storage: SafeStorage, route: &str) -> Self {
        self.return_to = Some(ReturnTo {
            storage,
            route: route.to_string(),
        });
        self
    }

    pub fn variant(&self) -> GateVariant {
        self.variant
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    pub fn outcome(&self) -> GateOutcome {
        self.variant.outcome(self.state(), &self.routes)
    }

    /// Observe state changes
    pub fn watch(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    /// Held for the whole of every state transition
    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the full check from `Checking`. Returns the state the gate is in
    /// afterwards, which is not this evaluation's result if it went stale.
    pub async fn evaluate(&self) -> GateState {
        let generation = {
            let mut current = self.lock_generation();
            *current += 1;
            self.state.send_replace(GateState::Checking);
            let generation = *current;
            generation
        };

        let result = match self.auth.current_identity().await {
            Ok(Some(identity)) => self.checker.check(&self.variant, &identity).await,
            Ok(None) => Err(GateError::NotAuthenticated),
            Err(e) => {
                warn!("Identity lookup failed for {}: {}", self.variant, e);
                Err(GateError::NotAuthenticated)
            }
        };
        let state = GateState::from_check(&result);

        let current = self.lock_generation();
        if *current != generation {
            debug!(
                "Discarding stale {} evaluation ({:?}, generation {})",
                self.variant, state, generation
            );
            return self.state();
        }

        self.apply(state);
        drop(current);
        state
    }

    /// Handle a sign-out: no lookup, straight to `Unauthenticated`
    pub fn force_signed_out(&self) {
        let mut current = self.lock_generation();
        *current += 1;
        info!("{}: signed out", self.variant);
        self.apply(GateState::Unauthenticated);
    }

    /// Drop any in-flight evaluation and return to `Checking`
    pub fn invalidate(&self) {
        let mut current = self.lock_generation();
        *current += 1;
        self.state.send_replace(GateState::Checking);
    }

    /// Publish and navigate; callers hold the generation lock
    fn apply(&self, state: GateState) {
        self.state.send_replace(state);

        if let GateOutcome::Redirect(route) = self.variant.outcome(state, &self.routes) {
            if state == GateState::Unauthenticated {
                if let Some(return_to) = &self.return_to {
                    return_to.storage.set(RETURN_TO_KEY, &return_to.route);
                }
            }
            debug!("{}: {:?} → redirect {}", self.variant, state, route);
            self.navigator.redirect(&route);
        }
    }

    /// Evaluate now and follow auth-state changes until the handle drops
    /// or the client is torn down
    pub fn mount(self: Arc<Self>) -> GateHandle {
        let cancel = self.shutdown.child_token();
        // Subscribe before the first evaluation so no transition is missed
        let mut events = self.auth.auth_events();

        let gate = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            spawn_evaluation(&gate, &token);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(AuthEvent::SignedOut) => gate.force_signed_out(),
                        Ok(AuthEvent::SignedIn(identity)) => {
                            debug!("{}: sign-in by {}, re-checking", gate.variant, identity.id);
                            spawn_evaluation(&gate, &token);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("{}: missed {} auth events, re-checking", gate.variant, skipped);
                            spawn_evaluation(&gate, &token);
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("{} gate unmounted", gate.variant);
        });

        GateHandle { gate: self, cancel }
    }
}

/// Run one evaluation in the background so sign-out stays immediate
fn spawn_evaluation(gate: &Arc<AccessGate>, token: &CancellationToken) {
    let gate = gate.clone();
    let token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = gate.evaluate() => {}
        }
    });
}

/// A mounted gate; dropping it unmounts
pub struct GateHandle {
    gate: Arc<AccessGate>,
    cancel: CancellationToken,
}

impl GateHandle {
    pub fn gate(&self) -> &Arc<AccessGate> {
        &self.gate
    }

    pub fn state(&self) -> GateState {
        self.gate.state()
    }

    pub fn watch(&self) -> watch::Receiver<GateState> {
        self.gate.watch()
    }

    /// Wait until the gate leaves `Checking`
    pub async fn resolved(&self) -> GateState {
        let mut rx = self.gate.watch();
        let state = match rx.wait_for(GateState::is_resolved).await {
            Ok(state) => *state,
            Err(_) => self.gate.state(),
        };
        state
    }

    pub fn unmount(self) {}
}

impl Drop for GateHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.gate.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::navigator::RecordingNavigator;
    use crate::backend::MemoryBackend;
    use crate::config::CravenConfig;
    use crate::storage::MemoryStorage;
    use crate::types::{ApplicationRecord, ApplicationStatus, Identity, Role};
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        client: CravenClient,
        navigator: Arc<RecordingNavigator>,
    }

    fn fixture(config: CravenConfig) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        Fixture {
            client: CravenClient::in_memory(backend.clone(), config),
            backend,
            navigator: Arc::new(RecordingNavigator::new()),
        }
    }

    impl Fixture {
        fn gate(&self, variant: GateVariant) -> Arc<AccessGate> {
            Arc::new(AccessGate::new(variant, &self.client, self.navigator.clone()))
        }
    }

    async fn wait_for_state(rx: &mut watch::Receiver<GateState>, want: GateState) {
        rx.wait_for(|s| *s == want).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_identity_redirects_to_login() {
        let fx = fixture(CravenConfig::default());
        let storage = SafeStorage::new(Arc::new(MemoryStorage::new()));
        let gate = Arc::new(
            AccessGate::new(GateVariant::Admin, &fx.client, fx.navigator.clone())
                .with_return_to(storage.clone(), "/admin/drivers"),
        );

        assert_eq!(gate.evaluate().await, GateState::Unauthenticated);
        assert_eq!(fx.navigator.last().as_deref(), Some("/auth"));
        assert_eq!(storage.get(RETURN_TO_KEY).as_deref(), Some("/admin/drivers"));
    }

    #[tokio::test]
    async fn test_fallback_variants_never_navigate() {
        let fx = fixture(CravenConfig::default());
        fx.backend
            .sign_in(Identity::new(Uuid::new_v4(), "nobody@craven.test"))
            .await;

        for variant in [
            GateVariant::Customer,
            GateVariant::Admin,
            GateVariant::Executive { required_role: None },
        ] {
            let gate = fx.gate(variant);
            assert_eq!(gate.evaluate().await, GateState::Unauthorized);
            assert_eq!(gate.outcome(), GateOutcome::Fallback);
        }
        assert!(fx.navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_approved_without_onboarding_redirects() {
        let fx = fixture(CravenConfig::default());
        let identity = Identity::new(Uuid::new_v4(), "new@craven.test");
        fx.backend.sign_in(identity.clone()).await;
        fx.backend
            .put_application(ApplicationRecord {
                user_id: identity.id,
                status: ApplicationStatus::Approved,
                onboarding_completed_at: None,
            })
            .await;

        let gate = fx.gate(GateVariant::Onboarding);
        assert_eq!(gate.evaluate().await, GateState::AuthorizedIncomplete);
        assert_eq!(fx.navigator.routes(), vec!["/onboarding".to_string()]);
        assert_ne!(gate.outcome(), GateOutcome::Render);
    }

    #[tokio::test]
    async fn test_superuser_renders_without_records() {
        let fx = fixture(CravenConfig::default().with_superuser("owner@craven.test"));
        fx.backend
            .sign_in(Identity::new(Uuid::new_v4(), "OWNER@craven.test"))
            .await;

        for variant in [GateVariant::Customer, GateVariant::Admin] {
            let gate = fx.gate(variant);
            assert_eq!(gate.evaluate().await, GateState::Authorized);
            assert_eq!(gate.outcome(), GateOutcome::Render);
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_is_denial() {
        let fx = fixture(CravenConfig::default());
        let identity = Identity::new(Uuid::new_v4(), "x@craven.test");
        fx.backend.sign_in(identity.clone()).await;
        fx.backend.grant_role(identity.id, Role::Admin).await;
        fx.backend.set_fail_lookups(true);

        let gate = fx.gate(GateVariant::Admin);
        assert_eq!(gate.evaluate().await, GateState::Unauthorized);
    }

    #[tokio::test]
    async fn test_role_removed_then_reauth_denies() {
        let fx = fixture(CravenConfig::default());
        let identity = Identity::new(Uuid::new_v4(), "admin@craven.test");
        fx.backend.sign_in(identity.clone()).await;
        fx.backend.grant_role(identity.id, Role::Admin).await;

        let handle = fx.gate(GateVariant::Admin).mount();
        let mut rx = handle.watch();
        assert_eq!(handle.resolved().await, GateState::Authorized);

        fx.backend.revoke_role(identity.id, Role::Admin).await;
        fx.backend.sign_out().await.unwrap();
        wait_for_state(&mut rx, GateState::Unauthenticated).await;
        assert_eq!(fx.navigator.last().as_deref(), Some("/auth"));

        fx.backend.sign_in(identity).await;
        wait_for_state(&mut rx, GateState::Unauthorized).await;
        assert_eq!(handle.gate().outcome(), GateOutcome::Fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_during_lookup_wins() {
        let fx = fixture(CravenConfig::default());
        let identity = Identity::new(Uuid::new_v4(), "admin@craven.test");
        fx.backend.sign_in(identity.clone()).await;
        fx.backend.grant_role(identity.id, Role::Admin).await;
        fx.backend.set_lookup_delay(Some(Duration::from_millis(500))).await;

        let gate = fx.gate(GateVariant::Admin);
        let pending = tokio::spawn({
            let gate = gate.clone();
            async move { gate.evaluate().await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(gate.state(), GateState::Checking);
        gate.force_signed_out();

        // The late Authorized result is dropped
        assert_eq!(pending.await.unwrap(), GateState::Unauthenticated);
        assert_eq!(gate.state(), GateState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_teardown_stops_mounted_gate() {
        let fx = fixture(CravenConfig::default());
        let identity = Identity::new(Uuid::new_v4(), "admin@craven.test");
        fx.backend.sign_in(identity.clone()).await;
        fx.backend.grant_role(identity.id, Role::Admin).await;

        let handle = fx.gate(GateVariant::Admin).mount();
        assert_eq!(handle.resolved().await, GateState::Authorized);

        fx.client.teardown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        fx.backend.sign_out().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(handle.state(), GateState::Authorized);
        assert!(fx.navigator.routes().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sign_out_racing_evaluation_stays_signed_out() {
        let fx = fixture(CravenConfig::default());
        let identity = Identity::new(Uuid::new_v4(), "admin@craven.test");
        fx.backend.sign_in(identity.clone()).await;
        fx.backend.grant_role(identity.id, Role::Admin).await;

        for _ in 0..200 {
            let gate = fx.gate(GateVariant::Admin);
            gate.force_signed_out();
            let mut rx = gate.watch();

            let pending = tokio::spawn({
                let gate = gate.clone();
                async move { gate.evaluate().await }
            });
            // The evaluation has taken its generation once it publishes
            rx.changed().await.unwrap();
            gate.force_signed_out();

            pending.await.unwrap();
            assert_eq!(gate.state(), GateState::Unauthenticated);
        }
        assert_eq!(fx.navigator.last().as_deref(), Some("/auth"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_discards_late_result() {
        let fx = fixture(CravenConfig::default());
        let identity = Identity::new(Uuid::new_v4(), "admin@craven.test");
        fx.backend.sign_in(identity.clone()).await;
        fx.backend.grant_role(identity.id, Role::Admin).await;
        fx.backend.set_lookup_delay(Some(Duration::from_millis(500))).await;

        let gate = fx.gate(GateVariant::Admin);
        let handle = gate.clone().mount();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.unmount();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(gate.state(), GateState::Checking);
        assert!(fx.navigator.routes().is_empty());
    }
}
