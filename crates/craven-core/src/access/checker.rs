//! ============================================================================
//! Access Checker - Authorization predicates per gate variant
//! ============================================================================
//! Runs the record lookups for one identity, strictly one after another.
//! Superuser status comes from two sources merged into one grant set: the
//! configured email allow-list and stored `superuser` role rows.
//! ============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::types::{GateError, GateVariant};
use crate::backend::RecordStore;
use crate::config::CravenConfig;
use crate::types::{ExecRole, ExecUserRecord, HasStatus, Identity, Role};

/// Roles held by an identity for the duration of one check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grants {
    roles: HashSet<Role>,
}

impl Grants {
    pub fn has(&self, role: Role) -> bool {
        self.roles.contains(&role) || self.is_superuser()
    }

    pub fn is_superuser(&self) -> bool {
        self.roles.contains(&Role::Superuser)
    }
}

/// Evaluates gate predicates against the record store
#[derive(Clone)]
pub struct AccessChecker {
    store: Arc<dyn RecordStore>,
    config: CravenConfig,
}

impl AccessChecker {
    pub fn new(store: Arc<dyn RecordStore>, config: CravenConfig) -> Self {
        Self { store, config }
    }

    /// Resolve the identity's roles; allow-listed emails skip the lookup
    pub async fn grants(&self, identity: &Identity) -> Result<Grants, GateError> {
        let mut grants = Grants::default();

        if let Some(email) = identity.normalized_email() {
            if self.config.is_superuser_email(&email) {
                debug!("{} is on the superuser allow-list", identity.id);
                grants.roles.insert(Role::Superuser);
                return Ok(grants);
            }
        }

        let rows = self.store.roles_for(identity.id).await?;
        grants.roles.extend(rows.into_iter().map(|r| r.role));
        debug!("Roles for {}: {:?}", identity.id, grants.roles);
        Ok(grants)
    }

    /// Executive record for the identity, derived from the employee
    /// directory when no exec row exists
    pub async fn executive_for(&self, identity: &Identity) -> Result<Option<ExecUserRecord>, GateError> {
        if let Some(exec) = self.store.exec_user_for(identity.id).await? {
            return Ok(Some(exec));
        }

        let mut employee = self.store.employee_for_user(identity.id).await?;
        if employee.is_none() {
            if let Some(email) = identity.normalized_email() {
                employee = self.store.employee_by_email(&email).await?;
            }
        }

        let derived = employee.and_then(|e| e.as_exec_user(identity.id));
        if let Some(exec) = &derived {
            debug!(
                "Derived executive role {} for {} from employee position",
                exec.role, identity.id
            );
        }
        Ok(derived)
    }

    /// Run the predicate of `variant` for `identity`
    pub async fn check(&self, variant: &GateVariant, identity: &Identity) -> Result<(), GateError> {
        let result = self.run(variant, identity).await;

        match &result {
            Ok(()) => info!("{} authorized for {}", variant, identity.id),
            Err(GateError::LookupFailed(reason)) => {
                error!("{} lookup failed for {}: {}", variant, identity.id, reason)
            }
            Err(GateError::IncompleteOnboarding) => {
                info!("{}: onboarding incomplete for {}", variant, identity.id)
            }
            Err(e) => warn!("{} denied for {}: {}", variant, identity.id, e),
        }

        result
    }

    async fn run(&self, variant: &GateVariant, identity: &Identity) -> Result<(), GateError> {
        match variant {
            // Any signed-in identity; no lookups
            GateVariant::BusinessPortal => Ok(()),
            GateVariant::Admin => {
                if self.grants(identity).await?.has(Role::Admin) {
                    Ok(())
                } else {
                    Err(GateError::NotAuthorized)
                }
            }
            GateVariant::Customer | GateVariant::Onboarding => {
                if self.grants(identity).await?.is_superuser() {
                    return Ok(());
                }
                let application = self
                    .store
                    .application_for(identity.id)
                    .await?
                    .ok_or(GateError::NotAuthorized)?;
                if !application.is_approved() {
                    return Err(GateError::NotAuthorized);
                }
                if *variant == GateVariant::Onboarding && !application.is_onboarding_complete() {
                    return Err(GateError::IncompleteOnboarding);
                }
                Ok(())
            }
            GateVariant::Executive { required_role } => {
                if self.grants(identity).await?.is_superuser() {
                    // Superusers pass every role check, as ceo does
                    return Ok(());
                }
                let exec = self
                    .executive_for(identity)
                    .await?
                    .ok_or(GateError::NotAuthorized)?;
                match required_role {
                    Some(required) if !exec.role.satisfies(*required) => Err(GateError::NotAuthorized),
                    _ => Ok(()),
                }
            }
        }
    }

    /// Convenience for the common "is this identity at least `role`" question
    pub async fn has_exec_role(&self, identity: &Identity, role: ExecRole) -> bool {
        self.check(&GateVariant::Executive { required_role: Some(role) }, identity)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::types::{ApplicationRecord, ApplicationStatus, EmployeeRecord};
    use chrono::Utc;
    use uuid::Uuid;

    fn checker(backend: &Arc<MemoryBackend>, config: CravenConfig) -> AccessChecker {
        AccessChecker::new(backend.clone(), config)
    }

    fn exec_record(user_id: Uuid, role: ExecRole) -> ExecUserRecord {
        ExecUserRecord {
            user_id,
            role,
            access_level: 5,
            title: role.as_str().to_uppercase(),
            department: "Executive".into(),
        }
    }

    #[tokio::test]
    async fn test_no_records_denies_every_variant() {
        let backend = Arc::new(MemoryBackend::new());
        let checker = checker(&backend, CravenConfig::default());
        let identity = Identity::new(Uuid::new_v4(), "nobody@craven.test");

        for variant in [
            GateVariant::Customer,
            GateVariant::Onboarding,
            GateVariant::Admin,
            GateVariant::Executive { required_role: None },
            GateVariant::Executive {
                required_role: Some(ExecRole::Cfo),
            },
        ] {
            assert_eq!(
                checker.check(&variant, &identity).await,
                Err(GateError::NotAuthorized),
                "{} should deny",
                variant
            );
        }
    }

    #[tokio::test]
    async fn test_superuser_from_allow_list_or_role_row() {
        let backend = Arc::new(MemoryBackend::new());
        let checker = checker(&backend, CravenConfig::default().with_superuser("owner@craven.test"));

        let owner = Identity::new(Uuid::new_v4(), "Owner@Craven.test");
        assert!(checker.check(&GateVariant::Customer, &owner).await.is_ok());
        assert!(checker.check(&GateVariant::Admin, &owner).await.is_ok());
        assert!(checker.check(&GateVariant::Onboarding, &owner).await.is_ok());

        // Lookalike addresses get nothing
        let lookalike = Identity::new(Uuid::new_v4(), "owner@craven.test.example.com");
        assert!(checker.check(&GateVariant::Admin, &lookalike).await.is_err());

        let stored = Identity::new(Uuid::new_v4(), "ops@craven.test");
        backend.grant_role(stored.id, Role::Superuser).await;
        assert!(checker.check(&GateVariant::Admin, &stored).await.is_ok());
        assert!(checker.has_exec_role(&stored, ExecRole::Cfo).await);
    }

    #[tokio::test]
    async fn test_application_status_and_onboarding() {
        let backend = Arc::new(MemoryBackend::new());
        let checker = checker(&backend, CravenConfig::default());
        let identity = Identity::new(Uuid::new_v4(), "driver@craven.test");

        backend
            .put_application(ApplicationRecord {
                user_id: identity.id,
                status: ApplicationStatus::Pending,
                onboarding_completed_at: None,
            })
            .await;
        assert_eq!(
            checker.check(&GateVariant::Customer, &identity).await,
            Err(GateError::NotAuthorized)
        );

        backend
            .put_application(ApplicationRecord {
                user_id: identity.id,
                status: ApplicationStatus::Approved,
                onboarding_completed_at: None,
            })
            .await;
        assert!(checker.check(&GateVariant::Customer, &identity).await.is_ok());
        assert_eq!(
            checker.check(&GateVariant::Onboarding, &identity).await,
            Err(GateError::IncompleteOnboarding)
        );

        backend
            .put_application(ApplicationRecord {
                user_id: identity.id,
                status: ApplicationStatus::Approved,
                onboarding_completed_at: Some(Utc::now()),
            })
            .await;
        assert!(checker.check(&GateVariant::Onboarding, &identity).await.is_ok());
    }

    #[tokio::test]
    async fn test_exec_required_role() {
        let backend = Arc::new(MemoryBackend::new());
        let checker = checker(&backend, CravenConfig::default());
        let cfo = Identity::new(Uuid::new_v4(), "cfo@craven.test");
        let ceo = Identity::new(Uuid::new_v4(), "ceo@craven.test");
        backend.put_exec_user(exec_record(cfo.id, ExecRole::Cfo)).await;
        backend.put_exec_user(exec_record(ceo.id, ExecRole::Ceo)).await;

        assert!(checker.has_exec_role(&cfo, ExecRole::Cfo).await);
        assert!(!checker.has_exec_role(&cfo, ExecRole::Cto).await);
        assert!(checker.has_exec_role(&ceo, ExecRole::Cto).await);
        assert!(checker
            .check(&GateVariant::Executive { required_role: None }, &cfo)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_exec_derived_from_employee_email() {
        let backend = Arc::new(MemoryBackend::new());
        let checker = checker(&backend, CravenConfig::default());
        let identity = Identity::new(Uuid::new_v4(), "coo@craven.test");
        backend
            .put_employee(EmployeeRecord {
                id: Uuid::new_v4(),
                user_id: None,
                email: None,
                work_email: Some("COO@craven.test".into()),
                position: Some("Chief Operating Officer".into()),
                department: Some("Operations".into()),
            })
            .await;

        let exec = checker.executive_for(&identity).await.unwrap().unwrap();
        assert_eq!(exec.role, ExecRole::Coo);
        assert_eq!(exec.department, "Operations");
        assert!(checker.has_exec_role(&identity, ExecRole::Coo).await);
        assert!(!checker.has_exec_role(&identity, ExecRole::Ceo).await);
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_closed() {
        let backend = Arc::new(MemoryBackend::new());
        let checker = checker(&backend, CravenConfig::default());
        let identity = Identity::new(Uuid::new_v4(), "x@craven.test");
        backend.grant_role(identity.id, Role::Admin).await;
        backend.set_fail_lookups(true);

        assert!(matches!(
            checker.check(&GateVariant::Admin, &identity).await,
            Err(GateError::LookupFailed(_))
        ));
        // The business portal performs no lookups
        assert!(checker.check(&GateVariant::BusinessPortal, &identity).await.is_ok());
    }
}
