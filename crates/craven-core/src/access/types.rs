//! ============================================================================
//! Access Types - Gate variants, states and outcomes
//! ============================================================================
//! A gate resolves to exactly one `GateState`; the variant decides what the
//! surrounding area does with it (render, fallback or redirect).
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::GateRoutes;
use crate::types::ExecRole;

/// Protected areas of the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVariant {
    /// Customer app; requires an approved application
    Customer,
    /// Driver onboarding flow; approved and onboarding completed
    Onboarding,
    /// Admin dashboard; requires an admin role row
    Admin,
    /// Business portal; any signed-in identity
    BusinessPortal,
    /// Executive portal; an exec record, optionally with a specific role
    Executive { required_role: Option<ExecRole> },
}

impl GateVariant {
    pub fn display_name(&self) -> &'static str {
        match self {
            GateVariant::Customer => "Customer App",
            GateVariant::Onboarding => "Onboarding",
            GateVariant::Admin => "Admin Dashboard",
            GateVariant::BusinessPortal => "Business Portal",
            GateVariant::Executive { .. } => "Executive Portal",
        }
    }

    /// Where a signed-out user is sent
    pub fn login_route<'a>(&self, routes: &'a GateRoutes) -> &'a str {
        match self {
            GateVariant::BusinessPortal => &routes.business_login,
            GateVariant::Executive { .. } => &routes.exec_hub,
            _ => &routes.login,
        }
    }

    /// What the area does in `state`
    pub fn outcome(&self, state: GateState, routes: &GateRoutes) -> GateOutcome {
        match state {
            GateState::Checking => GateOutcome::Loading,
            GateState::Authorized => GateOutcome::Render,
            GateState::Unauthenticated => GateOutcome::Redirect(self.login_route(routes).to_string()),
            GateState::Unauthorized => match self {
                GateVariant::Onboarding => {
                    GateOutcome::Redirect(routes.application_status.clone())
                }
                _ => GateOutcome::Fallback,
            },
            GateState::AuthorizedIncomplete => GateOutcome::Redirect(routes.onboarding.clone()),
        }
    }
}

impl FromStr for GateVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "customer" => Ok(GateVariant::Customer),
            "onboarding" => Ok(GateVariant::Onboarding),
            "admin" => Ok(GateVariant::Admin),
            "business" | "business_portal" | "business-portal" => Ok(GateVariant::BusinessPortal),
            "executive" | "exec" => Ok(GateVariant::Executive { required_role: None }),
            other => anyhow::bail!(
                "Unknown gate '{}'. Valid values: customer, onboarding, admin, business, executive",
                other
            ),
        }
    }
}

impl fmt::Display for GateVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateVariant::Executive {
                required_role: Some(role),
            } => write!(f, "{} ({})", self.display_name(), role),
            _ => f.write_str(self.display_name()),
        }
    }
}

/// Resolution state of a mounted gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Checking,
    Unauthenticated,
    Unauthorized,
    /// Predicate holds but onboarding is unfinished; never renders
    AuthorizedIncomplete,
    Authorized,
}

impl GateState {
    /// Collapse a check result into the state it produces
    pub fn from_check(result: &Result<(), GateError>) -> Self {
        match result {
            Ok(()) => GateState::Authorized,
            Err(GateError::NotAuthenticated) => GateState::Unauthenticated,
            Err(GateError::IncompleteOnboarding) => GateState::AuthorizedIncomplete,
            Err(GateError::NotAuthorized) | Err(GateError::LookupFailed(_)) => {
                GateState::Unauthorized
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        *self != GateState::Checking
    }
}

/// What the protected area should do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "route")]
pub enum GateOutcome {
    /// Loading indicator only
    Loading,
    /// Render the protected children
    Render,
    /// "Access denied" fallback, no navigation
    Fallback,
    Redirect(String),
}

/// Why a gate did not authorize
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("No signed-in identity")]
    NotAuthenticated,

    #[error("Record lookup failed: {0}")]
    LookupFailed(String),

    #[error("Identity is not authorized for this area")]
    NotAuthorized,

    #[error("Onboarding has not been completed")]
    IncompleteOnboarding,
}

impl From<anyhow::Error> for GateError {
    fn from(e: anyhow::Error) -> Self {
        GateError::LookupFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirect(route: &str) -> GateOutcome {
        GateOutcome::Redirect(route.to_string())
    }

    #[test]
    fn test_outcome_matrix() {
        let routes = GateRoutes::default();
        let exec = GateVariant::Executive { required_role: None };

        assert_eq!(GateVariant::Customer.outcome(GateState::Unauthenticated, &routes), redirect("/auth"));
        assert_eq!(GateVariant::Customer.outcome(GateState::Unauthorized, &routes), GateOutcome::Fallback);
        assert_eq!(GateVariant::Admin.outcome(GateState::Unauthorized, &routes), GateOutcome::Fallback);
        assert_eq!(
            GateVariant::Onboarding.outcome(GateState::Unauthorized, &routes),
            redirect("/application-status")
        );
        assert_eq!(
            GateVariant::Onboarding.outcome(GateState::AuthorizedIncomplete, &routes),
            redirect("/onboarding")
        );
        assert_eq!(
            GateVariant::BusinessPortal.outcome(GateState::Unauthenticated, &routes),
            redirect("/business/auth")
        );
        assert_eq!(exec.outcome(GateState::Unauthenticated, &routes), redirect("/hub"));
        assert_eq!(exec.outcome(GateState::Unauthorized, &routes), GateOutcome::Fallback);

        for variant in [GateVariant::Customer, GateVariant::Admin, exec] {
            assert_eq!(variant.outcome(GateState::Checking, &routes), GateOutcome::Loading);
            assert_eq!(variant.outcome(GateState::Authorized, &routes), GateOutcome::Render);
        }
    }

    #[test]
    fn test_lookup_failure_looks_like_denial() {
        let failed = Err(GateError::LookupFailed("timeout".into()));
        let denied = Err(GateError::NotAuthorized);
        assert_eq!(GateState::from_check(&failed), GateState::from_check(&denied));
        assert_eq!(GateState::from_check(&Ok(())), GateState::Authorized);
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!("Admin".parse::<GateVariant>().unwrap(), GateVariant::Admin);
        assert_eq!(
            "business-portal".parse::<GateVariant>().unwrap(),
            GateVariant::BusinessPortal
        );
        assert!("kitchen".parse::<GateVariant>().is_err());
    }
}
