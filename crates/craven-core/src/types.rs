//! ============================================================================
//! Core Types for Craven Access
//! ============================================================================
//! Typed records as read from the hosted store, one struct per table.
//! Nothing here is owned by this crate: the application-review, role
//! management and delivery-completion workflows write these rows.
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Authenticated principal as reported by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: Some(email.into()),
        }
    }

    /// Email normalized for comparisons (trimmed, lowercase)
    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
    }
}

// ============================================================================
// Applications
// ============================================================================

/// Review status of a Craver/customer application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

/// One application row per identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub user_id: Uuid,
    pub status: ApplicationStatus,
    /// Only meaningful once `status` is approved
    #[serde(default)]
    pub onboarding_completed_at: Option<DateTime<Utc>>,
}

impl ApplicationRecord {
    pub fn is_onboarding_complete(&self) -> bool {
        self.is_approved() && self.onboarding_completed_at.is_some()
    }
}

/// Capability used by gates that only care whether a record is approved
pub trait HasStatus {
    fn is_approved(&self) -> bool;
}

impl HasStatus for ApplicationRecord {
    fn is_approved(&self) -> bool {
        self.status == ApplicationStatus::Approved
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Platform role stored in `user_roles`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    /// Passes every gate predicate
    Superuser,
    Executive,
    Customer,
    Driver,
    Restaurant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Superuser => "superuser",
            Role::Executive => "executive",
            Role::Customer => "customer",
            Role::Driver => "driver",
            Role::Restaurant => "restaurant",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "superuser" => Ok(Role::Superuser),
            "executive" => Ok(Role::Executive),
            "customer" => Ok(Role::Customer),
            "driver" | "craver" => Ok(Role::Driver),
            "restaurant" | "merchant" => Ok(Role::Restaurant),
            other => anyhow::bail!("Unknown role '{}'", other),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of `user_roles`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: Uuid,
    pub role: Role,
}

// ============================================================================
// Executives
// ============================================================================

/// Executive role stored in `exec_users`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecRole {
    Ceo,
    BoardMember,
    Chairperson,
    Cfo,
    Coo,
    Cto,
    Executive,
}

impl ExecRole {
    /// `ceo` passes every role check
    pub fn satisfies(&self, required: ExecRole) -> bool {
        *self == required || *self == ExecRole::Ceo
    }

    /// Board-level roles
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            ExecRole::Ceo | ExecRole::BoardMember | ExecRole::Chairperson
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecRole::Ceo => "ceo",
            ExecRole::BoardMember => "board_member",
            ExecRole::Chairperson => "chairperson",
            ExecRole::Cfo => "cfo",
            ExecRole::Coo => "coo",
            ExecRole::Cto => "cto",
            ExecRole::Executive => "executive",
        }
    }

    /// Derive an executive role from an employee job title.
    /// Non-executive positions return None.
    pub fn from_position(position: &str) -> Option<Self> {
        let p = position.trim().to_lowercase();
        if p.is_empty() {
            return None;
        }

        let exact = match p.as_str() {
            "ceo" => Some(ExecRole::Ceo),
            "cfo" => Some(ExecRole::Cfo),
            "coo" => Some(ExecRole::Coo),
            "cto" => Some(ExecRole::Cto),
            _ => None,
        };
        if exact.is_some() {
            return exact;
        }

        if p.contains("chief executive") {
            Some(ExecRole::Ceo)
        } else if p.contains("chief financial") {
            Some(ExecRole::Cfo)
        } else if p.contains("chief operating") {
            Some(ExecRole::Coo)
        } else if p.contains("chief technology") || p.contains("chief technical") {
            Some(ExecRole::Cto)
        } else if p.contains("chairman") || p.contains("chairperson") || p.contains("chairwoman") {
            Some(ExecRole::Chairperson)
        } else if p.contains("board member") || p.contains("board director") {
            Some(ExecRole::BoardMember)
        } else if p.starts_with("chief ") || is_c_level_abbreviation(&p) {
            Some(ExecRole::Executive)
        } else {
            None
        }
    }
}

/// Three-letter C-suite abbreviations like "cmo" or "cio"
fn is_c_level_abbreviation(position: &str) -> bool {
    let bytes = position.as_bytes();
    bytes.len() == 3
        && bytes.first() == Some(&b'c')
        && bytes.last() == Some(&b'o')
        && bytes.iter().all(u8::is_ascii_lowercase)
}

impl FromStr for ExecRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ceo" => Ok(ExecRole::Ceo),
            "board_member" | "board-member" => Ok(ExecRole::BoardMember),
            "chairperson" | "chairman" => Ok(ExecRole::Chairperson),
            "cfo" => Ok(ExecRole::Cfo),
            "coo" => Ok(ExecRole::Coo),
            "cto" => Ok(ExecRole::Cto),
            "executive" => Ok(ExecRole::Executive),
            other => anyhow::bail!(
                "Unknown executive role '{}'. Valid values: ceo, board_member, chairperson, cfo, coo, cto, executive",
                other
            ),
        }
    }
}

impl fmt::Display for ExecRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of `exec_users`; at most one per identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecUserRecord {
    pub user_id: Uuid,
    pub role: ExecRole,
    pub access_level: i32,
    pub title: String,
    pub department: String,
}

/// Row of `employees`, consulted when no exec row exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub work_email: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

impl EmployeeRecord {
    pub fn derived_exec_role(&self) -> Option<ExecRole> {
        self.position.as_deref().and_then(ExecRole::from_position)
    }

    /// Case-insensitive match on either personal or work email
    pub fn matches_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        [self.email.as_deref(), self.work_email.as_deref()]
            .into_iter()
            .flatten()
            .any(|e| e.trim().to_lowercase() == email)
    }

    /// Exec view of this employee, used when the exec row is missing
    pub fn as_exec_user(&self, user_id: Uuid) -> Option<ExecUserRecord> {
        let role = self.derived_exec_role()?;
        Some(ExecUserRecord {
            user_id,
            role,
            access_level: 5,
            title: self
                .position
                .clone()
                .unwrap_or_else(|| role.as_str().to_uppercase()),
            department: self
                .department
                .clone()
                .unwrap_or_else(|| "Executive".to_string()),
        })
    }
}

// ============================================================================
// Drivers
// ============================================================================

/// Stored reward tier on the driver profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RatingTier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl RatingTier {
    pub fn display_name(&self) -> &'static str {
        match self {
            RatingTier::Bronze => "Bronze",
            RatingTier::Silver => "Silver",
            RatingTier::Gold => "Gold",
            RatingTier::Diamond => "Diamond",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            RatingTier::Bronze => "🥉",
            RatingTier::Silver => "🥈",
            RatingTier::Gold => "🥇",
            RatingTier::Diamond => "💎",
        }
    }
}

/// Subset of `driver_profiles` read by the dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub user_id: Uuid,
    #[serde(default)]
    pub rating_tier: RatingTier,
    #[serde(default)]
    pub diamond_points: u32,
    #[serde(default)]
    pub acceptance_rate: f64,
    #[serde(default)]
    pub completed_orders: u32,
    #[serde(default)]
    pub rating: f64,
}

/// Row of `feature_flags`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub key: String,
    pub enabled: bool,
}
