//! ============================================================================
//! Configuration - Environment-driven settings
//! ============================================================================
//! Values come from process environment (optionally a `.env` file loaded
//! with dotenvy). `Default` is environment-free so tests stay hermetic.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Default duration of the points highlight
pub const DEFAULT_POINTS_HIGHLIGHT_MS: u64 = 1000;

/// Routes a gate may redirect to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRoutes {
    pub login: String,
    pub business_login: String,
    pub onboarding: String,
    pub application_status: String,
    pub exec_hub: String,
}

impl Default for GateRoutes {
    fn default() -> Self {
        Self {
            login: "/auth".to_string(),
            business_login: "/business/auth".to_string(),
            onboarding: "/onboarding".to_string(),
            application_status: "/application-status".to_string(),
            exec_hub: "/hub".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CravenConfig {
    /// Base URL of the hosted database/auth platform
    pub api_url: Option<String>,
    /// Public (anon) API key sent with every request
    pub anon_key: Option<String>,
    /// Emails granted the superuser role (lowercase)
    pub superuser_emails: Vec<String>,
    /// Local fixture database path override
    pub db_path: Option<PathBuf>,
    pub routes: GateRoutes,
    pub points_highlight: Duration,
}

impl Default for CravenConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            anon_key: None,
            superuser_emails: Vec::new(),
            db_path: None,
            routes: GateRoutes::default(),
            points_highlight: Duration::from_millis(DEFAULT_POINTS_HIGHLIGHT_MS),
        }
    }
}

impl CravenConfig {
    /// Build from environment variables, loading `.env` first if present
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file loaded: {}", e);
        }

        let mut config = Self {
            api_url: std::env::var("CRAVEN_API_URL").ok(),
            anon_key: std::env::var("CRAVEN_ANON_KEY").ok(),
            superuser_emails: std::env::var("CRAVEN_SUPERUSER_EMAILS")
                .map(|v| parse_email_list(&v))
                .unwrap_or_default(),
            db_path: std::env::var("CRAVEN_DB_PATH").ok().map(PathBuf::from),
            ..Self::default()
        };

        if let Ok(route) = std::env::var("CRAVEN_LOGIN_ROUTE") {
            config.routes.login = route;
        }
        if let Ok(route) = std::env::var("CRAVEN_ONBOARDING_ROUTE") {
            config.routes.onboarding = route;
        }
        if let Ok(raw) = std::env::var("CRAVEN_POINTS_HIGHLIGHT_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => config.points_highlight = Duration::from_millis(ms),
                Err(e) => warn!(
                    "Ignoring CRAVEN_POINTS_HIGHLIGHT_MS={}: {} - using {}ms",
                    raw, e, DEFAULT_POINTS_HIGHLIGHT_MS
                ),
            }
        }

        config
    }

    /// Add an email to the superuser allow-list
    pub fn with_superuser(mut self, email: &str) -> Self {
        self.superuser_emails.extend(parse_email_list(email));
        self
    }

    /// Exact, case-insensitive allow-list membership
    pub fn is_superuser_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        !email.is_empty() && self.superuser_emails.iter().any(|e| *e == email)
    }
}

/// Parse a comma separated list of emails, normalized to lowercase
fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
