//! ============================================================================
//! REST Backend - Hosted record store and auth API
//! ============================================================================
//! Point queries against the platform's REST surface:
//! - GET {api}/rest/v1/{table}?select=*&{column}=eq.{value}&limit=1
//! - GET {api}/auth/v1/user with the session bearer token
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::{AuthEvent, AuthProvider, RecordStore};
use crate::types::{
    ApplicationRecord, DriverProfile, EmployeeRecord, ExecUserRecord, FeatureFlag, Identity,
    RoleAssignment,
};

/// Shared access token of the signed-in session
pub type SessionToken = Arc<RwLock<Option<String>>>;

/// Capacity of the auth event broadcast
const AUTH_EVENT_CAPACITY: usize = 16;

/// `column=eq.value` filter
fn eq(column: &str, value: impl ToString) -> (&str, String) {
    (column, format!("eq.{}", value.to_string()))
}

/// Case-insensitive exact match: `ilike` with the pattern characters
/// (`%`, `_`, `*` and the escape itself) escaped
fn ilike_exact<'a>(column: &'a str, value: &str) -> (&'a str, String) {
    let mut pattern = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_' | '*') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    (column, format!("ilike.{}", pattern))
}

/// Join `path` onto the API base, keeping any base path prefix
fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| anyhow!("Invalid endpoint path '{}': {}", path, e))
}

/// Record store backed by the hosted REST API
pub struct RestRecordStore {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
    session: SessionToken,
}

impl RestRecordStore {
    pub fn new(api_url: &str, anon_key: &str, session: SessionToken) -> Result<Self> {
        let base = Url::parse(api_url).map_err(|e| anyhow!("Invalid API URL '{}': {}", api_url, e))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            anon_key: anon_key.to_string(),
            session,
        })
    }

    /// Build the query URL for `table`; each filter is `(column, "op.value")`
    fn table_url(&self, table: &str, filters: &[(&str, String)], limit: Option<usize>) -> Result<Url> {
        let mut url = endpoint(&self.base, &format!("rest/v1/{}", table))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            for (column, condition) in filters {
                query.append_pair(column, condition);
            }
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        limit: Option<usize>,
    ) -> Result<Vec<T>> {
        let url = self.table_url(table, filters, limit)?;
        debug!("Querying {}", url);

        let bearer = self
            .session
            .read()
            .await
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());

        let response = self
            .client
            .get(url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| anyhow!("Failed to query {}: {}", table, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Record store error {} on {}: {}", status, table, body));
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| anyhow!("Failed to parse {} rows: {}", table, e))
    }

    async fn fetch_one<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Option<T>> {
        Ok(self.fetch_rows(table, filters, Some(1)).await?.into_iter().next())
    }
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn application_for(&self, user_id: Uuid) -> Result<Option<ApplicationRecord>> {
        self.fetch_one("craver_applications", &[eq("user_id", user_id)])
            .await
    }

    async fn roles_for(&self, user_id: Uuid) -> Result<Vec<RoleAssignment>> {
        self.fetch_rows("user_roles", &[eq("user_id", user_id)], None)
            .await
    }

    async fn exec_user_for(&self, user_id: Uuid) -> Result<Option<ExecUserRecord>> {
        self.fetch_one("exec_users", &[eq("user_id", user_id)])
            .await
    }

    async fn employee_for_user(&self, user_id: Uuid) -> Result<Option<EmployeeRecord>> {
        self.fetch_one("employees", &[eq("user_id", user_id)])
            .await
    }

    async fn employee_by_email(&self, email: &str) -> Result<Option<EmployeeRecord>> {
        // Two sequential point queries: personal email, then work email
        let email = email.trim();
        if let Some(found) = self
            .fetch_one::<EmployeeRecord>("employees", &[ilike_exact("email", email)])
            .await?
        {
            return Ok(Some(found));
        }
        self.fetch_one("employees", &[ilike_exact("work_email", email)])
            .await
    }

    async fn driver_profile_for(&self, user_id: Uuid) -> Result<Option<DriverProfile>> {
        self.fetch_one("driver_profiles", &[eq("user_id", user_id)])
            .await
    }

    async fn feature_flag(&self, key: &str) -> Result<Option<FeatureFlag>> {
        self.fetch_one("feature_flags", &[eq("key", key)])
            .await
    }
}

/// User payload returned by the auth API
#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

/// Auth provider backed by the hosted auth API
pub struct RestAuthProvider {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
    session: SessionToken,
    events: broadcast::Sender<AuthEvent>,
}

impl RestAuthProvider {
    pub fn new(api_url: &str, anon_key: &str) -> Result<Self> {
        let base = Url::parse(api_url).map_err(|e| anyhow!("Invalid API URL '{}': {}", api_url, e))?;
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            anon_key: anon_key.to_string(),
            session: Arc::new(RwLock::new(None)),
            events,
        })
    }

    /// Token handle shared with the record store
    pub fn session(&self) -> SessionToken {
        self.session.clone()
    }

    /// Adopt an access token issued by the auth API and announce the sign-in
    pub async fn sign_in_with_token(&self, access_token: &str) -> Result<Identity> {
        *self.session.write().await = Some(access_token.to_string());

        match self.current_identity().await {
            Ok(Some(identity)) => {
                info!("Signed in as {}", identity.id);
                let _ = self.events.send(AuthEvent::SignedIn(identity.clone()));
                Ok(identity)
            }
            Ok(None) => {
                *self.session.write().await = None;
                Err(anyhow!("Access token was rejected"))
            }
            Err(e) => {
                *self.session.write().await = None;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl AuthProvider for RestAuthProvider {
    async fn current_identity(&self) -> Result<Option<Identity>> {
        let token = match self.session.read().await.clone() {
            Some(token) => token,
            None => return Ok(None),
        };

        let url = endpoint(&self.base, "auth/v1/user")?;
        let response = self
            .client
            .get(url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| anyhow!("Failed to fetch current user: {}", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            debug!("Session token no longer valid ({})", status);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Auth API error {}: {}", status, body));
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse auth user: {}", e))?;

        Ok(Some(Identity {
            id: user.id,
            email: user.email,
        }))
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<()> {
        let token = self.session.write().await.take();

        if let Some(token) = token {
            let url = endpoint(&self.base, "auth/v1/logout")?;
            let result = self
                .client
                .post(url)
                .header("apikey", &self.anon_key)
                .header("Authorization", format!("Bearer {}", token))
                .send()
                .await;
            if let Err(e) = result {
                // Local session is already gone; the server token expires on its own
                warn!("Logout request failed: {}", e);
            }
        }

        let _ = self.events.send(AuthEvent::SignedOut);
        info!("Signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url() {
        let store = RestRecordStore::new(
            "https://abc.craven.test",
            "anon",
            Arc::new(RwLock::new(None)),
        )
        .unwrap();
        let id = Uuid::nil();
        let url = store
            .table_url("user_roles", &[eq("user_id", id)], Some(1))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.craven.test/rest/v1/user_roles?select=*&user_id=eq.00000000-0000-0000-0000-000000000000&limit=1"
        );
    }

    #[test]
    fn test_employee_email_lookup_is_case_insensitive() {
        assert_eq!(
            ilike_exact("email", "Jo@Example.com"),
            ("email", "ilike.Jo@Example.com".to_string())
        );
        assert_eq!(
            ilike_exact("work_email", "jo_smith%1*@x.test").1,
            "ilike.jo\\_smith\\%1\\*@x.test"
        );

        let store = RestRecordStore::new(
            "https://abc.craven.test",
            "anon",
            Arc::new(RwLock::new(None)),
        )
        .unwrap();
        let url = store
            .table_url("employees", &[ilike_exact("email", "Jo_Smith@Example.com")], Some(1))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.craven.test/rest/v1/employees?select=*&email=ilike.Jo%5C_Smith%40Example.com&limit=1"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("https://gateway.craven.test/platform").unwrap();
        assert_eq!(
            endpoint(&base, "/auth/v1/user").unwrap().as_str(),
            "https://gateway.craven.test/platform/auth/v1/user"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RestAuthProvider::new("not a url", "anon").is_err());
    }

    #[tokio::test]
    async fn test_no_session_means_no_identity() {
        let auth = RestAuthProvider::new("https://abc.craven.test", "anon").unwrap();
        assert!(auth.current_identity().await.unwrap().is_none());
    }
}
