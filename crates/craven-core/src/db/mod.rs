// ============================================================================
// FixtureDb — Embedded fixture store (redb)
// ============================================================================
// Offline stand-in for the hosted record store, used by the CLI and for
// local development. Also backs SafeStorage through its prefs table.
// Default path: ~/.craven/fixtures.redb (override via CRAVEN_DB_PATH env var)
// ============================================================================

pub mod types;

pub use types::{FixtureSeed, FixtureStats};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redb::{Database, TableDefinition, TableHandle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::RecordStore;
use crate::storage::KeyValueStorage;
use crate::types::{
    ApplicationRecord, DriverProfile, EmployeeRecord, ExecUserRecord, FeatureFlag, Role,
    RoleAssignment,
};

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

// Table definitions
const APPLICATIONS: Table = TableDefinition::new("applications");
const USER_ROLES: Table = TableDefinition::new("user_roles");
const EXEC_USERS: Table = TableDefinition::new("exec_users");
const EMPLOYEES: Table = TableDefinition::new("employees");
const DRIVER_PROFILES: Table = TableDefinition::new("driver_profiles");
const FEATURE_FLAGS: Table = TableDefinition::new("feature_flags");
const PREFS: Table = TableDefinition::new("prefs");

const ALL_TABLES: [Table; 7] = [
    APPLICATIONS,
    USER_ROLES,
    EXEC_USERS,
    EMPLOYEES,
    DRIVER_PROFILES,
    FEATURE_FLAGS,
    PREFS,
];

fn role_key(user_id: Uuid, role: Role) -> String {
    format!("{}:{}", user_id, role.as_str())
}

/// Embedded fixture database
pub struct FixtureDb {
    db: Database,
    path: PathBuf,
}

impl FixtureDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses CRAVEN_DB_PATH env var or ~/.craven/fixtures.redb
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            p.to_path_buf()
        } else if let Ok(env_path) = std::env::var("CRAVEN_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let craven_dir = home.join(".craven");
            std::fs::create_dir_all(&craven_dir)
                .map_err(|e| anyhow!("Failed to create .craven directory: {}", e))?;
            craven_dir.join("fixtures.redb")
        };

        info!("Opening fixture database at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open fixture database: {}", e))?;

        // Ensure tables exist so reads never hit a missing table
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        for table in ALL_TABLES {
            write_txn
                .open_table(table)
                .map_err(|e| anyhow!("Failed to create {} table: {}", table.name(), e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Raw table access
    // ========================================================================

    fn put_bytes(&self, table: Table, key: &str, value: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut t = write_txn.open_table(table)
                .map_err(|e| anyhow!("Failed to open {} table: {}", table.name(), e))?;
            t.insert(key, value)
                .map_err(|e| anyhow!("Failed to insert into {}: {}", table.name(), e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;
        Ok(())
    }

    fn get_bytes(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let t = read_txn.open_table(table)
            .map_err(|e| anyhow!("Failed to open {} table: {}", table.name(), e))?;
        let value = t
            .get(key)
            .map_err(|e| anyhow!("Failed to read {} from {}: {}", key, table.name(), e))?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn delete(&self, table: Table, key: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed = {
            let mut t = write_txn.open_table(table)
                .map_err(|e| anyhow!("Failed to open {} table: {}", table.name(), e))?;
            let removed = t
                .remove(key)
                .map_err(|e| anyhow!("Failed to delete from {}: {}", table.name(), e))?;
            removed.is_some()
        };
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;
        Ok(removed)
    }

    fn store<T: Serialize>(&self, table: Table, key: &str, record: &T) -> Result<()> {
        let value = bincode::serialize(record)
            .map_err(|e| anyhow!("Failed to serialize {} row: {}", table.name(), e))?;
        self.put_bytes(table, key, &value)?;
        debug!("Stored {} row {}", table.name(), key);
        Ok(())
    }

    fn load<T: DeserializeOwned>(&self, table: Table, key: &str) -> Result<Option<T>> {
        match self.get_bytes(table, key)? {
            Some(bytes) => {
                let record = bincode::deserialize(&bytes)
                    .map_err(|e| anyhow!("Failed to deserialize {} row: {}", table.name(), e))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn list<T: DeserializeOwned>(&self, table: Table) -> Result<Vec<T>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let t = read_txn.open_table(table)
            .map_err(|e| anyhow!("Failed to open {} table: {}", table.name(), e))?;

        let mut results = Vec::new();
        let iter = t.range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate {}: {}", table.name(), e))?;
        for entry in iter {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let record: T = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize {} row: {}", table.name(), e))?;
            results.push(record);
        }
        Ok(results)
    }

    fn count(&self, table: Table) -> Result<usize> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let t = read_txn.open_table(table)
            .map_err(|e| anyhow!("Failed to open {} table: {}", table.name(), e))?;
        let count = t.range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate {}: {}", table.name(), e))?
            .count();
        Ok(count)
    }

    // ========================================================================
    // Record Operations
    // ========================================================================

    pub fn put_application(&self, record: &ApplicationRecord) -> Result<()> {
        self.store(APPLICATIONS, &record.user_id.to_string(), record)
    }

    pub fn put_role(&self, assignment: &RoleAssignment) -> Result<()> {
        self.store(USER_ROLES, &role_key(assignment.user_id, assignment.role), assignment)
    }

    pub fn remove_role(&self, user_id: Uuid, role: Role) -> Result<bool> {
        self.delete(USER_ROLES, &role_key(user_id, role))
    }

    pub fn put_exec_user(&self, record: &ExecUserRecord) -> Result<()> {
        self.store(EXEC_USERS, &record.user_id.to_string(), record)
    }

    pub fn put_employee(&self, record: &EmployeeRecord) -> Result<()> {
        self.store(EMPLOYEES, &record.id.to_string(), record)
    }

    pub fn put_driver_profile(&self, profile: &DriverProfile) -> Result<()> {
        self.store(DRIVER_PROFILES, &profile.user_id.to_string(), profile)
    }

    pub fn put_feature_flag(&self, flag: &FeatureFlag) -> Result<()> {
        self.store(FEATURE_FLAGS, &flag.key, flag)
    }

    pub fn list_driver_profiles(&self) -> Result<Vec<DriverProfile>> {
        self.list(DRIVER_PROFILES)
    }

    // ========================================================================
    // Seeding and export
    // ========================================================================

    /// Upsert every record of `seed`; returns how many were written
    pub fn seed(&self, seed: &FixtureSeed) -> Result<usize> {
        for record in &seed.applications {
            self.put_application(record)?;
        }
        for assignment in &seed.roles {
            self.put_role(assignment)?;
        }
        for record in &seed.exec_users {
            self.put_exec_user(record)?;
        }
        for record in &seed.employees {
            self.put_employee(record)?;
        }
        for profile in &seed.driver_profiles {
            self.put_driver_profile(profile)?;
        }
        for flag in &seed.feature_flags {
            self.put_feature_flag(flag)?;
        }

        let written = seed.record_count();
        info!("Seeded {} fixture records", written);
        Ok(written)
    }

    /// Every record, in fixture-file shape
    pub fn export(&self) -> Result<FixtureSeed> {
        Ok(FixtureSeed {
            applications: self.list(APPLICATIONS)?,
            roles: self.list(USER_ROLES)?,
            exec_users: self.list(EXEC_USERS)?,
            employees: self.list(EMPLOYEES)?,
            driver_profiles: self.list(DRIVER_PROFILES)?,
            feature_flags: self.list(FEATURE_FLAGS)?,
        })
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<FixtureStats> {
        Ok(FixtureStats {
            applications: self.count(APPLICATIONS)?,
            roles: self.count(USER_ROLES)?,
            exec_users: self.count(EXEC_USERS)?,
            employees: self.count(EMPLOYEES)?,
            driver_profiles: self.count(DRIVER_PROFILES)?,
            feature_flags: self.count(FEATURE_FLAGS)?,
            prefs: self.count(PREFS)?,
        })
    }
}

#[async_trait]
impl RecordStore for FixtureDb {
    async fn application_for(&self, user_id: Uuid) -> Result<Option<ApplicationRecord>> {
        self.load(APPLICATIONS, &user_id.to_string())
    }

    async fn roles_for(&self, user_id: Uuid) -> Result<Vec<RoleAssignment>> {
        let roles: Vec<RoleAssignment> = self.list(USER_ROLES)?;
        Ok(roles.into_iter().filter(|r| r.user_id == user_id).collect())
    }

    async fn exec_user_for(&self, user_id: Uuid) -> Result<Option<ExecUserRecord>> {
        self.load(EXEC_USERS, &user_id.to_string())
    }

    async fn employee_for_user(&self, user_id: Uuid) -> Result<Option<EmployeeRecord>> {
        let employees: Vec<EmployeeRecord> = self.list(EMPLOYEES)?;
        Ok(employees.into_iter().find(|e| e.user_id == Some(user_id)))
    }

    async fn employee_by_email(&self, email: &str) -> Result<Option<EmployeeRecord>> {
        let employees: Vec<EmployeeRecord> = self.list(EMPLOYEES)?;
        Ok(employees.into_iter().find(|e| e.matches_email(email)))
    }

    async fn driver_profile_for(&self, user_id: Uuid) -> Result<Option<DriverProfile>> {
        self.load(DRIVER_PROFILES, &user_id.to_string())
    }

    async fn feature_flag(&self, key: &str) -> Result<Option<FeatureFlag>> {
        self.load(FEATURE_FLAGS, key)
    }
}

impl KeyValueStorage for FixtureDb {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.get_bytes(PREFS, key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| anyhow!("Pref {} is not UTF-8: {}", key, e)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.put_bytes(PREFS, key, value.as_bytes())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.delete(PREFS, key).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SafeStorage;
    use crate::types::{ApplicationStatus, ExecRole};
    use chrono::Utc;
    use std::sync::Arc;

    struct TempDb {
        db: FixtureDb,
        path: PathBuf,
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn temp_db() -> TempDb {
        let path = std::env::temp_dir().join(format!("craven-fixtures-{}.redb", Uuid::new_v4()));
        TempDb {
            db: FixtureDb::open(Some(&path)).unwrap(),
            path,
        }
    }

    fn seed_for(user: Uuid) -> FixtureSeed {
        FixtureSeed {
            applications: vec![ApplicationRecord {
                user_id: user,
                status: ApplicationStatus::Approved,
                onboarding_completed_at: Some(Utc::now()),
            }],
            roles: vec![RoleAssignment {
                user_id: user,
                role: Role::Admin,
            }],
            exec_users: vec![ExecUserRecord {
                user_id: user,
                role: ExecRole::Cto,
                access_level: 5,
                title: "CTO".into(),
                department: "Technology".into(),
            }],
            employees: vec![],
            driver_profiles: vec![],
            feature_flags: vec![FeatureFlag {
                key: "surge_pricing".into(),
                enabled: true,
            }],
        }
    }

    #[tokio::test]
    async fn test_seed_then_lookup() {
        let tmp = temp_db();
        let user = Uuid::new_v4();
        assert_eq!(tmp.db.seed(&seed_for(user)).unwrap(), 4);

        let app = tmp.db.application_for(user).await.unwrap().unwrap();
        assert!(app.is_onboarding_complete());
        assert_eq!(tmp.db.roles_for(user).await.unwrap().len(), 1);
        assert!(tmp.db.roles_for(Uuid::new_v4()).await.unwrap().is_empty());
        assert_eq!(
            tmp.db.exec_user_for(user).await.unwrap().unwrap().role,
            ExecRole::Cto
        );
        assert!(tmp.db.feature_flag("surge_pricing").await.unwrap().unwrap().enabled);
        assert!(tmp.db.feature_flag("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_role_and_stats() {
        let tmp = temp_db();
        let user = Uuid::new_v4();
        tmp.db.seed(&seed_for(user)).unwrap();

        assert!(tmp.db.remove_role(user, Role::Admin).unwrap());
        assert!(!tmp.db.remove_role(user, Role::Admin).unwrap());
        assert!(tmp.db.roles_for(user).await.unwrap().is_empty());

        let stats = tmp.db.stats().unwrap();
        assert_eq!(stats.applications, 1);
        assert_eq!(stats.roles, 0);
        assert_eq!(stats.exec_users, 1);
    }

    #[test]
    fn test_export_matches_seed() {
        let tmp = temp_db();
        let user = Uuid::new_v4();
        let seed = seed_for(user);
        tmp.db.seed(&seed).unwrap();
        assert_eq!(tmp.db.export().unwrap(), seed);
    }

    #[test]
    fn test_prefs_back_safe_storage() {
        let path = std::env::temp_dir().join(format!("craven-prefs-{}.redb", Uuid::new_v4()));
        let storage = SafeStorage::new(Arc::new(FixtureDb::open(Some(&path)).unwrap()));

        assert!(storage.set("craven.return_to", "/hub"));
        assert_eq!(storage.get("craven.return_to").as_deref(), Some("/hub"));
        assert!(storage.remove("craven.return_to"));
        assert!(storage.get("craven.return_to").is_none());

        drop(storage);
        let _ = std::fs::remove_file(path);
    }
}
