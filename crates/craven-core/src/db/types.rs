//! Fixture file format and store statistics

use serde::{Deserialize, Serialize};

use crate::types::{
    ApplicationRecord, DriverProfile, EmployeeRecord, ExecUserRecord, FeatureFlag, RoleAssignment,
};

/// Contents of a fixture file (`craven seed <file.json>`); every table optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureSeed {
    #[serde(default)]
    pub applications: Vec<ApplicationRecord>,
    #[serde(default)]
    pub roles: Vec<RoleAssignment>,
    #[serde(default)]
    pub exec_users: Vec<ExecUserRecord>,
    #[serde(default)]
    pub employees: Vec<EmployeeRecord>,
    #[serde(default)]
    pub driver_profiles: Vec<DriverProfile>,
    #[serde(default)]
    pub feature_flags: Vec<FeatureFlag>,
}

impl FixtureSeed {
    pub fn record_count(&self) -> usize {
        self.applications.len()
            + self.roles.len()
            + self.exec_users.len()
            + self.employees.len()
            + self.driver_profiles.len()
            + self.feature_flags.len()
    }
}

/// Row counts per fixture table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureStats {
    pub applications: usize,
    pub roles: usize,
    pub exec_users: usize,
    pub employees: usize,
    pub driver_profiles: usize,
    pub feature_flags: usize,
    pub prefs: usize,
}
