//! Static role directory loaded from YAML.
//!
//! ```yaml
//! roles:
//!   finance: [u-fin-1, u-fin-2]
//!   procurement_manager: [u-pm]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::ports::RoleDirectory;

#[derive(Debug, Default, Deserialize)]
struct RoleFile {
    #[serde(default)]
    roles: BTreeMap<String, Vec<String>>,
}

/// Role membership held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticRoleDirectory {
    members: BTreeMap<String, BTreeSet<String>>,
}

impl StaticRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, role: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.members
            .entry(role.into())
            .or_default()
            .insert(user_id.into());
        self
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let file: RoleFile = serde_yaml::from_str(yaml).context("invalid role directory YAML")?;
        let members = file
            .roles
            .into_iter()
            .map(|(role, users)| (role, users.into_iter().collect()))
            .collect();
        Ok(Self { members })
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading role directory {}", path.display()))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn role_count(&self) -> usize {
        self.members.len()
    }
}

#[async_trait]
impl RoleDirectory for StaticRoleDirectory {
    async fn roles_of(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .members
            .iter()
            .filter(|(_, users)| users.contains(user_id))
            .map(|(role, _)| role.clone())
            .collect())
    }

    async fn members_of(&self, role: &str) -> Result<Vec<String>> {
        Ok(self
            .members
            .get(role)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default())
    }
}
