//! Target descriptors and the persisted default target.
//!
//! A target is an already-resolved endpoint: the Proxmox host address plus,
//! optionally, the id of an LXC container on that host. Discovery of which
//! container a run applies to is the caller's concern, not this crate's.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::paths;
use crate::template::ExecuteOn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, container_id: Option<String>) -> Self {
        Self {
            host: host.into(),
            port,
            container_id,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::target_invalid("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::target_invalid("port must be non-zero"));
        }
        if let Some(id) = &self.container_id {
            if id.trim().is_empty() {
                return Err(Error::target_invalid("containerId must not be empty when set"));
            }
        }
        Ok(())
    }

    /// Whether commands with the given placement can run against this target.
    pub fn reaches(&self, execute_on: ExecuteOn) -> bool {
        match execute_on {
            ExecuteOn::Proxmox => true,
            ExecuteOn::Lxc => self.container_id.is_some(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.container_id {
            Some(id) => write!(f, "{}:{} (lxc {})", self.host, self.port, id),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Load the persisted default target from the config directory.
pub fn load() -> Result<Target> {
    let path = paths::target_json()?;
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<Target> {
    if !path.exists() {
        return Err(Error::target_not_configured());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("read {}", path.display()))))?;
    let target: Target = serde_json::from_str(&content)
        .map_err(|e| Error::validation_invalid_json(e, Some(format!("parse {}", path.display()))))?;
    target.validate()?;
    Ok(target)
}

/// Persist the default target, creating the config directory if needed.
pub fn save(target: &Target) -> Result<()> {
    target.validate()?;
    let path = paths::target_json()?;
    save_to(target, &path)
}

pub fn save_to(target: &Target, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("create {}", parent.display())))
        })?;
    }
    let content = serde_json::to_string_pretty(target)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize target".to_string())))?;
    std::fs::write(path, content)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("write {}", path.display()))))
}
