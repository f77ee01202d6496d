//! Read-only access to a previously collected account snapshot.
//!
//! Collection happens elsewhere; this module only looks up the JSON response
//! captured for an `(account, region, service, operation)` call. A missing
//! file means the call was never collected or returned nothing, which is
//! "no data", never a failure.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::AuditError;

/// The contract the engine depends on.
pub trait SnapshotSource {
    /// The region names captured for an account. The region listing is the
    /// one file the engine cannot do without; missing or malformed is fatal.
    fn regions(&self, account: &str) -> Result<Vec<String>, AuditError>;

    /// The captured response for a service/operation call, or `None` if the
    /// call was never collected.
    fn query(&self, account: &str, region: &str, service: &str, operation: &str) -> Option<Value>;

    /// The captured response for a per-resource detail call, e.g. the
    /// describe for one named search domain. `None` most commonly means the
    /// resource has no such configuration.
    fn query_param(
        &self,
        account: &str,
        region: &str,
        service: &str,
        operation: &str,
        parameter: &str,
    ) -> Option<Value>;
}

/// Directory-backed snapshot layout:
///
/// ```text
/// <root>/<account>/describe-regions.json
/// <root>/<account>/<region>/<service>-<operation>.json
/// <root>/<account>/<region>/<service>-<operation>/<parameter>.json
/// ```
pub struct DirSnapshot {
    root: PathBuf,
}

impl DirSnapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_optional(&self, path: &Path) -> Option<Value> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => {
                debug!("No snapshot file at {}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping unparseable snapshot file {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl SnapshotSource for DirSnapshot {
    fn regions(&self, account: &str) -> Result<Vec<String>, AuditError> {
        let path = self.root.join(account).join("describe-regions.json");
        let content = fs::read_to_string(&path).map_err(|e| AuditError::RegionListing {
            account: account.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        let value: Value =
            serde_json::from_str(&content).map_err(|e| AuditError::RegionListing {
                account: account.to_string(),
                reason: format!("{}: {}", path.display(), e),
            })?;

        let regions = value
            .get("Regions")
            .and_then(Value::as_array)
            .ok_or_else(|| AuditError::RegionListing {
                account: account.to_string(),
                reason: format!("{}: no 'Regions' array", path.display()),
            })?
            .iter()
            .filter_map(|r| r.get("RegionName").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        Ok(regions)
    }

    fn query(&self, account: &str, region: &str, service: &str, operation: &str) -> Option<Value> {
        let path = self
            .root
            .join(account)
            .join(region)
            .join(format!("{}-{}.json", service, operation));
        self.read_optional(&path)
    }

    fn query_param(
        &self,
        account: &str,
        region: &str,
        service: &str,
        operation: &str,
        parameter: &str,
    ) -> Option<Value> {
        let path = self
            .root
            .join(account)
            .join(region)
            .join(format!("{}-{}", service, operation))
            .join(format!("{}.json", parameter));
        self.read_optional(&path)
    }
}
