//! Appliance software version.

use semver::Version;
use serde::Deserialize;

use super::{Connection, RestError, decode};

const PRODUCT_PREFIX: &str = "Qumulo Core ";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "revision_id")]
    pub revision: String,
}

impl VersionInfo {
    /// Parse `"Qumulo Core X.Y.Z"` into a semantic version.
    pub fn semantic_version(&self) -> Result<Version, RestError> {
        let number = self
            .revision
            .strip_prefix(PRODUCT_PREFIX)
            .ok_or_else(|| RestError::Version(format!("{:?}", self.revision)))?;
        Version::parse(number).map_err(|e| RestError::Version(format!("{:?}: {e}", self.revision)))
    }
}

impl Connection {
    pub async fn version_info(&mut self) -> Result<VersionInfo, RestError> {
        let response = self.get("/v1/version").await?;
        decode(&response)
    }
}
