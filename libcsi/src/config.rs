//! Driver and transport configuration.
//!
//! Environment variables:
//! - `QUMULO_CSI_VERIFY_TLS`: set to `1` to verify the appliance certificate.
//!   Defaults to `0`; appliances usually serve a self-signed certificate.
//! - `QUMULO_CSI_CONNECT_TIMEOUT_SECS`: TCP connect timeout in seconds.
//!   Unset or unparsable means no timeout beyond the operating system's.

use std::sync::LazyLock;
use std::time::Duration;

use semver::Version;

use crate::types::{AccessMode, ControllerCapability};

/// HTTP client settings shared by every appliance connection.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Verify the appliance TLS certificate.
    pub verify_tls: bool,
    pub connect_timeout: Option<Duration>,
}

/// Globally initialized transport configuration, read from environment variables at first access.
pub static TRANSPORT_CONFIG: LazyLock<TransportConfig> = LazyLock::new(|| TransportConfig {
    verify_tls: std::env::var("QUMULO_CSI_VERIFY_TLS")
        .map(|v| v == "1")
        .unwrap_or(false),
    connect_timeout: std::env::var("QUMULO_CSI_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs),
});

/// Static facts about the driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub name: String,
    pub vendor_version: String,
    /// Oldest appliance release the provisioning calls work against.
    pub minimum_version: Version,
    pub access_modes: Vec<AccessMode>,
    pub capabilities: Vec<ControllerCapability>,
}

impl DriverConfig {
    pub fn supports(&self, mode: AccessMode) -> bool {
        self.access_modes.contains(&mode)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: "qumulo.csi.k8s.io".to_owned(),
            vendor_version: env!("CARGO_PKG_VERSION").to_owned(),
            minimum_version: Version::new(4, 2, 4),
            access_modes: AccessMode::ALL.to_vec(),
            capabilities: vec![
                ControllerCapability::CreateDeleteVolume,
                ControllerCapability::SingleNodeMultiWriter,
                ControllerCapability::ExpandVolume,
            ],
        }
    }
}
