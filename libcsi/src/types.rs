//! Core CSI types: volumes, capabilities, requests and responses.
//!
//! These types form the data model shared by the [`CsiController`] trait and
//! the Qumulo backend. They are all [`Serialize`]/[`Deserialize`] so an RPC
//! layer can carry them as-is.
//!
//! [`CsiController`]: crate::controller::CsiController

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Volume identity
// ---------------------------------------------------------------------------

/// Opaque, unique identifier for a volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VolumeId(pub String);

impl VolumeId {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Access mode & capabilities
// ---------------------------------------------------------------------------

/// Describes how a volume may be accessed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Unknown,
    /// Single-node read-write.
    SingleNodeWriter,
    /// Single-node read-only.
    SingleNodeReaderOnly,
    /// Multi-node read-only.
    MultiNodeReaderOnly,
    /// Multi-node, one writer.
    MultiNodeSingleWriter,
    /// Multi-node read-write.
    MultiNodeMultiWriter,
    /// Single-node, single workload read-write.
    SingleNodeSingleWriter,
    /// Single-node, many workloads read-write.
    SingleNodeMultiWriter,
}

impl AccessMode {
    /// Every mode with a defined meaning.
    pub const ALL: [AccessMode; 7] = [
        Self::SingleNodeWriter,
        Self::SingleNodeReaderOnly,
        Self::MultiNodeReaderOnly,
        Self::MultiNodeSingleWriter,
        Self::MultiNodeMultiWriter,
        Self::SingleNodeSingleWriter,
        Self::SingleNodeMultiWriter,
    ];
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::SingleNodeWriter => "SINGLE_NODE_WRITER",
            Self::SingleNodeReaderOnly => "SINGLE_NODE_READER_ONLY",
            Self::MultiNodeReaderOnly => "MULTI_NODE_READER_ONLY",
            Self::MultiNodeSingleWriter => "MULTI_NODE_SINGLE_WRITER",
            Self::MultiNodeMultiWriter => "MULTI_NODE_MULTI_WRITER",
            Self::SingleNodeSingleWriter => "SINGLE_NODE_SINGLE_WRITER",
            Self::SingleNodeMultiWriter => "SINGLE_NODE_MULTI_WRITER",
        };
        f.write_str(name)
    }
}

/// How the volume is presented to the workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessType {
    /// Raw block device.
    Block,
    /// Mounted filesystem.
    Mount {
        /// Filesystem type, empty for the plugin default.
        #[serde(default)]
        fs_type: String,
        /// Additional mount flags (e.g. `"noatime"`).
        #[serde(default)]
        mount_flags: Vec<String>,
    },
}

impl AccessType {
    /// A filesystem mount with default options.
    pub fn mount() -> Self {
        Self::Mount {
            fs_type: String::new(),
            mount_flags: Vec::new(),
        }
    }
}

/// Describes the capabilities required from a volume. Either field may be
/// missing in a malformed request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeCapability {
    #[serde(default)]
    pub access_mode: Option<AccessMode>,
    #[serde(default)]
    pub access_type: Option<AccessType>,
}

impl VolumeCapability {
    /// A mounted volume with the given access mode.
    pub fn mount(access_mode: AccessMode) -> Self {
        Self {
            access_mode: Some(access_mode),
            access_type: Some(AccessType::mount()),
        }
    }
}

/// Requested size bounds. Zero means unset.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapacityRange {
    #[serde(default)]
    pub required_bytes: i64,
    #[serde(default)]
    pub limit_bytes: i64,
}

/// Source to pre-populate a new volume from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum VolumeContentSource {
    Snapshot(String),
    Volume(VolumeId),
}

/// Operations advertised by the controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ControllerCapability {
    CreateDeleteVolume,
    SingleNodeMultiWriter,
    ExpandVolume,
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Per-call credentials. `Debug` prints the keys only.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secrets(HashMap<String, String>);

impl Secrets {
    /// A non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Secrets {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.0.keys().collect();
        keys.sort();
        f.debug_struct("Secrets").field("keys", &keys).finish()
    }
}

// ---------------------------------------------------------------------------
// Volume metadata
// ---------------------------------------------------------------------------

/// A provisioned volume as reported to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    /// Encoded volume identity.
    pub volume_id: VolumeId,
    /// Provisioned capacity in bytes.
    pub capacity_bytes: u64,
    /// Opaque context passed from Controller to Node operations.
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Requests & responses
// ---------------------------------------------------------------------------

/// Request to create a new volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    /// Caller-chosen name, used as the directory name on the appliance.
    pub name: String,
    #[serde(default)]
    pub capacity_range: Option<CapacityRange>,
    #[serde(default)]
    pub volume_capabilities: Vec<VolumeCapability>,
    /// Placement parameters from the storage class.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default)]
    pub secrets: Secrets,
    #[serde(default)]
    pub volume_content_source: Option<VolumeContentSource>,
}

/// Request to delete a volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteVolumeRequest {
    pub volume_id: VolumeId,
    #[serde(default)]
    pub secrets: Secrets,
}

/// Request to check capabilities against an existing volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateVolumeCapabilitiesRequest {
    pub volume_id: VolumeId,
    #[serde(default)]
    pub volume_capabilities: Vec<VolumeCapability>,
}

/// Outcome of a capability check. `confirmed` is `None` with a `message`
/// when some capability is not supported.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidateVolumeCapabilitiesResponse {
    pub confirmed: Option<Vec<VolumeCapability>>,
    pub message: String,
}

/// Request to grow a volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpandVolumeRequest {
    pub volume_id: VolumeId,
    #[serde(default)]
    pub capacity_range: Option<CapacityRange>,
    #[serde(default)]
    pub secrets: Secrets,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpandVolumeResponse {
    pub capacity_bytes: u64,
    /// Always `false`: the quota is enforced by the appliance.
    pub node_expansion_required: bool,
}
