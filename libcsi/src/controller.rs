//! CSI Controller service trait.
//!
//! The Controller service manages the centralized volume lifecycle: creation,
//! deletion, capability validation and expansion. It is invoked by the
//! orchestrator's external provisioner and resizer sidecars.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{
    ControllerCapability, CreateVolumeRequest, DeleteVolumeRequest, ExpandVolumeRequest,
    ExpandVolumeResponse, ValidateVolumeCapabilitiesRequest, ValidateVolumeCapabilitiesResponse,
    Volume, VolumeId,
};

/// Controller service: centralized volume management.
///
/// Implementations are stateless between calls: everything needed to act
/// on an existing volume is recovered from its [`VolumeId`], and
/// credentials arrive with each request.
#[async_trait]
pub trait CsiController: Send + Sync {
    /// Provision a new volume.
    ///
    /// Calling this again with the same name and parameters returns the same
    /// volume. The returned [`Volume`] contains the `volume_context` that must
    /// be forwarded to subsequent Node operations.
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError>;

    /// Delete a previously provisioned volume. Deleting a volume that is
    /// already gone succeeds.
    async fn delete_volume(&self, req: DeleteVolumeRequest) -> Result<(), CsiError>;

    /// Check whether the given capabilities are compatible with the volume.
    async fn validate_volume_capabilities(
        &self,
        req: ValidateVolumeCapabilitiesRequest,
    ) -> Result<ValidateVolumeCapabilitiesResponse, CsiError>;

    /// Grow a volume to the requested size.
    async fn expand_volume(
        &self,
        req: ExpandVolumeRequest,
    ) -> Result<ExpandVolumeResponse, CsiError>;

    /// Operations this controller supports.
    async fn get_capabilities(&self) -> Result<Vec<ControllerCapability>, CsiError>;

    /// Make a volume available on a node.
    async fn controller_publish_volume(
        &self,
        volume_id: &VolumeId,
        node_id: &str,
    ) -> Result<HashMap<String, String>, CsiError>;

    async fn controller_unpublish_volume(
        &self,
        volume_id: &VolumeId,
        node_id: &str,
    ) -> Result<(), CsiError>;

    async fn controller_get_volume(&self, volume_id: &VolumeId) -> Result<Volume, CsiError>;

    /// List all volumes known to this controller.
    async fn list_volumes(&self) -> Result<Vec<Volume>, CsiError>;

    /// Return the total available capacity in bytes.
    async fn get_capacity(&self) -> Result<u64, CsiError>;

    /// Snapshot a volume, returning the snapshot ID.
    async fn create_snapshot(
        &self,
        source_volume_id: &VolumeId,
        name: &str,
    ) -> Result<String, CsiError>;

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), CsiError>;

    async fn list_snapshots(&self) -> Result<Vec<String>, CsiError>;
}
