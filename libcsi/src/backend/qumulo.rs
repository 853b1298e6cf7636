//! Qumulo storage backend for CSI.
//!
//! [`QumuloController`] implements [`CsiController`] by translating each
//! call into REST operations against a Qumulo appliance. A volume is a
//! directory with a quota:
//!
//! ```text
//! /<storerealpath>/
//!   <volume name>/          # mode 0777, quota = requested size
//! ```
//!
//! Nothing is kept between calls. The appliance address and both store
//! paths are encoded into the volume ID, and credentials arrive with every
//! request, so each call opens its own [`Connection`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::config::{DriverConfig, TRANSPORT_CONFIG};
use crate::controller::CsiController;
use crate::error::{CsiError, Expect, transform};
use crate::rest::{Connection, HttpSend, ReqwestSender, RestError};
use crate::types::*;
use crate::volume_id::{VolumeLocation, canonicalize_path, is_single_segment};

// Placement parameter names, matched case-insensitively.
const PARAM_SERVER: &str = "server";
const PARAM_REST_PORT: &str = "restport";
const PARAM_STORE_REAL_PATH: &str = "storerealpath";
const PARAM_STORE_MOUNT_PATH: &str = "storemountpath";
const PARAM_STORE_EXPORT: &str = "storeexport";

// Volume context keys.
const CONTEXT_SERVER: &str = "server";
const CONTEXT_SHARE: &str = "share";

const DEFAULT_REST_PORT: u16 = 8000;
const VOLUME_MODE: &str = "0777";

/// Where a new volume goes, parsed from the storage class parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Placement {
    location: VolumeLocation,
    /// Export whose path replaces the store mount path.
    export: Option<String>,
}

fn required_path<'a>(key: &str, value: Option<&'a str>) -> Result<&'a str, CsiError> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CsiError::InvalidArgument(format!("{key} is a required parameter")))?;
    absolute_path(key, value)
}

fn absolute_path<'a>(key: &str, value: &'a str) -> Result<&'a str, CsiError> {
    if value.starts_with('/') {
        Ok(value)
    } else {
        Err(CsiError::InvalidArgument(format!(
            "{key} ({value:?}) must start with a '/'"
        )))
    }
}

impl Placement {
    fn parse(name: &str, parameters: &HashMap<String, String>) -> Result<Self, CsiError> {
        let mut server = None;
        let mut rest_port = DEFAULT_REST_PORT;
        let mut real_path = None;
        let mut mount_path = None;
        let mut export = None;

        for (key, value) in parameters {
            match key.to_lowercase().as_str() {
                PARAM_SERVER => server = Some(value.as_str()),
                PARAM_REST_PORT => {
                    rest_port = value.parse().map_err(|_| {
                        CsiError::InvalidArgument(format!("invalid port {value:?}"))
                    })?
                }
                PARAM_STORE_REAL_PATH => real_path = Some(value.as_str()),
                PARAM_STORE_MOUNT_PATH => mount_path = Some(value.as_str()),
                PARAM_STORE_EXPORT => export = Some(value.clone()),
                _ => {
                    return Err(CsiError::InvalidArgument(format!(
                        "invalid parameter {key:?}"
                    )));
                }
            }
        }

        let server = server.filter(|s| !s.is_empty()).ok_or_else(|| {
            CsiError::InvalidArgument(format!("{PARAM_SERVER} is a required parameter"))
        })?;
        if server.contains([':', '/']) {
            return Err(CsiError::InvalidArgument(format!(
                "{PARAM_SERVER} ({server:?}) must be a host name or IPv4 address"
            )));
        }
        if !is_single_segment(name) {
            return Err(CsiError::InvalidArgument(format!(
                "volume name {name:?} must be a single path segment"
            )));
        }
        if export.as_deref() == Some("") {
            return Err(CsiError::InvalidArgument(format!(
                "{PARAM_STORE_EXPORT} must not be empty"
            )));
        }

        let real_path = required_path(PARAM_STORE_REAL_PATH, real_path)?;
        let mount_path = match (mount_path, &export) {
            (Some(_), Some(_)) => {
                return Err(CsiError::InvalidArgument(format!(
                    "{PARAM_STORE_MOUNT_PATH} and {PARAM_STORE_EXPORT} are mutually exclusive"
                )));
            }
            (Some(path), None) if !path.is_empty() => absolute_path(PARAM_STORE_MOUNT_PATH, path)?,
            _ => real_path,
        };

        Ok(Self {
            location: VolumeLocation::new(server, rest_port, real_path, mount_path, name),
            export,
        })
    }
}

/// Pick the quota limit from a capacity range. `required_bytes` wins over
/// `limit_bytes`; zero means unset.
fn quota_limit(range: Option<&CapacityRange>) -> Result<u64, CsiError> {
    let range =
        range.ok_or_else(|| CsiError::InvalidArgument("CapacityRange must be provided".into()))?;

    if range.required_bytes < 0 {
        return Err(CsiError::InvalidArgument("RequiredBytes must be positive".into()));
    }
    if range.limit_bytes < 0 {
        return Err(CsiError::InvalidArgument("LimitBytes must be positive".into()));
    }

    let bytes = [range.required_bytes, range.limit_bytes]
        .into_iter()
        .find(|bytes| *bytes != 0)
        .ok_or_else(|| {
            CsiError::InvalidArgument("RequiredBytes or LimitBytes must be provided".into())
        })?;
    // Both fields are non-negative here.
    Ok(bytes as u64)
}

/// Canonical `path` relative to canonical `base`, if `path` is inside it.
fn relative_to<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if base.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

/// Concrete CSI controller backed by a Qumulo appliance.
pub struct QumuloController {
    config: DriverConfig,
    sender: Arc<dyn HttpSend>,
}

impl QumuloController {
    /// Create a controller talking HTTPS with the process-wide
    /// [`TRANSPORT_CONFIG`].
    pub fn new(config: DriverConfig) -> Result<Self, RestError> {
        let sender = ReqwestSender::new(&TRANSPORT_CONFIG)?;
        Ok(Self::with_sender(config, Arc::new(sender)))
    }

    /// Create a controller over an arbitrary HTTP sender.
    pub fn with_sender(config: DriverConfig, sender: Arc<dyn HttpSend>) -> Self {
        Self { config, sender }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Connect to an appliance with the caller's credentials and check that
    /// it runs a supported release.
    async fn open_session(
        &self,
        server: &str,
        rest_port: u16,
        secrets: &Secrets,
    ) -> Result<Connection, CsiError> {
        let (Some(username), Some(password)) = (secrets.get("username"), secrets.get("password"))
        else {
            return Err(CsiError::Unauthenticated(
                "username and password secrets missing".into(),
            ));
        };

        let mut connection = Connection::new(
            server,
            rest_port,
            username,
            password,
            Arc::clone(&self.sender),
        );
        let version = connection
            .version_info()
            .await
            .and_then(|info| info.semantic_version())
            .map_err(|e| transform(e, []))?;

        let minimum = &self.config.minimum_version;
        if version < *minimum {
            return Err(CsiError::FailedPrecondition(format!(
                "Cluster version {version} must be >= {minimum}"
            )));
        }
        debug!(server, rest_port, %version, "appliance session ready");
        Ok(connection)
    }

    fn check_capabilities(&self, capabilities: &[VolumeCapability]) -> Result<(), String> {
        if capabilities.is_empty() {
            return Err("volume capabilities must be provided".into());
        }
        for capability in capabilities {
            let mode = capability
                .access_mode
                .ok_or("volume capability access mode not set")?;
            if !self.config.supports(mode) {
                return Err(format!("driver does not support access mode: {mode}"));
            }
            if capability.access_type.is_none() {
                return Err("volume capability access type not set".into());
            }
        }
        Ok(())
    }

    /// Rewrite the store mount path to go through an export.
    async fn mount_through_export(
        &self,
        connection: &mut Connection,
        location: &mut VolumeLocation,
        export: &str,
    ) -> Result<(), CsiError> {
        let resolved = connection.resolve_export(export).await.map_err(|e| {
            transform(
                e,
                [Expect::status(
                    404,
                    CsiError::NotFound(format!("export {export:?} not found")),
                )],
            )
        })?;

        let fs_path = canonicalize_path(&resolved.fs_path);
        let relative = relative_to(&location.store_real_path, &fs_path).ok_or_else(|| {
            CsiError::InvalidArgument(format!(
                "{PARAM_STORE_REAL_PATH} {:?} is not inside export {export:?} ({:?})",
                location.store_real_dir(),
                resolved.fs_path
            ))
        })?;
        location.store_mount_path =
            canonicalize_path(&format!("{}/{relative}", resolved.export_path));
        debug!(export, mount = %location.store_mount_path, "mount path from export");
        Ok(())
    }
}

#[async_trait]
impl CsiController for QumuloController {
    #[instrument(skip(self, req), fields(name = %req.name))]
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError> {
        if req.name.is_empty() {
            return Err(CsiError::InvalidArgument(
                "CreateVolume name must be provided".into(),
            ));
        }
        self.check_capabilities(&req.volume_capabilities)
            .map_err(CsiError::InvalidArgument)?;
        let limit = quota_limit(req.capacity_range.as_ref())?;
        let Placement {
            mut location,
            export,
        } = Placement::parse(&req.name, &req.parameters)?;

        if req.volume_content_source.is_some() {
            return Err(CsiError::InvalidArgument("Volume source unsupported".into()));
        }

        let mut connection = self
            .open_session(&location.server, location.rest_port, &req.secrets)
            .await?;
        if let Some(export) = export {
            self.mount_through_export(&mut connection, &mut location, &export)
                .await?;
        }
        let volume_id = location.encode();
        let id = &volume_id.0;

        let store = location.store_real_dir();
        let attributes = connection
            .ensure_dir(&store, &location.name)
            .await
            .map_err(|e| {
                transform(
                    e,
                    [
                        Expect::status(
                            404,
                            CsiError::NotFound(format!(
                                "{PARAM_STORE_REAL_PATH} directory {store:?} missing for volume {id:?}"
                            )),
                        ),
                        Expect::status(
                            409,
                            CsiError::AlreadyExists(format!(
                                "A non-directory entity exists at {:?} for volume {id:?}",
                                location.real_path()
                            )),
                        ),
                    ],
                )
            })?;

        connection
            .ensure_quota(&attributes.id, limit)
            .await
            .map_err(|e| CsiError::Internal(format!("Failed to set quota on {id}: {e}")))?;

        connection
            .change_mode(&attributes.id, VOLUME_MODE)
            .await
            .map_err(|e| transform(e, []))?;

        info!(%volume_id, limit, "volume created");
        Ok(Volume {
            volume_id,
            capacity_bytes: limit,
            volume_context: HashMap::from([
                (CONTEXT_SERVER.to_owned(), location.server.clone()),
                (CONTEXT_SHARE.to_owned(), location.share_path()),
            ]),
        })
    }

    #[instrument(skip(self, req), fields(volume_id = %req.volume_id))]
    async fn delete_volume(&self, req: DeleteVolumeRequest) -> Result<(), CsiError> {
        if req.volume_id.is_empty() {
            return Err(CsiError::InvalidArgument("Volume ID missing in request".into()));
        }

        let location = match VolumeLocation::decode(&req.volume_id.0) {
            Ok(location) => location,
            Err(e) => {
                warn!(error = %e, "treating undecodable volume ID as already deleted");
                return Ok(());
            }
        };

        let mut connection = self
            .open_session(&location.server, location.rest_port, &req.secrets)
            .await?;
        let path = location.real_path();
        debug!(%path, "removing volume directory with tree delete");
        connection
            .tree_delete(&path)
            .await
            .map_err(|e| transform(e, []))?;

        info!("volume deleted");
        Ok(())
    }

    #[instrument(skip(self, req), fields(volume_id = %req.volume_id))]
    async fn validate_volume_capabilities(
        &self,
        req: ValidateVolumeCapabilitiesRequest,
    ) -> Result<ValidateVolumeCapabilitiesResponse, CsiError> {
        if req.volume_id.is_empty() {
            return Err(CsiError::InvalidArgument("Volume ID missing in request".into()));
        }
        if req.volume_capabilities.is_empty() {
            return Err(CsiError::InvalidArgument(
                "Volume capabilities missing in request".into(),
            ));
        }

        Ok(match self.check_capabilities(&req.volume_capabilities) {
            Ok(()) => ValidateVolumeCapabilitiesResponse {
                confirmed: Some(req.volume_capabilities),
                message: String::new(),
            },
            Err(message) => ValidateVolumeCapabilitiesResponse {
                confirmed: None,
                message,
            },
        })
    }

    #[instrument(skip(self, req), fields(volume_id = %req.volume_id))]
    async fn expand_volume(
        &self,
        req: ExpandVolumeRequest,
    ) -> Result<ExpandVolumeResponse, CsiError> {
        if req.volume_id.is_empty() {
            return Err(CsiError::InvalidArgument("Volume ID missing in request".into()));
        }
        let volume_id = &req.volume_id;
        let location = VolumeLocation::decode(&volume_id.0)
            .map_err(|_| CsiError::NotFound(format!("Volume not found {:?}", volume_id.0)))?;
        let limit = quota_limit(req.capacity_range.as_ref())?;

        let mut connection = self
            .open_session(&location.server, location.rest_port, &req.secrets)
            .await?;
        let missing = || {
            Expect::status(
                404,
                CsiError::NotFound(format!("Directory for volume {:?} is missing", volume_id.0)),
            )
        };

        let attributes = connection
            .lookup(&location.real_path())
            .await
            .map_err(|e| transform(e, [missing()]))?;
        connection
            .ensure_quota(&attributes.id, limit)
            .await
            .map_err(|e| transform(e, [missing()]))?;

        info!(limit, "volume expanded");
        Ok(ExpandVolumeResponse {
            capacity_bytes: limit,
            node_expansion_required: false,
        })
    }

    async fn get_capabilities(&self) -> Result<Vec<ControllerCapability>, CsiError> {
        Ok(self.config.capabilities.clone())
    }

    async fn controller_publish_volume(
        &self,
        _volume_id: &VolumeId,
        _node_id: &str,
    ) -> Result<HashMap<String, String>, CsiError> {
        Err(CsiError::Unimplemented("ControllerPublishVolume".into()))
    }

    async fn controller_unpublish_volume(
        &self,
        _volume_id: &VolumeId,
        _node_id: &str,
    ) -> Result<(), CsiError> {
        Err(CsiError::Unimplemented("ControllerUnpublishVolume".into()))
    }

    async fn controller_get_volume(&self, _volume_id: &VolumeId) -> Result<Volume, CsiError> {
        Err(CsiError::Unimplemented("ControllerGetVolume".into()))
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>, CsiError> {
        Err(CsiError::Unimplemented("ListVolumes".into()))
    }

    async fn get_capacity(&self) -> Result<u64, CsiError> {
        Err(CsiError::Unimplemented("GetCapacity".into()))
    }

    async fn create_snapshot(
        &self,
        _source_volume_id: &VolumeId,
        _name: &str,
    ) -> Result<String, CsiError> {
        Err(CsiError::Unimplemented("CreateSnapshot".into()))
    }

    async fn delete_snapshot(&self, _snapshot_id: &str) -> Result<(), CsiError> {
        Err(CsiError::Unimplemented("DeleteSnapshot".into()))
    }

    async fn list_snapshots(&self) -> Result<Vec<String>, CsiError> {
        Err(CsiError::Unimplemented("ListSnapshots".into()))
    }
}
