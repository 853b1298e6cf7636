//! Volume ID codec.
//!
//! A volume ID carries everything needed to find the volume again:
//!
//! ```text
//! v1:<server>:<rest port>//<store real path>//<store mount path>//<name>
//! ```
//!
//! Both paths are stored canonically, without leading, trailing or repeated
//! `/`, so the root directory is an empty segment and `//` never occurs
//! inside a field.

use std::fmt;

use thiserror::Error;

use crate::types::VolumeId;

/// Version tag of the only supported ID layout.
pub const VERSION_PREFIX: &str = "v1:";

const SEPARATOR: &str = "//";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Could not decode volume ID {id:?}: {reason}")]
pub struct VolumeIdError {
    pub id: String,
    pub reason: &'static str,
}

/// Strip leading and trailing `/` and collapse runs of `/`.
pub fn canonicalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether `name` names exactly one directory entry: non-empty, no `/`,
/// and not `.` or `..`.
pub fn is_single_segment(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && name != "." && name != ".."
}

/// Where a volume lives and how it is exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLocation {
    pub server: String,
    pub rest_port: u16,
    /// Directory holding the volumes, canonical form.
    pub store_real_path: String,
    /// Client-visible path of `store_real_path`, canonical form.
    pub store_mount_path: String,
    /// Directory name of the volume under `store_real_path`.
    pub name: String,
}

impl VolumeLocation {
    /// Build a location, canonicalizing both store paths.
    pub fn new(
        server: impl Into<String>,
        rest_port: u16,
        store_real_path: &str,
        store_mount_path: &str,
        name: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            rest_port,
            store_real_path: canonicalize_path(store_real_path),
            store_mount_path: canonicalize_path(store_mount_path),
            name: name.into(),
        }
    }

    pub fn encode(&self) -> VolumeId {
        VolumeId(self.to_string())
    }

    /// Parse an ID produced by [`encode`](Self::encode).
    ///
    /// Anything that does not match the layout exactly is rejected,
    /// including non-canonical paths.
    pub fn decode(id: &str) -> Result<Self, VolumeIdError> {
        let fail = |reason| VolumeIdError {
            id: id.to_owned(),
            reason,
        };

        let rest = id
            .strip_prefix(VERSION_PREFIX)
            .ok_or_else(|| fail("unknown version"))?;
        let (server, rest) = rest.split_once(':').ok_or_else(|| fail("missing port"))?;
        if server.is_empty() || server.contains('/') {
            return Err(fail("bad server"));
        }
        let (port, rest) = rest
            .split_once(SEPARATOR)
            .ok_or_else(|| fail("missing paths"))?;
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(fail("bad port"));
        }
        let rest_port = port.parse().map_err(|_| fail("bad port"))?;

        let fields: Vec<&str> = rest.split(SEPARATOR).collect();
        let [real, mount, name] = fields.as_slice() else {
            return Err(fail("wrong number of fields"));
        };
        if canonicalize_path(real) != *real || canonicalize_path(mount) != *mount {
            return Err(fail("non-canonical path"));
        }
        if !is_single_segment(name) {
            return Err(fail("bad name"));
        }

        Ok(Self {
            server: server.to_owned(),
            rest_port,
            store_real_path: (*real).to_owned(),
            store_mount_path: (*mount).to_owned(),
            name: (*name).to_owned(),
        })
    }

    /// Absolute path of the store directory on the appliance.
    pub fn store_real_dir(&self) -> String {
        format!("/{}", self.store_real_path)
    }

    /// Absolute path of the volume directory on the appliance.
    pub fn real_path(&self) -> String {
        absolute(&self.store_real_path, &self.name)
    }

    /// Path under which clients mount the volume.
    pub fn share_path(&self) -> String {
        absolute(&self.store_mount_path, &self.name)
    }
}

fn absolute(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("/{dir}/{name}")
    }
}

impl fmt::Display for VolumeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{VERSION_PREFIX}{}:{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.server, self.rest_port, self.store_real_path, self.store_mount_path, self.name
        )
    }
}
