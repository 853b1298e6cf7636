//! NFS exports.

use serde::Deserialize;
use serde_json::json;

use super::{Connection, RestError, decode, encode, escape};

const EXPORTS_URI: &str = "/v2/nfs/exports/";

/// An export maps a network-visible path onto a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Export {
    pub id: String,
    pub export_path: String,
    pub fs_path: String,
}

impl Connection {
    /// Look up an export by ID or by export path.
    pub async fn resolve_export(&mut self, reference: &str) -> Result<Export, RestError> {
        let response = self.get(&format!("{EXPORTS_URI}{}", escape(reference))).await?;
        decode(&response)
    }

    /// Create a read-write export of `fs_path` with no host restrictions.
    pub async fn export_create(
        &mut self,
        export_path: &str,
        fs_path: &str,
    ) -> Result<Export, RestError> {
        let body = encode(&json!({
            "export_path": export_path,
            "fs_path": fs_path,
            "description": "",
            "restrictions": [{
                "read_only": false,
                "require_privileged_port": false,
                "host_restrictions": [],
                "user_mapping": "NFS_MAP_NONE",
                "map_to_user": {"id_type": "LOCAL_USER", "id_value": "0"},
            }],
        }))?;
        let response = self.post(EXPORTS_URI, &body).await?;
        decode(&response)
    }

    /// Delete an export by ID or by export path.
    pub async fn export_delete(&mut self, reference: &str) -> Result<(), RestError> {
        self.delete(&format!("{EXPORTS_URI}{}", escape(reference))).await?;
        Ok(())
    }
}
