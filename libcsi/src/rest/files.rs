//! Filesystem entries: creation, lookup, permissions and tree delete.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Connection, RestError, decode, encode, escape};

/// Error class returned when creating an entry whose name is taken.
pub const ENTRY_EXISTS_ERROR: &str = "fs_entry_exists_error";

const DIRECTORY: &str = "FS_FILE_TYPE_DIRECTORY";
const FILE: &str = "FS_FILE_TYPE_FILE";

/// Type of a filesystem entry as reported by the appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileType {
    Directory,
    File,
    Other(String),
}

impl From<String> for FileType {
    fn from(s: String) -> Self {
        match s.as_str() {
            DIRECTORY => Self::Directory,
            FILE => Self::File,
            _ => Self::Other(s),
        }
    }
}

impl From<FileType> for String {
    fn from(t: FileType) -> Self {
        match t {
            FileType::Directory => DIRECTORY.to_owned(),
            FileType::File => FILE.to_owned(),
            FileType::Other(s) => s,
        }
    }
}

/// Attributes of a filesystem entry.
///
/// `id` stays the same when the entry is renamed, so follow-up operations
/// such as quotas address the entry by ID rather than path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub id: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub mode: String,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    name: &'a str,
    action: &'a str,
}

#[derive(Serialize)]
struct SetAttrRequest<'a> {
    mode: &'a str,
}

#[derive(Serialize)]
struct TreeDeleteRequest<'a> {
    id: &'a str,
}

/// Join an absolute directory path and an entry name.
pub fn join_path(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

fn attributes_uri(reference: &str) -> String {
    format!("/v1/files/{}/info/attributes", escape(reference))
}

impl Connection {
    async fn create_entry(
        &mut self,
        parent: &str,
        name: &str,
        action: &str,
    ) -> Result<FileAttributes, RestError> {
        let uri = format!("/v1/files/{}/entries/", escape(parent));
        let body = encode(&CreateRequest { name, action })?;
        let response = self.post(&uri, &body).await?;
        decode(&response)
    }

    /// Create a directory `name` under `parent`.
    pub async fn create_dir(
        &mut self,
        parent: &str,
        name: &str,
    ) -> Result<FileAttributes, RestError> {
        self.create_entry(parent, name, "CREATE_DIRECTORY").await
    }

    /// Create an empty file `name` under `parent`.
    pub async fn create_file(
        &mut self,
        parent: &str,
        name: &str,
    ) -> Result<FileAttributes, RestError> {
        self.create_entry(parent, name, "CREATE_FILE").await
    }

    /// Create a directory, or succeed with the existing one if a directory
    /// of that name is already there.
    ///
    /// If the name is taken by something other than a directory the
    /// original conflict is returned.
    pub async fn ensure_dir(
        &mut self,
        parent: &str,
        name: &str,
    ) -> Result<FileAttributes, RestError> {
        let conflict = match self.create_dir(parent, name).await {
            Err(RestError::Appliance(e)) if e.is(409, ENTRY_EXISTS_ERROR) => e,
            other => return other,
        };

        let path = join_path(parent, name);
        let existing = self.lookup(&path).await?;
        if existing.file_type != FileType::Directory {
            return Err(conflict.into());
        }
        debug!(%path, id = %existing.id, "directory already exists");
        Ok(existing)
    }

    /// Read the attributes of an entry by absolute path or by ID.
    pub async fn lookup(&mut self, reference: &str) -> Result<FileAttributes, RestError> {
        let response = self.get(&attributes_uri(reference)).await?;
        decode(&response)
    }

    /// Set the permission bits of an entry, e.g. `"0777"`.
    pub async fn change_mode(
        &mut self,
        reference: &str,
        mode: &str,
    ) -> Result<FileAttributes, RestError> {
        let body = encode(&SetAttrRequest { mode })?;
        let response = self.patch(&attributes_uri(reference), &body).await?;
        decode(&response)
    }

    /// Delete `path` and everything below it with an asynchronous
    /// tree-delete job.
    ///
    /// A path that is already gone, or that disappears before the job is
    /// submitted, counts as deleted.
    pub async fn tree_delete(&mut self, path: &str) -> Result<(), RestError> {
        let attributes = match self.lookup(path).await {
            Err(e) if e.is_status(404) => {
                debug!(%path, "nothing to delete");
                return Ok(());
            }
            other => other?,
        };

        let body = encode(&TreeDeleteRequest { id: &attributes.id })?;
        match self.post("/v1/tree-delete/jobs/", &body).await {
            Err(e) if e.is_status(404) => {
                debug!(%path, "entry deleted by someone else");
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }
}
