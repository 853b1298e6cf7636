//! In-memory appliance speaking the subset of the REST API this crate uses.
//!
//! Paths are kept canonical (`/a/b`), entry IDs are decimal counters, and
//! every request is recorded as `"<VERB> <uri>"` so tests can assert on the
//! exact traffic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::http::{HttpRequest, HttpResponse, HttpSend};
use super::quota::QUOTA_ALREADY_SET_ERROR;
use super::{Connection, LOGIN_URI, RestError};
use crate::rest::files::ENTRY_EXISTS_ERROR;
use crate::types::Secrets;
use crate::volume_id::canonicalize_path;

pub(crate) const HOST: &str = "10.1.2.3";
pub(crate) const PORT: u16 = 8000;
pub(crate) const USERNAME: &str = "admin";
pub(crate) const PASSWORD: &str = "Admin123";

const NO_SUCH_ENTRY: &str = "fs_no_such_entry_error";

/// Credentials the fake accepts.
pub(crate) fn credentials() -> Secrets {
    Secrets::from_iter([("username", USERNAME), ("password", PASSWORD)])
}

struct Entry {
    id: String,
    file_type: &'static str,
    mode: String,
}

#[derive(Clone)]
struct ExportRecord {
    id: String,
    export_path: String,
    fs_path: String,
}

impl ExportRecord {
    fn to_json(&self) -> Value {
        json!({"id": self.id, "export_path": self.export_path, "fs_path": self.fs_path})
    }
}

struct Failure {
    uri_prefix: String,
    status: u16,
    error_class: String,
}

struct State {
    version: String,
    token: Option<String>,
    sessions: u64,
    next_id: u64,
    entries: BTreeMap<String, Entry>,
    quotas: HashMap<String, u64>,
    exports: Vec<ExportRecord>,
    failures: Vec<Failure>,
    requests: Vec<String>,
}

pub(crate) struct FakeAppliance {
    state: Mutex<State>,
}

fn absolute(path: &str) -> String {
    format!("/{}", canonicalize_path(path))
}

fn unescape(segment: &str) -> String {
    url::form_urlencoded::parse(segment.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

fn reply(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        body: body.to_string().into_bytes(),
    }
}

fn error(status: u16, error_class: &str, description: &str) -> HttpResponse {
    reply(
        status,
        json!({
            "description": description,
            "module": "fake",
            "error_class": error_class,
            "stack": [],
            "user_visible": false,
        }),
    )
}

impl State {
    fn attributes(&self, path: &str) -> Option<Value> {
        self.entries.get(path).map(|e| {
            json!({"id": e.id, "type": e.file_type, "mode": e.mode, "path": path})
        })
    }

    fn path_of(&self, reference: &str) -> Option<String> {
        if reference.starts_with('/') {
            let path = absolute(reference);
            self.entries.contains_key(&path).then_some(path)
        } else {
            self.entries
                .iter()
                .find(|(_, e)| e.id == reference)
                .map(|(p, _)| p.clone())
        }
    }

    fn insert(&mut self, path: String, file_type: &'static str, mode: &str) -> String {
        self.next_id += 1;
        let id = self.next_id.to_string();
        self.entries.insert(
            path,
            Entry {
                id: id.clone(),
                file_type,
                mode: mode.to_owned(),
            },
        );
        id
    }

    fn create_entry(&mut self, parent: &str, body: &Value) -> HttpResponse {
        let Some(parent_path) = self.path_of(parent) else {
            return error(404, NO_SUCH_ENTRY, "parent missing");
        };
        if self.entries[&parent_path].file_type != "FS_FILE_TYPE_DIRECTORY" {
            return error(404, NO_SUCH_ENTRY, "parent is not a directory");
        }
        let name = body["name"].as_str().unwrap_or_default();
        let (file_type, mode) = match body["action"].as_str() {
            Some("CREATE_DIRECTORY") => ("FS_FILE_TYPE_DIRECTORY", "0755"),
            Some("CREATE_FILE") => ("FS_FILE_TYPE_FILE", "0644"),
            _ => return error(400, "http_bad_request_error", "bad action"),
        };
        let path = absolute(&format!("{parent_path}/{name}"));
        if self.entries.contains_key(&path) {
            return error(409, ENTRY_EXISTS_ERROR, "entry exists");
        }
        self.insert(path.clone(), file_type, mode);
        reply(200, self.attributes(&path).unwrap_or_default())
    }

    fn set_mode(&mut self, reference: &str, body: &Value) -> HttpResponse {
        let Some(path) = self.path_of(reference) else {
            return error(404, NO_SUCH_ENTRY, "no such entry");
        };
        if let (Some(entry), Some(mode)) = (self.entries.get_mut(&path), body["mode"].as_str()) {
            entry.mode = mode.to_owned();
        }
        reply(200, self.attributes(&path).unwrap_or_default())
    }

    fn tree_delete(&mut self, body: &Value) -> HttpResponse {
        let id = body["id"].as_str().unwrap_or_default();
        let Some(path) = self.path_of(id) else {
            return error(404, NO_SUCH_ENTRY, "no such entry");
        };
        let prefix = format!("{path}/");
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|p| **p == path || p.starts_with(&prefix))
            .cloned()
            .collect();
        for p in doomed {
            if let Some(entry) = self.entries.remove(&p) {
                self.quotas.remove(&entry.id);
            }
        }
        reply(202, json!({}))
    }

    fn create_quota(&mut self, body: &Value) -> HttpResponse {
        let id = body["id"].as_str().unwrap_or_default().to_owned();
        if self.path_of(&id).is_none() {
            return error(404, NO_SUCH_ENTRY, "no such entry");
        }
        if self.quotas.contains_key(&id) {
            return error(409, QUOTA_ALREADY_SET_ERROR, "quota already set");
        }
        let Some(limit) = body["limit"].as_str().and_then(|l| l.parse().ok()) else {
            return error(400, "http_bad_request_error", "bad limit");
        };
        self.quotas.insert(id, limit);
        reply(200, body.clone())
    }

    fn update_quota(&mut self, id: &str, body: &Value) -> HttpResponse {
        let Some(limit) = body["limit"].as_str().and_then(|l| l.parse().ok()) else {
            return error(400, "http_bad_request_error", "bad limit");
        };
        match self.quotas.get_mut(id) {
            Some(current) => {
                *current = limit;
                reply(200, body.clone())
            }
            None => error(404, "api_quotas_no_such_quota_error", "no quota"),
        }
    }

    fn find_export(&self, reference: &str) -> Option<usize> {
        self.exports.iter().position(|e| {
            if reference.starts_with('/') {
                absolute(&e.export_path) == absolute(reference)
            } else {
                e.id == reference
            }
        })
    }

    fn add_export(&mut self, export_path: &str, fs_path: &str) -> ExportRecord {
        self.next_id += 1;
        let record = ExportRecord {
            id: self.next_id.to_string(),
            export_path: export_path.to_owned(),
            fs_path: fs_path.to_owned(),
        };
        self.exports.push(record.clone());
        record
    }

    fn route(&mut self, method: &str, path: &str, body: &[u8]) -> HttpResponse {
        let body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let segments: Vec<String> = path.trim_matches('/').split('/').map(unescape).collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        match (method, segments.as_slice()) {
            ("GET", ["v1", "version"]) => reply(200, json!({"revision_id": self.version})),
            ("POST", ["v1", "files", "quotas"]) => self.create_quota(&body),
            ("GET", ["v1", "files", "quotas", id]) => match self.quotas.get(*id) {
                Some(limit) => reply(200, json!({"id": id, "limit": limit.to_string()})),
                None => error(404, "api_quotas_no_such_quota_error", "no quota"),
            },
            ("PUT", ["v1", "files", "quotas", id]) => self.update_quota(id, &body),
            ("POST", ["v1", "files", parent, "entries"]) => self.create_entry(parent, &body),
            ("GET", ["v1", "files", reference, "info", "attributes"]) => {
                match self.path_of(reference).and_then(|p| self.attributes(&p)) {
                    Some(attributes) => reply(200, attributes),
                    None => error(404, NO_SUCH_ENTRY, "no such entry"),
                }
            }
            ("PATCH", ["v1", "files", reference, "info", "attributes"]) => {
                self.set_mode(reference, &body)
            }
            ("POST", ["v1", "tree-delete", "jobs"]) => self.tree_delete(&body),
            ("POST", ["v2", "nfs", "exports"]) => {
                let export_path = body["export_path"].as_str().unwrap_or_default();
                let fs_path = body["fs_path"].as_str().unwrap_or_default();
                reply(200, self.add_export(export_path, fs_path).to_json())
            }
            ("GET", ["v2", "nfs", "exports", reference]) => match self.find_export(reference) {
                Some(i) => reply(200, self.exports[i].to_json()),
                None => error(404, "nfs_export_doesnt_exist_error", "no such export"),
            },
            ("DELETE", ["v2", "nfs", "exports", reference]) => match self.find_export(reference) {
                Some(i) => {
                    self.exports.remove(i);
                    reply(200, json!({}))
                }
                None => error(404, "nfs_export_doesnt_exist_error", "no such export"),
            },
            _ => error(404, "http_not_found_error", "unknown endpoint"),
        }
    }
}

impl FakeAppliance {
    pub(crate) fn new() -> Self {
        Self::with_version("Qumulo Core 5.1.0")
    }

    pub(crate) fn with_version(version: &str) -> Self {
        let mut state = State {
            version: version.to_owned(),
            token: None,
            sessions: 0,
            next_id: 1,
            entries: BTreeMap::new(),
            quotas: HashMap::new(),
            exports: Vec::new(),
            failures: Vec::new(),
            requests: Vec::new(),
        };
        state.insert("/".to_owned(), "FS_FILE_TYPE_DIRECTORY", "0755");
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// A connection to this appliance with valid credentials.
    pub(crate) fn connection(self: &Arc<Self>) -> Connection {
        Connection::new(HOST, PORT, USERNAME, PASSWORD, Arc::clone(self) as Arc<dyn HttpSend>)
    }

    /// Create a directory, and its parents, directly in the fake.
    pub(crate) fn add_dir(&self, path: &str) -> String {
        let mut state = self.lock();
        let mut current = String::new();
        let mut id = String::new();
        for segment in canonicalize_path(path).split('/').filter(|s| !s.is_empty()) {
            current = format!("{current}/{segment}");
            id = match state.entries.get(&current) {
                Some(entry) => entry.id.clone(),
                None => state.insert(current.clone(), "FS_FILE_TYPE_DIRECTORY", "0755"),
            };
        }
        id
    }

    pub(crate) fn add_file(&self, path: &str) -> String {
        self.lock()
            .insert(absolute(path), "FS_FILE_TYPE_FILE", "0644")
    }

    pub(crate) fn add_export(&self, export_path: &str, fs_path: &str) -> String {
        self.lock().add_export(export_path, fs_path).id
    }

    /// Remove an entry behind the controller's back.
    pub(crate) fn remove(&self, path: &str) {
        let mut state = self.lock();
        if let Some(entry) = state.entries.remove(&absolute(path)) {
            state.quotas.remove(&entry.id);
        }
    }

    pub(crate) fn exists(&self, path: &str) -> bool {
        self.lock().entries.contains_key(&absolute(path))
    }

    pub(crate) fn id_of(&self, path: &str) -> Option<String> {
        self.lock().entries.get(&absolute(path)).map(|e| e.id.clone())
    }

    pub(crate) fn mode_of(&self, path: &str) -> Option<String> {
        self.lock().entries.get(&absolute(path)).map(|e| e.mode.clone())
    }

    pub(crate) fn quota(&self, id: &str) -> Option<u64> {
        self.lock().quotas.get(id).copied()
    }

    /// Invalidate the current bearer token.
    pub(crate) fn expire_session(&self) {
        self.lock().token = None;
    }

    /// Number of successful logins so far.
    pub(crate) fn sessions(&self) -> u64 {
        self.lock().sessions
    }

    /// Answer the next authenticated request whose URI starts with
    /// `uri_prefix` with the given error instead of handling it.
    pub(crate) fn fail_next(&self, uri_prefix: &str, status: u16, error_class: &str) {
        self.lock().failures.push(Failure {
            uri_prefix: uri_prefix.to_owned(),
            status,
            error_class: error_class.to_owned(),
        });
    }

    /// Every request received, as `"<VERB> <uri>"`.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }
}

#[async_trait]
impl HttpSend for FakeAppliance {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RestError> {
        let mut state = self.lock();
        let path = request
            .url
            .splitn(4, '/')
            .nth(3)
            .map(|p| format!("/{p}"))
            .unwrap_or_default();
        state.requests.push(format!("{} {path}", request.method));
        let body = request.body.unwrap_or_default();

        if path == LOGIN_URI {
            let login: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            if login["username"] != USERNAME || login["password"] != PASSWORD {
                return Ok(error(401, "authentication_failed", "bad credentials"));
            }
            state.sessions += 1;
            let token = format!("token-{}", state.sessions);
            state.token = Some(token.clone());
            return Ok(reply(200, json!({"bearer_token": token})));
        }

        if request.bearer_token.is_none() || request.bearer_token != state.token {
            return Ok(error(401, "session_expired_error", "not authenticated"));
        }

        if let Some(i) = state
            .failures
            .iter()
            .position(|f| path.starts_with(&f.uri_prefix))
        {
            let failure = state.failures.remove(i);
            return Ok(error(failure.status, &failure.error_class, "injected failure"));
        }

        Ok(state.route(request.method.as_str(), &path, &body))
    }
}
