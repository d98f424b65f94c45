//! GitHub Gist document backend.
//!
//! One file inside one gist holds the whole document. Reads are
//! `GET /gists/{id}`; writes are `PATCH /gists/{id}` with the replacement
//! content for that file only, which GitHub applies atomically.
//!
//! Gists have no conditional-write primitive, so the revision check fetches
//! right before the PATCH. Another writer can still land between that fetch
//! and the PATCH; the window is one round trip.

use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{DocumentClient, Expected, Revision, Snapshot, WriteCheck, check_revision};
use crate::error::StorageError;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_FILENAME: &str = "projects.json";

const ACCEPT: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = "projdesk";

/// Connection parameters for a gist-backed document.
#[derive(Clone)]
pub struct GistConfig {
    pub api_base: String,
    pub gist_id: String,
    pub filename: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl GistConfig {
    pub fn new(gist_id: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            gist_id: gist_id.into(),
            filename: DEFAULT_FILENAME.to_string(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

// Tokens must never reach logs.
impl std::fmt::Debug for GistConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GistConfig")
            .field("api_base", &self.api_base)
            .field("gist_id", &self.gist_id)
            .field("filename", &self.filename)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

#[derive(Debug)]
pub struct GistClient {
    config: GistConfig,
    agent: ureq::Agent,
}

impl GistClient {
    #[must_use]
    pub fn new(config: GistConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }

    fn url(&self) -> String {
        format!(
            "{}/gists/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.gist_id
        )
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        let request = request.set("Accept", ACCEPT).set("User-Agent", USER_AGENT);
        match &self.config.token {
            Some(token) => request.set("Authorization", &format!("token {token}")),
            None => request,
        }
    }

    fn fetch_raw(&self, url: &str) -> Result<String, StorageError> {
        let response = self
            .authorize(self.agent.get(url))
            .call()
            .map_err(|err| classify(err, "fetch truncated file"))?;
        response
            .into_string()
            .map_err(|err| StorageError::Network(format!("reading truncated file: {err}")))
    }
}

impl DocumentClient for GistClient {
    fn fetch(&self) -> Result<Option<Snapshot>, StorageError> {
        let response = self
            .authorize(self.agent.get(&self.url()))
            .call()
            .map_err(|err| classify(err, "fetch gist"))?;
        let body = response
            .into_string()
            .map_err(|err| StorageError::Network(format!("reading gist body: {err}")))?;

        let content = match extract_file(&body, &self.config.filename)? {
            FileContent::Missing => None,
            FileContent::Inline(content) => Some(content),
            FileContent::Truncated(raw_url) => Some(self.fetch_raw(&raw_url)?),
        };
        debug!(
            gist = %self.config.gist_id,
            file = %self.config.filename,
            present = content.is_some(),
            "fetched gist"
        );
        Ok(content.map(Snapshot::new))
    }

    fn store(&self, content: &str, expected: Expected<'_>) -> Result<Revision, StorageError> {
        let revision = Revision::of(content);
        if expected != Expected::Any {
            let current = self.fetch()?;
            let stored = current.as_ref().map(|s| s.content.as_str());
            if check_revision(expected, stored, content)? == WriteCheck::AlreadyStored {
                debug!(gist = %self.config.gist_id, %revision, "gist already current");
                return Ok(revision);
            }
        }

        let payload = json!({
            "files": { self.config.filename.as_str(): { "content": content } }
        });
        self.authorize(self.agent.request("PATCH", &self.url()))
            .send_json(payload)
            .map_err(|err| classify(err, "update gist"))?;

        debug!(gist = %self.config.gist_id, %revision, "updated gist");
        Ok(revision)
    }

    fn describe(&self) -> String {
        format!("gist:{}/{}", self.config.gist_id, self.config.filename)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FileContent {
    Missing,
    Inline(String),
    Truncated(String),
}

fn extract_file(body: &str, filename: &str) -> Result<FileContent, StorageError> {
    let gist: GistResponse = serde_json::from_str(body)
        .map_err(|err| StorageError::Malformed(format!("undecodable gist response: {err}")))?;
    let Some(file) = gist.files.get(filename) else {
        return Ok(FileContent::Missing);
    };
    match (file.truncated, &file.raw_url, &file.content) {
        (true, Some(raw_url), _) => Ok(FileContent::Truncated(raw_url.clone())),
        (_, _, Some(content)) => Ok(FileContent::Inline(content.clone())),
        _ => Err(StorageError::Malformed(format!(
            "gist file '{filename}' has no content"
        ))),
    }
}

fn classify(err: ureq::Error, what: &str) -> StorageError {
    match err {
        ureq::Error::Status(status, _) => status_error(status, what),
        ureq::Error::Transport(transport) => StorageError::Network(format!("{what}: {transport}")),
    }
}

fn status_error(status: u16, what: &str) -> StorageError {
    let detail = format!("{what}: HTTP {status}");
    match status {
        401 | 403 => StorageError::Auth(detail),
        404 => StorageError::NotFound(detail),
        408 | 429 | 500..=599 => StorageError::Network(detail),
        _ => StorageError::Malformed(detail),
    }
}
