//! Blocking client for the DNAnexus API routes the engine needs.

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

use super::{ArchiveClient, FileQuery, FileState, ProjectId, ProjectSummary, RemoteFile};
use crate::error::ArchiveError;

const FIND_PROJECTS: &str = "/system/findProjects";
const FIND_DATA_OBJECTS: &str = "/system/findDataObjects";

#[derive(Debug, Serialize)]
struct NameQuery<'a> {
    regexp: &'a str,
}

#[derive(Debug, Serialize)]
struct DescribeFields {
    fields: Value,
}

#[derive(Debug, Serialize)]
struct FindProjectsRequest<'a> {
    name: NameQuery<'a>,
    describe: DescribeFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    starting: Option<Value>,
}

#[derive(Debug, Serialize)]
struct Scope<'a> {
    project: &'a str,
    folder: &'a str,
    recurse: bool,
}

#[derive(Debug, Serialize)]
struct FindDataObjectsRequest<'a> {
    class: &'static str,
    scope: Scope<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<NameQuery<'a>>,
    describe: DescribeFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    starting: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    results: Vec<T>,
    #[serde(default)]
    next: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ProjectResult {
    id: String,
    describe: Option<ProjectDescribe>,
}

#[derive(Debug, Deserialize)]
struct ProjectDescribe {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DataObjectResult {
    id: String,
    describe: Option<FileDescribe>,
}

#[derive(Debug, Deserialize)]
struct FileDescribe {
    name: String,
    #[serde(default)]
    folder: String,
    state: FileState,
}

impl From<reqwest::Error> for ArchiveError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_timeout() {
            ArchiveError::Timeout { url }
        } else if err.is_decode() {
            ArchiveError::Decode(err.to_string())
        } else {
            ArchiveError::Http(err.to_string())
        }
    }
}

pub struct DnanexusClient {
    client: Client,
    base_url: String,
    token: String,
}

impl DnanexusClient {
    /// Build a client with a per-request `timeout`. A timed out request is
    /// reported as `ArchiveError::Timeout`.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ArchiveError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArchiveError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        route: &str,
        body: &Req,
    ) -> Result<Resp, ArchiveError> {
        let url = format!("{}{}", self.base_url, route);
        trace!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json()?)
        } else {
            let body = response.text().unwrap_or_default();
            Err(ArchiveError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl ArchiveClient for DnanexusClient {
    fn find_projects(&self, name_pattern: &str) -> Result<Vec<ProjectSummary>, ArchiveError> {
        let mut projects = Vec::new();
        let mut starting = None;

        loop {
            let request = FindProjectsRequest {
                name: NameQuery {
                    regexp: name_pattern,
                },
                describe: DescribeFields {
                    fields: serde_json::json!({ "name": true }),
                },
                starting: starting.take(),
            };
            let page: Page<ProjectResult> = self.post(FIND_PROJECTS, &request)?;

            for result in page.results {
                let describe = result.describe.ok_or_else(|| {
                    ArchiveError::Decode(format!("project {} returned without a name", result.id))
                })?;
                projects.push(ProjectSummary {
                    id: ProjectId::new(result.id),
                    name: describe.name,
                });
            }

            match page.next {
                Some(next) if !next.is_null() => starting = Some(next),
                _ => break,
            }
        }

        debug!("findProjects '{}' returned {} projects", name_pattern, projects.len());
        Ok(projects)
    }

    fn find_files(&self, query: &FileQuery<'_>) -> Result<Vec<RemoteFile>, ArchiveError> {
        let mut files = Vec::new();
        let mut starting = None;

        loop {
            let request = FindDataObjectsRequest {
                class: "file",
                scope: Scope {
                    project: query.project.as_str(),
                    folder: query.folder.unwrap_or("/"),
                    recurse: true,
                },
                name: query.name_pattern.map(|regexp| NameQuery { regexp }),
                describe: DescribeFields {
                    fields: serde_json::json!({ "name": true, "folder": true, "state": true }),
                },
                starting: starting.take(),
            };
            let page: Page<DataObjectResult> = self.post(FIND_DATA_OBJECTS, &request)?;

            for result in page.results {
                let describe = result.describe.ok_or_else(|| {
                    ArchiveError::Decode(format!(
                        "file {} returned without a description",
                        result.id
                    ))
                })?;
                files.push(RemoteFile {
                    id: result.id,
                    name: describe.name,
                    folder: describe.folder,
                    state: describe.state,
                });
            }

            match page.next {
                Some(next) if !next.is_null() => starting = Some(next),
                _ => break,
            }
        }

        debug!(
            "findDataObjects in {} ({}) returned {} files",
            query.project,
            query.folder.unwrap_or("/"),
            files.len()
        );
        Ok(files)
    }
}
