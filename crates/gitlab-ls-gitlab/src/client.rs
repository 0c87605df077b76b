//! GitLab REST source client
//!
//! Pages through `/projects/:path/issues` and `/projects/:path/merge_requests`
//! and returns the whole listing at once. A failing page voids the fetch, so
//! callers never see a partial project.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitlab_ls_http::{
    header::{HeaderMap, HeaderValue},
    shared_client, HttpClientTrait, HttpConfig,
};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::{
    errors::{FetchError, GitLabError, Result},
    models::{ItemKind, ItemState, ProjectPath, TrackedItem},
};

/// Items requested per page
pub const PAGE_SIZE: usize = 100;

/// Upper bound on pages followed for one listing
const MAX_PAGES: u32 = 1000;

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const NEXT_PAGE_HEADER: &str = "x-next-page";

/// Source of a project's issues and merge requests
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Fetch every item of one kind for a project
    async fn fetch_items(
        &self,
        project: &ProjectPath,
        kind: ItemKind,
    ) -> std::result::Result<Vec<TrackedItem>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct ApiAuthor {
    name: String,
}

/// Issue / merge request as listed by the REST API
#[derive(Debug, Deserialize)]
struct ApiItem {
    iid: u64,
    title: String,
    state: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<ApiAuthor>,
    #[serde(default)]
    web_url: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl ApiItem {
    fn into_tracked(self, project: &ProjectPath, kind: ItemKind) -> Option<TrackedItem> {
        if self.iid == 0 {
            return None;
        }
        Some(TrackedItem {
            project: project.clone(),
            kind,
            number: self.iid,
            title: self.title,
            state: ItemState::from_api(&self.state),
            author: self.author.map(|a| a.name),
            description: self.description.filter(|d| !d.is_empty()),
            web_url: self.web_url,
            updated_at: self.updated_at,
        })
    }
}

/// GitLab REST v4 client for one instance and token
pub struct GitLabClient {
    base_url: Url,
    token: HeaderValue,
    http: Arc<dyn HttpClientTrait>,
}

impl GitLabClient {
    /// Create a client with the default HTTP configuration
    pub fn new(base_url: &Url, private_token: &str) -> Result<Self> {
        let http = shared_client(HttpConfig::default())?;
        Self::with_http(base_url, private_token, http)
    }

    /// Create a client over a caller-provided HTTP client
    pub fn with_http(
        base_url: &Url,
        private_token: &str,
        http: Arc<dyn HttpClientTrait>,
    ) -> Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(GitLabError::config_error(format!(
                "'{}' cannot be used as a base URL",
                base_url
            )));
        }

        let mut token = HeaderValue::from_str(private_token)
            .map_err(|_| GitLabError::config_error("private token contains invalid characters"))?;
        token.set_sensitive(true);

        Ok(Self {
            base_url: base_url.clone(),
            token,
            http,
        })
    }

    /// Instance base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of one page of a project's listing
    pub fn page_url(&self, project: &ProjectPath, kind: ItemKind, page: u32) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GitLabError::config_error("base URL cannot have path segments"))?
            .pop_if_empty()
            // A single segment, so the project's `/` is sent as %2F
            .extend(["api", "v4", "projects", project.as_str(), kind.url_segment()]);
        url.query_pairs_mut()
            .append_pair("per_page", &PAGE_SIZE.to_string())
            .append_pair("page", &page.to_string());
        Ok(url)
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, self.token.clone());
        headers
    }
}

/// Where the listing continues, if anywhere
fn next_page(header: Option<&HeaderValue>, current: u32, batch_len: usize) -> Option<u32> {
    match header {
        Some(value) => value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|next| *next > current),
        // Header stripped by a proxy: a full page implies more may follow
        None if batch_len >= PAGE_SIZE => Some(current + 1),
        None => None,
    }
}

#[async_trait]
impl ItemSource for GitLabClient {
    async fn fetch_items(
        &self,
        project: &ProjectPath,
        kind: ItemKind,
    ) -> std::result::Result<Vec<TrackedItem>, FetchError> {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let url = self
                .page_url(project, kind, page)
                .map_err(|e| FetchError::Transient(e.to_string()))?;

            let response = self.http.get(url.as_str(), self.auth_headers()).await?;
            let next_header = response.headers().get(NEXT_PAGE_HEADER).cloned();

            let batch: Vec<ApiItem> = response.json().await.map_err(|e| {
                FetchError::Transient(format!("undecodable {} listing: {}", kind, e))
            })?;
            let batch_len = batch.len();
            debug!(
                "Fetched page {} of {} {}s ({} items)",
                page, project, kind, batch_len
            );

            items.extend(
                batch
                    .into_iter()
                    .filter_map(|item| item.into_tracked(project, kind)),
            );

            match next_page(next_header.as_ref(), page, batch_len) {
                Some(n) if n > MAX_PAGES => {
                    warn!(
                        "Stopping {} {} listing after {} pages",
                        project, kind, MAX_PAGES
                    );
                    break;
                }
                Some(n) => page = n,
                None => break,
            }
        }

        debug!("Got {} {}s for {}", items.len(), kind, project);
        Ok(items)
    }
}
