//! Google Cloud Storage backend over the JSON API.
//!
//! Listing uses `GET /storage/v1/b/{bucket}/o?prefix=...`, following
//! `nextPageToken` until exhausted. Objects are read with HTTP `Range`
//! requests against the `alt=media` endpoint.

use super::{BlockReader, ObjectStore, RangeSource, ReadSeek};
use crate::{ImageryError, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::RANGE;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::io;
use std::time::Duration;
use tracing::debug;

/// Public GCS endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Default timeout for every request to the store.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variable holding an OAuth2 access token.
const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Header naming the project billed for requests made with user credentials.
const USER_PROJECT_HEADER: &str = "x-goog-user-project";

/// Page size for object listings.
const LIST_PAGE_SIZE: &str = "1000";

/// Connection options for [`GcsStore`].
#[derive(Debug, Clone)]
pub struct GcsOptions {
    /// Base URL of the storage API.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// OAuth2 bearer token. `None` issues anonymous requests.
    pub access_token: Option<String>,
    /// Google Cloud project used for quota and billing.
    pub project_id: Option<String>,
}

impl Default for GcsOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            access_token: None,
            project_id: None,
        }
    }
}

/// Find application credentials: `GOOGLE_OAUTH_ACCESS_TOKEN`, then the gcloud CLI.
pub fn discover_access_token() -> Option<String> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        let token = token.trim().to_string();
        if !token.is_empty() {
            debug!("Using access token from {}", ACCESS_TOKEN_ENV);
            return Some(token);
        }
    }

    let output = std::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8(output.stdout).ok()?.trim().to_string();
    if token.is_empty() {
        None
    } else {
        debug!("Using access token from gcloud");
        Some(token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    /// Size in bytes; the JSON API encodes 64-bit integers as strings.
    size: String,
}

/// A bucket in Google Cloud Storage.
pub struct GcsStore {
    bucket: String,
    endpoint: Url,
    client: Client,
    access_token: Option<String>,
    project_id: Option<String>,
}

impl std::fmt::Debug for GcsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsStore")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.access_token.is_some())
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl GcsStore {
    /// Create a store for `bucket`.
    pub fn new(bucket: impl Into<String>, options: GcsOptions) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() || bucket.contains('/') {
            return Err(ImageryError::Config(format!("invalid bucket name '{bucket}'")));
        }
        let endpoint = Url::parse(&options.endpoint)
            .map_err(|e| ImageryError::Config(format!("invalid endpoint '{}': {e}", options.endpoint)))?;

        let client = Client::builder().timeout(options.timeout).build()?;

        Ok(Self {
            bucket,
            endpoint,
            client,
            access_token: options.access_token,
            project_id: options.project_id,
        })
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn objects_url(&self, object: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ImageryError::Config(format!("endpoint {} cannot be a base", self.endpoint)))?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "b", self.bucket.as_str(), "o"]);
            if let Some(object) = object {
                // A single segment, so '/' in the object name is percent-encoded
                segments.push(object);
            }
        }
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<reqwest::blocking::Response> {
        let response = authorize(request, self.access_token.as_deref(), self.project_id.as_deref()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageryError::HttpStatus {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }
}

impl ObjectStore for GcsStore {
    fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<String>> {
        let prefix = normalize_prefix(prefix);
        let mut paths = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.objects_url(None)?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("prefix", &prefix)
                    .append_pair("maxResults", LIST_PAGE_SIZE)
                    .append_pair("fields", "items(name),nextPageToken");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page: ObjectList = self.send(self.client.get(url))?.json()?;
            paths.extend(
                page.items
                    .into_iter()
                    .map(|entry| entry.name)
                    .filter(|name| name.ends_with(suffix)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} object(s) under gs://{}/{}", paths.len(), self.bucket, prefix);
        Ok(paths)
    }

    fn open(&self, path: &str) -> Result<Box<dyn ReadSeek>> {
        let metadata_url = self.objects_url(Some(path))?;
        let metadata: ObjectMetadata = self.send(self.client.get(metadata_url.clone()))?.json()?;
        let size = metadata.size.parse::<u64>().map_err(|e| {
            ImageryError::Config(format!("object {} reported invalid size '{}': {e}", path, metadata.size))
        })?;

        let mut media_url = metadata_url;
        media_url.query_pairs_mut().append_pair("alt", "media");

        Ok(Box::new(BlockReader::new(GcsObject {
            client: self.client.clone(),
            url: media_url,
            access_token: self.access_token.clone(),
            project_id: self.project_id.clone(),
            size,
        })))
    }

    fn describe(&self, path: &str) -> String {
        format!("gs://{}/{}", self.bucket, path)
    }
}

fn authorize(request: RequestBuilder, access_token: Option<&str>, project_id: Option<&str>) -> RequestBuilder {
    let request = match access_token {
        Some(token) => request.bearer_auth(token),
        None => request,
    };
    match project_id {
        Some(project) => request.header(USER_PROJECT_HEADER, project),
        None => request,
    }
}

/// List prefixes are directory-like: `a/b` and `a/b/` both mean everything under `a/b/`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// One object, read with HTTP range requests.
#[derive(Debug)]
struct GcsObject {
    client: Client,
    url: Url,
    access_token: Option<String>,
    project_id: Option<String>,
    size: u64,
}

impl RangeSource for GcsObject {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let end = offset + len as u64 - 1;
        let request = self
            .client
            .get(self.url.clone())
            .header(RANGE, format!("bytes={offset}-{end}"));

        let response = authorize(request, self.access_token.as_deref(), self.project_id.as_deref())
            .send()
            .map_err(io::Error::other)?;
        let status = response.status();
        let bytes = response.bytes().map_err(io::Error::other)?;
        match status {
            StatusCode::PARTIAL_CONTENT => Ok(bytes.to_vec()),
            // Server ignored the range and sent the whole object
            StatusCode::OK => {
                let start = (offset as usize).min(bytes.len());
                let stop = (start + len).min(bytes.len());
                Ok(bytes[start..stop].to_vec())
            }
            other => Err(io::Error::other(format!("HTTP {other} reading {}", self.url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GcsStore {
        GcsStore::new("abrupt_thaw", GcsOptions::default()).unwrap()
    }

    #[test]
    fn test_object_url_encodes_slashes() {
        let url = store()
            .objects_url(Some("planet_basemaps/2021q3/quad_1234-5678.tif"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/abrupt_thaw/o/planet_basemaps%2F2021q3%2Fquad_1234-5678.tif"
        );
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("planet_basemaps/global_quarterly_COGs"), "planet_basemaps/global_quarterly_COGs/");
        assert_eq!(normalize_prefix("/a/b/"), "a/b/");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn test_invalid_bucket_rejected() {
        assert!(GcsStore::new("", GcsOptions::default()).is_err());
        assert!(GcsStore::new("a/b", GcsOptions::default()).is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(store().describe("x/y.tif"), "gs://abrupt_thaw/x/y.tif");
    }
}
