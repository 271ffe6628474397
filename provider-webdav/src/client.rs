//! WebDAV client implementation
//!
//! Implements [`RemoteApiClientV2`] on top of the host [`HttpClient`].

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_auth::{FSAuthority, ServerCredentials};
use core_fs::descriptor::{file_name, normalize_path, parent_path, ROOT_PATH};
use core_fs::OperationResult;
use core_runtime::logging::strip_path;
use core_sync::{RemoteApiClientV2, RemoteFileMetadata};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{Result, WebDavError};
use crate::multistatus::{
    normalize_etag, parse_http_date, parse_multistatus, DavResource, PROPFIND_BODY,
};

/// Default timeout applied to every request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `207 Multi-Status`
const MULTI_STATUS: u16 = 207;

/// `405 Method Not Allowed`, returned by MKCOL when the collection exists
const METHOD_NOT_ALLOWED: u16 = 405;

/// `409 Conflict`, returned by PUT when an intermediate collection is missing
const CONFLICT: u16 = 409;

struct BasicAuth {
    username: String,
    password: String,
}

/// WebDAV client for one server account.
///
/// Paths passed in and returned are relative to the server URL of the
/// credentials, so `/db.kdbx` addresses `https://host/dav/db.kdbx` when the
/// server URL is `https://host/dav/`.
///
/// # Example
///
/// ```ignore
/// use provider_webdav::WebDavClient;
/// use core_sync::RemoteApiClientV2;
///
/// let client = WebDavClient::new(http_client, &authority);
/// let files = client.list_dir("/vaults").await?;
/// ```
pub struct WebDavClient {
    http_client: Arc<dyn HttpClient>,
    /// Server URL without trailing slash
    base_url: String,
    /// Path component of `base_url`, e.g. `/dav`
    base_path: String,
    auth: Option<BasicAuth>,
    timeout: Duration,
}

impl WebDavClient {
    /// Create a client for `authority`.
    ///
    /// An authority without basic credentials yields a client whose every
    /// call fails with an authentication error.
    pub fn new(http_client: Arc<dyn HttpClient>, authority: &FSAuthority) -> Self {
        let (base_url, auth) = match &authority.credentials {
            Some(ServerCredentials::Basic {
                server_url,
                username,
                password,
            }) => (
                server_url.trim().trim_end_matches('/').to_string(),
                Some(BasicAuth {
                    username: username.clone(),
                    password: password.clone(),
                }),
            ),
            _ => (String::new(), None),
        };

        Self {
            http_client,
            base_path: Self::path_of(&base_url),
            base_url,
            auth,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn path_of(url: &str) -> String {
        let after_scheme = url.find("://").map(|i| &url[i + 3..]).unwrap_or(url);
        after_scheme
            .find('/')
            .map(|i| after_scheme[i..].trim_end_matches('/').to_string())
            .unwrap_or_default()
    }

    /// Absolute URL of `path`; collections get a trailing slash.
    fn url(&self, path: &str, is_collection: bool) -> String {
        let path = normalize_path(path);
        let encoded: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();

        let mut url = format!("{}/{}", self.base_url, encoded.join("/"));
        if is_collection && !url.ends_with('/') {
            url.push('/');
        }
        url
    }

    /// Map a decoded server href back to a path relative to the server URL.
    fn relative_path(&self, href: &str) -> String {
        let relative = href.strip_prefix(&self.base_path).unwrap_or(href);
        normalize_path(relative)
    }

    fn request(&self, method: HttpMethod, url: String) -> Result<HttpRequest> {
        let auth = self.auth.as_ref().ok_or(WebDavError::MissingCredentials)?;
        Ok(HttpRequest::new(method, url)
            .basic_auth(&auth.username, &auth.password)
            .timeout(self.timeout))
    }

    /// Execute `request`, turning non-success statuses into errors.
    async fn send(&self, request: HttpRequest, path: &str) -> Result<HttpResponse> {
        let method = request.method;
        let response = self.http_client.execute(request).await?;
        if response.is_success() {
            debug!(
                method = method.as_str(),
                status = response.status,
                file = strip_path(path),
                "WebDAV request succeeded"
            );
            Ok(response)
        } else {
            warn!(
                method = method.as_str(),
                status = response.status,
                file = strip_path(path),
                "WebDAV request failed"
            );
            Err(WebDavError::from_status(response.status, path, &response.body))
        }
    }

    /// PROPFIND `path` with the given depth (0 or 1).
    #[instrument(skip(self))]
    pub async fn propfind(&self, path: &str, depth: u8) -> Result<Vec<DavResource>> {
        let request = self
            .request(HttpMethod::Propfind, self.url(path, depth > 0))?
            .header("Depth", depth.to_string())
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(Bytes::from_static(PROPFIND_BODY.as_bytes()));

        let response = self.send(request, path).await?;
        if response.status != MULTI_STATUS {
            return Err(WebDavError::ParseError(format!(
                "Expected 207 Multi-Status, got {}",
                response.status
            )));
        }
        parse_multistatus(&response.text()?)
    }

    async fn stat(&self, path: &str) -> Result<RemoteFileMetadata> {
        let path = normalize_path(path);
        let resources = self.propfind(&path, 0).await?;
        resources
            .iter()
            .find(|r| self.relative_path(&r.href) == path)
            .or_else(|| resources.first())
            .map(|r| self.metadata(r))
            .ok_or_else(|| WebDavError::ParseError(format!("No properties returned for {}", path)))
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        let request = self.request(HttpMethod::Get, self.url(path, false))?;
        self.send(request, path).await
    }

    /// PUT `body` to `path`, returning the ETag the server assigned if it
    /// sent one.
    pub async fn put(&self, path: &str, body: Bytes) -> Result<HttpResponse> {
        let request = self
            .request(HttpMethod::Put, self.url(path, false))?
            .header("Content-Type", "application/octet-stream")
            .body(body);
        self.send(request, path).await
    }

    /// Create the collection at `path`; an existing collection is not an error.
    pub async fn mkcol(&self, path: &str) -> Result<()> {
        let request = self.request(HttpMethod::Mkcol, self.url(path, true))?;
        match self.send(request, path).await {
            Ok(_) => Ok(()),
            Err(WebDavError::ApiError { status_code, .. }) if status_code == METHOD_NOT_ALLOWED => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Create every missing ancestor collection of `path`.
    async fn create_parents(&self, path: &str) -> Result<()> {
        let mut ancestors = Vec::new();
        let mut current = parent_path(path);
        while let Some(dir) = current {
            if dir == ROOT_PATH {
                break;
            }
            current = parent_path(&dir);
            ancestors.push(dir);
        }

        for dir in ancestors.iter().rev() {
            self.mkcol(dir).await?;
        }
        Ok(())
    }

    fn metadata(&self, resource: &DavResource) -> RemoteFileMetadata {
        let path = self.relative_path(&resource.href);
        RemoteFileMetadata {
            uid: path.clone(),
            name: file_name(&path).to_string(),
            revision: if resource.is_collection {
                None
            } else {
                resource.revision()
            },
            is_directory: resource.is_collection,
            modified: resource.modified_millis(),
            path,
        }
    }

    /// Metadata of a file from the validators of a GET or PUT response.
    fn metadata_from_headers(
        &self,
        path: &str,
        response: &HttpResponse,
    ) -> Option<RemoteFileMetadata> {
        let etag = response.header("ETag").and_then(normalize_etag)?;
        let path = normalize_path(path);
        Some(RemoteFileMetadata {
            uid: path.clone(),
            name: file_name(&path).to_string(),
            revision: Some(etag),
            is_directory: false,
            modified: response.header("Last-Modified").and_then(parse_http_date),
            path,
        })
    }
}

#[async_trait]
impl RemoteApiClientV2 for WebDavClient {
    async fn list_dir(&self, path: &str) -> OperationResult<Vec<RemoteFileMetadata>> {
        let dir = normalize_path(path);
        let mut entries: Vec<RemoteFileMetadata> = self
            .propfind(&dir, 1)
            .await?
            .iter()
            .map(|resource| self.metadata(resource))
            .filter(|entry| entry.path != dir)
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_file_info(&self, path: &str) -> OperationResult<RemoteFileMetadata> {
        Ok(self.stat(path).await?)
    }

    #[instrument(skip(self, local_path))]
    async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> OperationResult<RemoteFileMetadata> {
        // Stat first: if the file changes in between, the older revision is
        // recorded and the next status check downloads again.
        let stat = self.stat(remote_path).await?;
        let response = self.get(remote_path).await?;
        tokio::fs::write(local_path, &response.body).await?;

        debug!(bytes = response.body.len(), "Downloaded");
        Ok(self
            .metadata_from_headers(remote_path, &response)
            .unwrap_or(stat))
    }

    #[instrument(skip(self, local_path))]
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> OperationResult<RemoteFileMetadata> {
        let body = Bytes::from(tokio::fs::read(local_path).await?);

        let response = match self.put(remote_path, body.clone()).await {
            Err(WebDavError::ApiError { status_code, .. }) if status_code == CONFLICT => {
                debug!("Parent collection missing, creating it");
                self.create_parents(remote_path).await?;
                self.put(remote_path, body).await?
            }
            other => other?,
        };

        match self.metadata_from_headers(remote_path, &response) {
            Some(metadata) => Ok(metadata),
            None => Ok(self.stat(remote_path).await?),
        }
    }

    async fn get_root(&self) -> OperationResult<RemoteFileMetadata> {
        let mut root = self.stat(ROOT_PATH).await?;
        root.path = ROOT_PATH.to_string();
        root.uid = ROOT_PATH.to_string();
        root.is_directory = true;
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use core_fs::OperationErrorKind;
    use mockall::mock;
    use mockall::Sequence;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn authority() -> FSAuthority {
        FSAuthority::webdav(ServerCredentials::basic(
            "https://dav.example.com/remote.php/dav/",
            "jo",
            "secret",
        ))
    }

    fn response(status: u16, headers: &[(&str, &str)], body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn file_props(href: &str, etag: &str) -> String {
        format!(
            r#"<?xml version="1.0"?><d:multistatus xmlns:d="DAV:"><d:response>
              <d:href>{}</d:href>
              <d:propstat><d:prop><d:resourcetype/><d:getetag>"{}"</d:getetag>
              <d:getlastmodified>Wed, 15 May 2024 10:30:00 GMT</d:getlastmodified></d:prop>
              <d:status>HTTP/1.1 200 OK</d:status></d:propstat>
            </d:response></d:multistatus>"#,
            href, etag
        )
    }

    #[test]
    fn test_url_building() {
        let client = WebDavClient::new(Arc::new(MockHttpClient::new()), &authority());

        assert_eq!(
            client.url("/vaults/My Passwords.kdbx", false),
            "https://dav.example.com/remote.php/dav/vaults/My%20Passwords.kdbx"
        );
        assert_eq!(
            client.url("/vaults", true),
            "https://dav.example.com/remote.php/dav/vaults/"
        );
        assert_eq!(
            client.relative_path("/remote.php/dav/vaults/db.kdbx"),
            "/vaults/db.kdbx"
        );
    }

    #[tokio::test]
    async fn test_get_file_info_sends_depth_zero_propfind() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .withf(|req| {
                req.method == HttpMethod::Propfind
                    && req.headers.get("Depth").map(String::as_str) == Some("0")
                    && req.headers.contains_key("Authorization")
                    && req.url.ends_with("/remote.php/dav/db.kdbx")
            })
            .returning(|_| Ok(response(207, &[], &file_props("/remote.php/dav/db.kdbx", "abc"))));

        let client = WebDavClient::new(Arc::new(http), &authority());
        let info = client.get_file_info("/db.kdbx").await.unwrap();

        assert_eq!(info.path, "/db.kdbx");
        assert_eq!(info.uid, "/db.kdbx");
        assert_eq!(info.name, "db.kdbx");
        assert_eq!(info.revision.as_deref(), Some("abc"));
        assert!(!info.is_directory);
    }

    #[tokio::test]
    async fn test_list_dir_skips_the_directory_itself() {
        let body = r#"<d:multistatus xmlns:d="DAV:">
          <d:response><d:href>/remote.php/dav/vaults/</d:href>
            <d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat>
          </d:response>
          <d:response><d:href>/remote.php/dav/vaults/work.kdbx</d:href>
            <d:propstat><d:prop><d:resourcetype/><d:getetag>"w1"</d:getetag></d:prop></d:propstat>
          </d:response>
          <d:response><d:href>/remote.php/dav/vaults/archive/</d:href>
            <d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat>
          </d:response>
        </d:multistatus>"#;

        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| req.headers.get("Depth").map(String::as_str) == Some("1"))
            .returning(move |_| Ok(response(207, &[], body)));

        let client = WebDavClient::new(Arc::new(http), &authority());
        let entries = client.list_dir("/vaults").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "archive");
        assert!(entries[0].is_directory);
        assert_eq!(entries[0].revision, None);
        assert_eq!(entries[1].path, "/vaults/work.kdbx");
        assert_eq!(entries[1].revision.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn test_status_codes_map_to_error_kinds() {
        for (status, kind) in [
            (401, OperationErrorKind::Auth),
            (403, OperationErrorKind::Auth),
            (404, OperationErrorKind::FileNotFound),
            (500, OperationErrorKind::GenericIo),
        ] {
            let mut http = MockHttpClient::new();
            http.expect_execute()
                .returning(move |_| Ok(response(status, &[], "")));
            let client = WebDavClient::new(Arc::new(http), &authority());

            let err = client.get_file_info("/db.kdbx").await.unwrap_err();
            assert_eq!(err.kind, kind, "status {}", status);
        }

        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Err(BridgeError::Network("connection refused".into())));
        let client = WebDavClient::new(Arc::new(http), &authority());
        let err = client.get_file_info("/db.kdbx").await.unwrap_err();
        assert_eq!(err.kind, OperationErrorKind::NetworkIo);
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_request() {
        let mut http = MockHttpClient::new();
        http.expect_execute().never();

        let authority = FSAuthority {
            credentials: None,
            ..authority()
        };
        let client = WebDavClient::new(Arc::new(http), &authority);

        let err = client.get_root().await.unwrap_err();
        assert_eq!(err.kind, OperationErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_download_prefers_get_etag() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("db.kdbx");

        let mut seq = Sequence::new();
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.method == HttpMethod::Propfind)
            .returning(|_| Ok(response(207, &[], &file_props("/remote.php/dav/db.kdbx", "old"))));
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.method == HttpMethod::Get)
            .returning(|_| Ok(response(200, &[("etag", "\"new\"")], "vault bytes")));

        let client = WebDavClient::new(Arc::new(http), &authority());
        let metadata = client.download_file("/db.kdbx", &local).await.unwrap();

        assert_eq!(metadata.revision.as_deref(), Some("new"));
        assert_eq!(std::fs::read(&local).unwrap(), b"vault bytes");
    }

    #[tokio::test]
    async fn test_upload_without_etag_stats_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("db.kdbx");
        std::fs::write(&local, b"edited").unwrap();

        let mut seq = Sequence::new();
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| {
                req.method == HttpMethod::Put && req.body.as_deref() == Some(&b"edited"[..])
            })
            .returning(|_| Ok(response(204, &[], "")));
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.method == HttpMethod::Propfind)
            .returning(|_| Ok(response(207, &[], &file_props("/remote.php/dav/db.kdbx", "v2"))));

        let client = WebDavClient::new(Arc::new(http), &authority());
        let metadata = client.upload_file(&local, "/db.kdbx").await.unwrap();

        assert_eq!(metadata.revision.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_upload_creates_missing_collections() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("db.kdbx");
        std::fs::write(&local, b"new vault").unwrap();

        let mut seq = Sequence::new();
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.method == HttpMethod::Put)
            .returning(|_| Ok(response(409, &[], "Parent missing")));
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.method == HttpMethod::Mkcol && req.url.ends_with("/dav/a/"))
            .returning(|_| Ok(response(405, &[], "")));
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.method == HttpMethod::Mkcol && req.url.ends_with("/dav/a/b/"))
            .returning(|_| Ok(response(201, &[], "")));
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.method == HttpMethod::Put)
            .returning(|_| Ok(response(201, &[("ETag", "W/\"c1\"")], "")));

        let client = WebDavClient::new(Arc::new(http), &authority());
        let metadata = client.upload_file(&local, "/a/b/db.kdbx").await.unwrap();

        assert_eq!(metadata.path, "/a/b/db.kdbx");
        assert_eq!(metadata.revision.as_deref(), Some("c1"));
    }
}
