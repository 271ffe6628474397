//! Resolver factory for WebDAV authorities.

use bridge_traits::http::HttpClient;
use core_auth::FSAuthority;
use core_fs::{Factory, FileSystemProvider};
use core_runtime::logging::redact_if_sensitive;
use core_sync::{RemoteFileSystemProvider, SyncContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::client::{WebDavClient, DEFAULT_REQUEST_TIMEOUT};

/// Builds a [`RemoteFileSystemProvider`] backed by a [`WebDavClient`].
///
/// All providers built by one factory share its [`SyncContext`], hence the
/// same cache table and in-flight map. Each provider only sees the in-flight
/// operations of its own authority.
pub struct WebDavFactory {
    http_client: Arc<dyn HttpClient>,
    context: SyncContext,
    timeout: Duration,
}

impl WebDavFactory {
    pub fn new(http_client: Arc<dyn HttpClient>, context: SyncContext) -> Self {
        Self {
            http_client,
            context,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Factory for WebDavFactory {
    fn create(&self, authority: &FSAuthority) -> Arc<dyn FileSystemProvider> {
        let user = authority.credentials.as_ref().map_or("", |c| c.username());
        debug!(
            server = %authority,
            user = %redact_if_sensitive("user", user),
            "Creating WebDAV provider"
        );
        let client =
            WebDavClient::new(self.http_client.clone(), authority).with_timeout(self.timeout);
        Arc::new(RemoteFileSystemProvider::new(
            authority.clone(),
            client,
            self.context.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::time::FixedClock;
    use core_auth::{FSType, ServerCredentials};
    use core_fs::FileSystemResolver;
    use core_sync::{create_test_pool, RemoteFileCache, SqliteRemoteFileRepository};
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    #[tokio::test]
    async fn test_resolver_builds_one_provider_per_account() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_test_pool().await.unwrap();
        let cache = RemoteFileCache::new(
            FSType::WebDav,
            Arc::new(SqliteRemoteFileRepository::new(pool)),
            dir.path(),
        );
        let context = SyncContext::new(cache, Arc::new(FixedClock::new(0)));

        let resolver = FileSystemResolver::builder()
            .register(
                FSType::WebDav,
                WebDavFactory::new(Arc::new(MockHttpClient::new()), context),
            )
            .build();

        let jo =
            FSAuthority::webdav(ServerCredentials::basic("https://dav.example.com", "jo", "a"));
        let kim =
            FSAuthority::webdav(ServerCredentials::basic("https://dav.example.com", "kim", "b"));

        let first = resolver.resolve_provider(&jo);
        assert!(Arc::ptr_eq(&first, &resolver.resolve_provider(&jo)));
        assert!(!Arc::ptr_eq(&first, &resolver.resolve_provider(&kim)));
        assert_eq!(first.fs_authority(), jo);
        assert!(!first.authenticator().is_authentication_required());
    }
}
