//! Provider registry keyed by storage authority.
//!
//! The resolver is built once by the composition root and handed to every
//! caller that needs file access; it is never a global. Providers are created
//! lazily by the [`Factory`] registered for the authority's [`FSType`] and
//! then memoized, so equal authorities always share one provider instance
//! (and with it one status map and one cache).

use crate::provider::FileSystemProvider;
use crate::sync::FileSystemSyncProcessor;
use core_auth::{FSAuthority, FSType};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

/// Builds the provider for one authority.
///
/// Factories run under the resolver lock and must not block or do I/O.
pub trait Factory: Send + Sync {
    fn create(&self, authority: &FSAuthority) -> Arc<dyn FileSystemProvider>;
}

impl<F> Factory for F
where
    F: Fn(&FSAuthority) -> Arc<dyn FileSystemProvider> + Send + Sync,
{
    fn create(&self, authority: &FSAuthority) -> Arc<dyn FileSystemProvider> {
        self(authority)
    }
}

pub struct FileSystemResolver {
    factories: HashMap<FSType, Arc<dyn Factory>>,
    providers: Mutex<HashMap<FSAuthority, Arc<dyn FileSystemProvider>>>,
    disabled: RwLock<HashSet<FSType>>,
}

impl FileSystemResolver {
    pub fn builder() -> FileSystemResolverBuilder {
        FileSystemResolverBuilder::default()
    }

    /// Provider for `authority`, created on first use.
    ///
    /// # Panics
    ///
    /// Panics when no factory is registered for `authority.fs_type`. The set
    /// of backends is fixed at startup, so this is a wiring bug.
    pub fn resolve_provider(&self, authority: &FSAuthority) -> Arc<dyn FileSystemProvider> {
        let mut providers = self.lock_providers();
        if let Some(provider) = providers.get(authority) {
            return provider.clone();
        }

        let Some(factory) = self.factories.get(&authority.fs_type) else {
            panic!(
                "No file system factory registered for {}",
                authority.fs_type
            );
        };

        let provider = factory.create(authority);
        providers.insert(authority.clone(), provider.clone());
        debug!(
            fs_type = %authority.fs_type,
            cached = providers.len(),
            "Created file system provider"
        );
        provider
    }

    pub fn resolve_sync_processor(
        &self,
        authority: &FSAuthority,
    ) -> Arc<dyn FileSystemSyncProcessor> {
        self.resolve_provider(authority).sync_processor()
    }

    /// Backends the user can pick right now.
    pub fn available_fs_types(&self) -> HashSet<FSType> {
        let disabled = self
            .disabled
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.factories
            .keys()
            .filter(|fs_type| !disabled.contains(fs_type))
            .copied()
            .collect()
    }

    /// Hide or show a registered backend, e.g. when a storage permission is
    /// granted or revoked. Already-resolved providers stay usable.
    pub fn set_fs_type_enabled(&self, fs_type: FSType, enabled: bool) {
        let mut disabled = self
            .disabled
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if enabled {
            disabled.remove(&fs_type);
        } else {
            disabled.insert(fs_type);
        }
        info!(%fs_type, enabled, "File system availability changed");
    }

    pub fn is_registered(&self, fs_type: FSType) -> bool {
        self.factories.contains_key(&fs_type)
    }

    pub fn cached_provider_count(&self) -> usize {
        self.lock_providers().len()
    }

    fn lock_providers(&self) -> MutexGuard<'_, HashMap<FSAuthority, Arc<dyn FileSystemProvider>>> {
        // A panicking factory leaves the map untouched; keep serving it.
        self.providers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Default)]
pub struct FileSystemResolverBuilder {
    factories: HashMap<FSType, Arc<dyn Factory>>,
}

impl FileSystemResolverBuilder {
    pub fn register(mut self, fs_type: FSType, factory: impl Factory + 'static) -> Self {
        self.factories.insert(fs_type, Arc::new(factory));
        self
    }

    pub fn build(self) -> FileSystemResolver {
        let mut registered: Vec<_> = self.factories.keys().map(FSType::as_str).collect();
        registered.sort_unstable();
        info!(fs_types = ?registered, "File system resolver ready");

        FileSystemResolver {
            factories: self.factories,
            providers: Mutex::new(HashMap::new()),
            disabled: RwLock::new(HashSet::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regular::RegularFileSystemProvider;
    use crate::saf::SafFileSystemProvider;
    use crate::sync::SyncStatus;
    use bridge_desktop::DirectoryDocumentTree;
    use core_auth::ServerCredentials;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn regular_factory(counter: Arc<AtomicUsize>) -> impl Factory {
        move |authority: &FSAuthority| -> Arc<dyn FileSystemProvider> {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(RegularFileSystemProvider::new(
                authority.clone(),
                std::env::temp_dir(),
            ))
        }
    }

    #[test]
    fn test_equal_authorities_share_one_provider() {
        let created = Arc::new(AtomicUsize::new(0));
        let resolver = FileSystemResolver::builder()
            .register(FSType::InternalStorage, regular_factory(created.clone()))
            .build();

        let first = resolver.resolve_provider(&FSAuthority::internal_storage());
        let second = resolver.resolve_provider(&FSAuthority::internal_storage());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached_provider_count(), 1);
    }

    #[test]
    fn test_distinct_credentials_get_distinct_providers() {
        let created = Arc::new(AtomicUsize::new(0));
        let resolver = FileSystemResolver::builder()
            .register(FSType::WebDav, regular_factory(created.clone()))
            .build();

        let jo =
            FSAuthority::webdav(ServerCredentials::basic("https://dav.example.com", "jo", "a"));
        let ann =
            FSAuthority::webdav(ServerCredentials::basic("https://dav.example.com", "ann", "b"));

        let jo_provider = resolver.resolve_provider(&jo);
        let ann_provider = resolver.resolve_provider(&ann);

        assert!(!Arc::ptr_eq(&jo_provider, &ann_provider));
        assert!(Arc::ptr_eq(&jo_provider, &resolver.resolve_provider(&jo.clone())));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_resolution_creates_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let resolver = Arc::new(
            FileSystemResolver::builder()
                .register(FSType::InternalStorage, regular_factory(created.clone()))
                .build(),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                std::thread::spawn(move || {
                    resolver.resolve_provider(&FSAuthority::internal_storage())
                })
            })
            .collect();
        let providers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(providers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "No file system factory registered for git")]
    fn test_unregistered_type_panics() {
        let resolver = FileSystemResolver::builder().build();
        resolver.resolve_provider(&FSAuthority::git(ServerCredentials::git(
            "https://git.example.com/vault.git",
            "jo",
            "token",
            "main",
        )));
    }

    #[tokio::test]
    async fn test_sync_processor_follows_provider() {
        let tree = Arc::new(DirectoryDocumentTree::new(std::env::temp_dir()));
        let resolver = FileSystemResolver::builder()
            .register(
                FSType::Saf,
                move |authority: &FSAuthority| -> Arc<dyn FileSystemProvider> {
                    Arc::new(SafFileSystemProvider::new(authority.clone(), tree.clone()))
                },
            )
            .build();

        let processor = resolver.resolve_sync_processor(&FSAuthority::saf());
        let root = resolver
            .resolve_provider(&FSAuthority::saf())
            .get_root_file()
            .await
            .unwrap();

        assert_eq!(processor.get_sync_status(&root).await, SyncStatus::NoChanges);
        assert!(processor
            .process(&root, Default::default(), None)
            .await
            .is_err());
    }

    #[test]
    fn test_available_types_follow_availability() {
        let created = Arc::new(AtomicUsize::new(0));
        let resolver = FileSystemResolver::builder()
            .register(FSType::InternalStorage, regular_factory(created.clone()))
            .register(FSType::ExternalStorage, regular_factory(created))
            .build();

        assert_eq!(
            resolver.available_fs_types(),
            HashSet::from([FSType::InternalStorage, FSType::ExternalStorage])
        );

        resolver.set_fs_type_enabled(FSType::ExternalStorage, false);
        assert_eq!(
            resolver.available_fs_types(),
            HashSet::from([FSType::InternalStorage])
        );
        assert!(resolver.is_registered(FSType::ExternalStorage));

        resolver.set_fs_type_enabled(FSType::ExternalStorage, true);
        assert!(resolver
            .available_fs_types()
            .contains(&FSType::ExternalStorage));
    }
}
