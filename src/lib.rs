//! Workspace placeholder crate.
//!
//! This crate exposes feature flags that map onto the individual workspace
//! crates. Host applications can depend on `passvault-workspace` and enable
//! `webdav` or `git` without wiring each backend crate themselves.

#[cfg(any(feature = "desktop-shims", feature = "webdav", feature = "git"))]
pub use core_service::{CoreDependencies, CoreError, CoreService};
