//! # WebDAV Provider
//!
//! Remote backend for databases stored on a WebDAV server.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`WebDavClient`], a [`RemoteApiClientV2`](core_sync::RemoteApiClientV2)
//!   speaking PROPFIND, GET, PUT and MKCOL through the host `HttpClient`
//! - Basic authentication from the authority's credentials
//! - ETag based revisions, with the modification date as fallback
//! - [`WebDavFactory`] for registration with the file system resolver

pub mod client;
pub mod error;
pub mod factory;
pub mod multistatus;

pub use client::{WebDavClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::{Result, WebDavError};
pub use factory::WebDavFactory;
pub use multistatus::DavResource;
