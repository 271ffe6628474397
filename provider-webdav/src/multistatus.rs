//! PROPFIND request body and `207 Multi-Status` parsing.
//!
//! Servers disagree on namespace prefixes (`D:`, `d:`, none), so elements are
//! matched by local name only.

use crate::error::{Result, WebDavError};
use chrono::DateTime;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Properties requested for every resource.
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:getetag/>
    <D:getlastmodified/>
    <D:getcontentlength/>
    <D:resourcetype/>
  </D:prop>
</D:propfind>"#;

/// One `<response>` of a multistatus body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResource {
    /// Decoded path relative to the server root, e.g. `/vaults/db.kdbx`
    pub href: String,
    pub is_collection: bool,
    pub etag: Option<String>,
    /// HTTP-date as sent by the server
    pub last_modified: Option<String>,
    pub content_length: Option<u64>,
}

impl DavResource {
    /// Revision used for change detection: the ETag, or the modification date
    /// for servers that send no ETags.
    pub fn revision(&self) -> Option<String> {
        self.etag.clone().or_else(|| self.last_modified.clone())
    }

    /// Modification time in milliseconds since the epoch
    pub fn modified_millis(&self) -> Option<i64> {
        self.last_modified.as_deref().and_then(parse_http_date)
    }
}

/// Strip weak-validator markers and quotes from an ETag header or property.
pub fn normalize_etag(raw: &str) -> Option<String> {
    let etag = raw.trim();
    let etag = etag.strip_prefix("W/").unwrap_or(etag);
    let etag = etag.trim_matches('"');
    if etag.is_empty() {
        None
    } else {
        Some(etag.to_string())
    }
}

pub fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Href,
    Etag,
    LastModified,
    ContentLength,
}

/// Parse a multistatus body into resources.
pub fn parse_multistatus(xml: &str) -> Result<Vec<DavResource>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut resources = Vec::new();
    let mut current: Option<DavResource> = None;
    let mut field = Field::None;
    let mut in_resource_type = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"response" => current = Some(DavResource::default()),
                b"href" => field = Field::Href,
                b"getetag" => field = Field::Etag,
                b"getlastmodified" => field = Field::LastModified,
                b"getcontentlength" => field = Field::ContentLength,
                b"resourcetype" => in_resource_type = true,
                b"collection" if in_resource_type => {
                    if let Some(resource) = current.as_mut() {
                        resource.is_collection = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if in_resource_type && e.local_name().as_ref() == b"collection" {
                    if let Some(resource) = current.as_mut() {
                        resource.is_collection = true;
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| WebDavError::ParseError(e.to_string()))?;
                if let Some(resource) = current.as_mut() {
                    match field {
                        Field::Href => resource.href = decode_href(&text),
                        Field::Etag => resource.etag = normalize_etag(&text),
                        Field::LastModified => resource.last_modified = Some(text.to_string()),
                        Field::ContentLength => resource.content_length = text.trim().parse().ok(),
                        Field::None => {}
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(resource) = current.take() {
                        if !resource.href.is_empty() {
                            resources.push(resource);
                        }
                    }
                }
                b"resourcetype" => in_resource_type = false,
                _ => field = Field::None,
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(WebDavError::ParseError(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(resources)
}

/// Reduce an href (absolute URL or absolute path) to a decoded path.
fn decode_href(href: &str) -> String {
    let href = href.trim();
    let path = match href.find("://") {
        Some(scheme_end) => {
            let after_scheme = &href[scheme_end + 3..];
            after_scheme
                .find('/')
                .map(|i| &after_scheme[i..])
                .unwrap_or("/")
        }
        None => href,
    };
    urlencoding::decode(path)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| path.to_string())
}
