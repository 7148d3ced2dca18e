//! HTTP HEAD / metadata probing (the read side of the HTTP client facade, C1).
//!
//! Uses the curl crate (libcurl) to fetch response headers and confirm
//! `Content-Length` and `Accept-Ranges: bytes`. Redirects are surfaced to the
//! caller rather than followed automatically, so the orchestrator can update
//! `effectiveUrl` and re-probe explicitly (see the shared redirect budget in
//! [`crate::client`]).

mod parse;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::str;

use crate::client::ClientConfig;

/// Result of a HEAD request: status plus the key headers needed for
/// segmented download planning.
#[derive(Debug, Clone)]
pub struct HeadResult {
    /// Raw HTTP status code.
    pub status_code: u32,
    /// Total size in bytes, if `Content-Length` is present.
    pub content_length: Option<u64>,
    /// True if server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    /// `ETag` value if present.
    pub etag: Option<String>,
    /// `Last-Modified` value if present.
    pub last_modified: Option<String>,
    /// `Content-Disposition` value if present (filename hint).
    pub content_disposition: Option<String>,
    /// `Location` header value, present when `status_code` is 301/302.
    pub location: Option<String>,
}

impl HeadResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_redirect(&self) -> bool {
        crate::client::is_redirect_status(self.status_code)
    }
}

/// Performs a single HEAD request (no redirect following) and returns parsed
/// metadata. Runs in the current thread; call from `spawn_blocking` when
/// driven from async code.
pub fn probe(url: &str, custom_headers: &HashMap<String, String>, cfg: &ClientConfig) -> Result<HeadResult> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.nobody(true)?; // HEAD request
    easy.follow_location(false)?;
    crate::client::apply_common_easy(&mut easy, cfg)?;

    let mut list = crate::client::build_header_list(custom_headers)?;
    // Force identity so Content-Length reflects the byte count workers must
    // reproduce via Range requests.
    list.append("Accept-Encoding: identity")?;
    easy.http_headers(list)?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform().context("HEAD request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    parse::parse_headers(&headers, code)
}
