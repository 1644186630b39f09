use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::server::error::Error;

static HTTP_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://").expect("static regex should compile"));

/// decode the raw path suffix after /proxy/ into the target url
///
/// decoding is attempted exactly once. clients that forgot to percent-encode
/// get a compatibility pass when the raw segment already looks like a bare
/// http(s) url, everything else is rejected before any upstream call is made.
pub fn decode_target(path_segment: &str) -> Result<String, Error> {
    if path_segment.is_empty() {
        return Err(Error::InvalidTarget(path_segment.to_string()));
    }

    if let Ok(decoded) = urlencoding::decode(path_segment) {
        if HTTP_URL_RE.is_match(&decoded) {
            return Ok(decoded.into_owned());
        }
    }

    // maybe the path was never encoded, if it still reads as a url take it as-is
    if HTTP_URL_RE.is_match(path_segment) {
        warn!("proxy path was not encoded but looks like a url: {}", path_segment);
        return Ok(path_segment.to_string());
    }

    Err(Error::InvalidTarget(path_segment.to_string()))
}

/// origin + path with the final segment removed, always ending in a slash
/// used to resolve relative references found inside a playlist
pub fn base_url(target_url: &str) -> String {
    match Url::parse(target_url) {
        Ok(parsed) => {
            let origin = parsed.origin().ascii_serialization();
            let path = parsed.path();

            if path.is_empty() || path == "/" {
                return format!("{}/", origin);
            }

            let mut segments: Vec<&str> = path.split('/').collect();
            segments.pop(); // drop filename or last path segment
            format!("{}{}/", origin, segments.join("/"))
        }
        Err(e) => {
            debug!("failed to parse base url {}: {}", target_url, e);
            // fallback: cut at the last slash, as long as it isn't the scheme's //
            let scheme_end = target_url.find("://").map(|i| i + 3).unwrap_or(0);
            match target_url.rfind('/') {
                Some(idx) if idx >= scheme_end => target_url[..=idx].to_string(),
                _ => format!("{}/", target_url),
            }
        }
    }
}

/// resolve a (possibly relative) playlist reference against a base url
pub fn resolve_url(base: &str, relative: &str) -> String {
    // already absolute, nothing to do
    if HTTP_URL_RE.is_match(relative) {
        return relative.to_string();
    }

    match Url::parse(base).and_then(|b| b.join(relative)) {
        Ok(resolved) => resolved.to_string(),
        Err(e) => {
            debug!(
                "failed to resolve url: base={}, relative={}, error={}",
                base, relative, e
            );
            if relative.starts_with('/') {
                // root-relative, stick it onto the origin
                if let Ok(parsed) = Url::parse(base) {
                    return format!("{}{}", parsed.origin().ascii_serialization(), relative);
                }
            }
            // same-directory concat with the base truncated to its last slash
            let truncated = match base.rfind('/') {
                Some(idx) => &base[..=idx],
                None => base,
            };
            format!("{}{}", truncated, relative)
        }
    }
}

/// rewrite an absolute url into the internal proxy path form
/// total inverse of [`decode_target`] for well-formed input
pub fn to_proxy_path(absolute_url: &str) -> String {
    format!("/proxy/{}", urlencoding::encode(absolute_url))
}
