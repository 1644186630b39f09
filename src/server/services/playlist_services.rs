use std::sync::Arc;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::server::error::{AppResult, Error};
use crate::server::utils::url_utils::{base_url, resolve_url, to_proxy_path};

use super::fetch_services::{ClientHeaders, DynFetchService};
use super::proxy_cache_services::DynProxyCacheService;

static URI_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"URI="([^"]+)""#).expect("static regex should compile"));

static BANDWIDTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"BANDWIDTH=(\d+)").expect("static regex should compile"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Master,
    Media,
    Opaque,
}

/// cheap pre-check on raw bytes, used before committing to a utf-8 conversion
pub fn looks_like_playlist(content_type: &str, body: &[u8]) -> bool {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("application/vnd.apple.mpegurl")
        || ct.contains("application/x-mpegurl")
        || ct.contains("audio/mpegurl")
    {
        return true;
    }

    body.trim_ascii_start().starts_with(b"#EXTM3U")
}

/// content-type wins, body sniffing is the fallback
/// anything that is neither is opaque and passes through untouched
pub fn classify(content_type: &str, body: &str) -> PlaylistKind {
    if !looks_like_playlist(content_type, body.as_bytes()) {
        return PlaylistKind::Opaque;
    }

    if body.contains("#EXT-X-STREAM-INF") || body.contains("#EXT-X-MEDIA:") {
        PlaylistKind::Master
    } else {
        PlaylistKind::Media
    }
}

// swap the quoted URI inside an #EXT-X-KEY / #EXT-X-MAP attribute line for a
// proxy path, leaving the rest of the attributes alone
fn rewrite_uri_attribute(line: &str, base: &str) -> String {
    URI_ATTR_RE
        .replace(line, |caps: &regex::Captures| {
            let absolute = resolve_url(base, &caps[1]);
            debug!("rewriting attribute URI: '{}' -> '{}'", &caps[1], absolute);
            format!(r#"URI="{}""#, to_proxy_path(&absolute))
        })
        .into_owned()
}

/// line-by-line rewrite of a media playlist so every reference routes back
/// through the proxy
///
/// interior blank lines are dropped, a single trailing blank line survives so
/// playlists ending in a newline round-trip byte-identical
pub fn rewrite_media_playlist(target_url: &str, content: &str) -> String {
    let base = base_url(target_url);
    let lines: Vec<&str> = content.split('\n').collect();
    let mut output: Vec<String> = Vec::with_capacity(lines.len());

    for (i, raw) in lines.iter().enumerate() {
        let line = raw.trim();

        if line.is_empty() {
            if i == lines.len() - 1 {
                output.push(String::new());
            }
            continue;
        }

        if line.starts_with("#EXT-X-KEY") || line.starts_with("#EXT-X-MAP") {
            output.push(rewrite_uri_attribute(line, &base));
            continue;
        }

        if line.starts_with('#') {
            output.push(line.to_string());
            continue;
        }

        // bare line, must be a segment reference
        let absolute = resolve_url(&base, line);
        output.push(to_proxy_path(&absolute));
    }

    output.join("\n")
}

/// resolves master playlists down to a single rewritten media playlist,
/// recursing through nested masters up to the configured depth
pub struct PlaylistService {
    fetch: DynFetchService,
    cache: DynProxyCacheService,
    config: Arc<AppConfig>,
}

impl PlaylistService {
    pub fn new(
        fetch: DynFetchService,
        cache: DynProxyCacheService,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            fetch,
            cache,
            config,
        }
    }

    /// classify-then-dispatch entry point for any playlist body
    /// boxed because master resolution recurses back into it
    pub fn process<'a>(
        &'a self,
        target_url: &'a str,
        content: &'a str,
        depth: u32,
    ) -> BoxFuture<'a, AppResult<String>> {
        Box::pin(async move {
            if content.contains("#EXT-X-STREAM-INF") || content.contains("#EXT-X-MEDIA:") {
                debug!("detected master playlist: {} (depth {})", target_url, depth);
                self.resolve_master(target_url, content, depth).await
            } else {
                debug!("detected media playlist: {}", target_url);
                Ok(rewrite_media_playlist(target_url, content))
            }
        })
    }

    async fn resolve_master(
        &self,
        target_url: &str,
        content: &str,
        depth: u32,
    ) -> AppResult<String> {
        if depth > self.config.max_recursion {
            return Err(Error::RecursionLimitExceeded {
                url: target_url.to_string(),
                limit: self.config.max_recursion,
            });
        }

        let base = base_url(target_url);
        let lines: Vec<&str> = content.split('\n').collect();

        let mut best_bandwidth: i64 = -1;
        let mut best_variant = String::new();

        // forward scan keeping the candidate whenever bandwidth >= best seen,
        // so equal-bandwidth entries resolve to the LAST one in document order.
        // long-standing behavior that players depend on, don't "fix" it
        let mut i = 0;
        while i < lines.len() {
            if lines[i].starts_with("#EXT-X-STREAM-INF") {
                let bandwidth: i64 = BANDWIDTH_RE
                    .captures(lines[i])
                    .and_then(|caps| caps[1].parse().ok())
                    .unwrap_or(0);

                // the variant uri is the next non-blank, non-comment line
                let mut variant_uri = "";
                let mut j = i + 1;
                while j < lines.len() {
                    let candidate = lines[j].trim();
                    if !candidate.is_empty() && !candidate.starts_with('#') {
                        variant_uri = candidate;
                        i = j;
                        break;
                    }
                    j += 1;
                }

                if !variant_uri.is_empty() && bandwidth >= best_bandwidth {
                    best_bandwidth = bandwidth;
                    best_variant = resolve_url(&base, variant_uri);
                }
            }
            i += 1;
        }

        if best_variant.is_empty() {
            // no STREAM-INF entries, settle for the first thing that looks like
            // a sub-playlist reference
            for raw in &lines {
                let line = raw.trim();
                if !line.is_empty()
                    && !line.starts_with('#')
                    && (line.ends_with(".m3u8") || line.contains(".m3u8?"))
                {
                    best_variant = resolve_url(&base, line);
                    debug!("fallback sub-playlist reference: {}", best_variant);
                    break;
                }
            }
        }

        if best_variant.is_empty() {
            // nothing selectable at all, degenerate master (audio/subtitle-only
            // renditions for example), rewrite it as a media playlist
            warn!(
                "no usable variant in master playlist {}, rewriting as media",
                target_url
            );
            return Ok(rewrite_media_playlist(target_url, content));
        }

        if let Some(cached) = self.cache.get_playlist(&best_variant).await {
            return Ok(cached);
        }

        debug!(
            "selected variant (bandwidth {}): {}",
            best_bandwidth, best_variant
        );

        // sub-playlist fetches deliberately carry none of the client's headers
        let fetched = self.fetch.fetch(&best_variant, &ClientHeaders::default()).await?;
        let text = String::from_utf8_lossy(&fetched.body);

        let processed = if classify(&fetched.content_type, &text) == PlaylistKind::Opaque {
            // upstream lied, variant url served something that isn't a playlist
            // rewriting it as media is the most useful thing left to do
            debug!(
                "variant {} is not a playlist (type: {})",
                best_variant, fetched.content_type
            );
            rewrite_media_playlist(&best_variant, &text)
        } else {
            self.process(&best_variant, &text, depth + 1).await?
        };

        // best-effort write, the response never waits on the cache
        let cache = self.cache.clone();
        let variant = best_variant.clone();
        let body = processed.clone();
        tokio::spawn(async move {
            cache.put_playlist(&variant, body).await;
        });

        Ok(processed)
    }
}
