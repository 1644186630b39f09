use axum::{
    Router,
    extract::Extension,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::str::FromStr;
use tracing::debug;

use crate::server::{
    error::{AppResult, Error},
    services::{
        fetch_services::ClientHeaders, playlist_services::looks_like_playlist,
        proxy_cache_services::CachedFetch, proxy_services::ProxyServices,
    },
    utils::url_utils::decode_target,
};

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new()
            .route(
                "/proxy/{*path}",
                get(Self::proxy_get).options(Self::proxy_options),
            )
            // a bare /proxy carries no target and is a client error, not a 404
            .route("/proxy", get(Self::missing_target))
    }

    /// rewritten playlists always go out under the hls media type with the
    /// proxy's own caching policy, whatever upstream claimed
    fn build_playlist_response(processed_body: String, cache_ttl: u64) -> Response {
        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            "application/vnd.apple.mpegurl;charset=utf-8"
                .parse()
                .expect("Static header value should parse"),
        );
        response_headers.insert(
            header::CACHE_CONTROL,
            format!("public, max-age={}", cache_ttl)
                .parse()
                .expect("Cache-Control header should parse"),
        );

        (StatusCode::OK, response_headers, processed_body).into_response()
    }

    /// opaque content passes through with upstream's headers, minus anything
    /// describing the wire encoding of a body we already decoded
    fn build_passthrough_response(
        body: Vec<u8>,
        upstream_headers: &std::collections::HashMap<String, String>,
        cache_ttl: u64,
    ) -> Response {
        let mut response_headers = HeaderMap::new();

        for (name, value) in upstream_headers {
            if name == "content-encoding"
                || name == "content-length"
                || name == "transfer-encoding"
                || name == "cache-control"
            {
                continue;
            }
            if let (Ok(name), Ok(value)) =
                (HeaderName::from_str(name), HeaderValue::from_str(value))
            {
                response_headers.insert(name, value);
            }
        }

        response_headers.insert(
            header::CACHE_CONTROL,
            format!("public, max-age={}", cache_ttl)
                .parse()
                .expect("Cache-Control header should parse"),
        );

        (StatusCode::OK, response_headers, body).into_response()
    }

    async fn proxy_get(
        Extension(services): Extension<ProxyServices>,
        uri: Uri,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        // take the raw path suffix ourselves - the Path extractor percent-decodes,
        // and the target must only ever be decoded once
        let encoded = uri.path().strip_prefix("/proxy/").unwrap_or("");
        let target_url = decode_target(encoded)?;

        debug!("proxying: {}", target_url);

        let client_headers = ClientHeaders::from_headers(&headers);
        let cache_ttl = services.config.cache_ttl;

        // raw cache first, a hit skips the upstream round trip entirely but
        // still goes through classification and rewriting
        if let Some(cached) = services.cache.get_raw(&target_url).await {
            let content_type = cached
                .headers
                .get("content-type")
                .cloned()
                .unwrap_or_default();

            if looks_like_playlist(&content_type, &cached.body) {
                let text = String::from_utf8_lossy(&cached.body).into_owned();
                let processed = services.playlists.process(&target_url, &text, 0).await?;
                return Ok(Self::build_playlist_response(processed, cache_ttl));
            }

            return Ok(Self::build_passthrough_response(
                cached.body.clone(),
                &cached.headers,
                cache_ttl,
            ));
        }

        let fetched = services.fetch.fetch(&target_url, &client_headers).await?;

        // raw result goes to cache off the response path
        {
            let cache = services.cache.clone();
            let url = target_url.clone();
            let entry = CachedFetch {
                body: fetched.body.clone(),
                headers: fetched.headers.clone(),
            };
            tokio::spawn(async move {
                cache.put_raw(&url, entry).await;
            });
        }

        if looks_like_playlist(&fetched.content_type, &fetched.body) {
            debug!("content is a playlist, rewriting: {}", target_url);
            let text = String::from_utf8_lossy(&fetched.body).into_owned();
            let processed = services.playlists.process(&target_url, &text, 0).await?;
            Ok(Self::build_playlist_response(processed, cache_ttl))
        } else {
            debug!(
                "content is not a playlist (type: {}), passing through: {}",
                fetched.content_type, target_url
            );
            Ok(Self::build_passthrough_response(
                fetched.body,
                &fetched.headers,
                cache_ttl,
            ))
        }
    }

    // preflight is mostly answered by the cors layer, this covers plain OPTIONS
    async fn proxy_options() -> impl IntoResponse {
        (
            StatusCode::NO_CONTENT,
            [(header::ACCESS_CONTROL_MAX_AGE, "86400")],
        )
    }

    async fn missing_target() -> AppResult<Response> {
        Err(Error::InvalidTarget(String::new()))
    }
}
