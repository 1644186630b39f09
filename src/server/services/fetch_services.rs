use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use flate2::read::GzDecoder;
use mockall::automock;
use reqwest::header;
use tracing::{debug, error};
use url::Url;

use crate::server::error::{AppResult, Error};

use super::user_agent_services::DynUserAgentProvider;

const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

// how much of an upstream error body makes it into the diagnostic
const ERROR_SNIPPET_LIMIT: usize = 200;

/// the few inbound headers that get forwarded upstream
/// recursive sub-playlist fetches use `ClientHeaders::default()` on purpose,
/// the original client's headers stop at the first hop
#[derive(Debug, Clone, Default)]
pub struct ClientHeaders {
    pub accept: Option<String>,
    pub accept_language: Option<String>,
    pub referer: Option<String>,
}

impl ClientHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let grab = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };

        Self {
            accept: grab(header::ACCEPT),
            accept_language: grab(header::ACCEPT_LANGUAGE),
            referer: grab(header::REFERER),
        }
    }
}

/// a fully read upstream response, body already decompressed
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub body: Vec<u8>,
    pub content_type: String,
    pub headers: HashMap<String, String>,
}

pub type DynFetchService = Arc<dyn FetchServiceTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait FetchServiceTrait {
    /// GET the target with a synthesized header set, following redirects
    async fn fetch(
        &self,
        target_url: &str,
        client_headers: &ClientHeaders,
    ) -> AppResult<FetchedContent>;
}

pub struct FetchService {
    http: reqwest::Client,
    user_agents: DynUserAgentProvider,
}

impl FetchService {
    pub fn new(http: reqwest::Client, user_agents: DynUserAgentProvider) -> Self {
        Self { http, user_agents }
    }

    fn decompress(content_encoding: Option<&str>, bytes: &[u8]) -> AppResult<Vec<u8>> {
        match content_encoding {
            Some("zstd") => zstd::decode_all(bytes).map_err(|e| {
                error!("Failed to decompress zstd response: {}", e);
                Error::InternalServerErrorWithContext("Failed to decompress response".to_string())
            }),
            Some("gzip") => {
                let mut decoder = GzDecoder::new(bytes);
                let mut decompressed = Vec::new();
                decoder.read_to_end(&mut decompressed).map_err(|e| {
                    error!("Failed to decompress gzip response: {}", e);
                    Error::InternalServerErrorWithContext(
                        "Failed to decompress response".to_string(),
                    )
                })?;
                Ok(decompressed)
            }
            _ => Ok(bytes.to_vec()),
        }
    }
}

#[async_trait]
impl FetchServiceTrait for FetchService {
    async fn fetch(
        &self,
        target_url: &str,
        client_headers: &ClientHeaders,
    ) -> AppResult<FetchedContent> {
        let mut request = self
            .http
            .get(target_url)
            .header(
                header::ACCEPT,
                client_headers.accept.as_deref().unwrap_or("*/*"),
            )
            .header(
                header::ACCEPT_LANGUAGE,
                client_headers
                    .accept_language
                    .as_deref()
                    .unwrap_or(DEFAULT_ACCEPT_LANGUAGE),
            )
            // we decompress ourselves, see below
            .header(header::ACCEPT_ENCODING, "gzip, zstd");

        let user_agent = self.user_agents.pick();
        if !user_agent.is_empty() {
            request = request.header(header::USER_AGENT, user_agent);
        }

        // referer defaults to the target's own origin, plenty of cdns want one
        let referer = client_headers.referer.clone().or_else(|| {
            Url::parse(target_url)
                .ok()
                .map(|u| u.origin().ascii_serialization())
        });
        if let Some(referer) = referer.filter(|r| !r.is_empty()) {
            request = request.header(header::REFERER, referer);
        }

        debug!("requesting upstream: {}", target_url);

        let response = request.send().await.map_err(|e| {
            error!("upstream request failed for {}: {}", target_url, e);
            Error::UpstreamTransport {
                url: target_url.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            // keep a short body preview around, upstream error pages are often
            // multi-kilobyte html that would clog the logs
            let snippet: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(ERROR_SNIPPET_LIMIT)
                .collect();

            error!("upstream returned {} for {}", status, target_url);
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                url: target_url.to_string(),
                snippet,
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let content_encoding = response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // the body gets decoded here, so the encoding and length headers no
        // longer describe what we hand back downstream
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .filter(|(name, _)| {
                name != "content-encoding" && name != "content-length" && name != "transfer-encoding"
            })
            .collect();

        let bytes = response.bytes().await.map_err(|e| {
            error!("failed to read upstream body for {}: {}", target_url, e);
            Error::UpstreamTransport {
                url: target_url.to_string(),
                message: e.to_string(),
            }
        })?;

        let body = Self::decompress(content_encoding.as_deref(), &bytes)?;

        debug!(
            "upstream ok: {} ({} bytes, type: {})",
            target_url,
            body.len(),
            content_type
        );

        Ok(FetchedContent {
            body,
            content_type,
            headers,
        })
    }
}
