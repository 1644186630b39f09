#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use proxy::server::services::fetch_services::FetchedContent;
use proxy::server::services::proxy_cache_services::{CachedFetch, ProxyCacheServiceTrait};

/// in-memory stand-in for the redis cache so tests control expiry directly
/// a zero ttl makes every entry expire immediately
pub struct MemoryCache {
    ttl: Duration,
    raw: Mutex<HashMap<String, (Instant, CachedFetch)>>,
    playlists: Mutex<HashMap<String, (Instant, String)>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            raw: Mutex::new(HashMap::new()),
            playlists: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl ProxyCacheServiceTrait for MemoryCache {
    async fn get_raw(&self, target_url: &str) -> Option<CachedFetch> {
        let map = self.raw.lock().unwrap();
        map.get(target_url)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, entry)| entry.clone())
    }

    async fn put_raw(&self, target_url: &str, entry: CachedFetch) {
        let mut map = self.raw.lock().unwrap();
        map.insert(target_url.to_string(), (Instant::now(), entry));
    }

    async fn get_playlist(&self, variant_url: &str) -> Option<String> {
        let map = self.playlists.lock().unwrap();
        map.get(variant_url)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, body)| body.clone())
    }

    async fn put_playlist(&self, variant_url: &str, body: String) {
        let mut map = self.playlists.lock().unwrap();
        map.insert(variant_url.to_string(), (Instant::now(), body));
    }
}

pub fn playlist_content(body: &str) -> FetchedContent {
    FetchedContent {
        body: body.as_bytes().to_vec(),
        content_type: "application/vnd.apple.mpegurl".to_string(),
        headers: HashMap::from([(
            "content-type".to_string(),
            "application/vnd.apple.mpegurl".to_string(),
        )]),
    }
}

pub fn opaque_content(body: &[u8], content_type: &str) -> FetchedContent {
    FetchedContent {
        body: body.to_vec(),
        content_type: content_type.to_string(),
        headers: HashMap::from([("content-type".to_string(), content_type.to_string())]),
    }
}

/// yields long enough for fire-and-forget cache writes to land
/// (tests run on the current-thread runtime, so a short sleep is plenty)
pub async fn settle_cache_writes() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub type SharedCache = Arc<dyn ProxyCacheServiceTrait + Send + Sync>;
