use std::collections::HashMap;
use std::sync::Arc;

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::database::RedisDatabase;

pub type DynProxyCacheService = Arc<dyn ProxyCacheServiceTrait + Send + Sync>;

/// raw upstream fetch as stored in the cache
/// body stays bytes so a hit can be re-classified and, when it turns out to be
/// a playlist, re-rewritten - rewriting is never cached at this layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFetch {
    #[serde(with = "body_encoding")]
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

// bodies are arbitrary bytes but the cache value is json, so base64 it is
mod body_encoding {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// two cache namespaces: raw fetches and fully resolved sub-playlists
/// every failure degrades to a miss or a dropped write, never to a client error
#[async_trait::async_trait]
pub trait ProxyCacheServiceTrait {
    async fn get_raw(&self, target_url: &str) -> Option<CachedFetch>;

    async fn put_raw(&self, target_url: &str, entry: CachedFetch);

    async fn get_playlist(&self, variant_url: &str) -> Option<String>;

    async fn put_playlist(&self, variant_url: &str, body: String);
}

pub struct RedisProxyCacheService {
    redis: Arc<RedisDatabase>,
    ttl_seconds: u64,
}

impl RedisProxyCacheService {
    pub fn new(redis: Arc<RedisDatabase>, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }

    fn raw_key(target_url: &str) -> String {
        format!("proxy_raw:{}", target_url)
    }

    fn playlist_key(variant_url: &str) -> String {
        format!("m3u8_processed:{}", variant_url)
    }
}

#[async_trait::async_trait]
impl ProxyCacheServiceTrait for RedisProxyCacheService {
    async fn get_raw(&self, target_url: &str) -> Option<CachedFetch> {
        let key = Self::raw_key(target_url);
        let mut conn = self.redis.connection.clone();

        let result: Result<Option<String>, redis::RedisError> = conn.get(&key).await;

        match result {
            Ok(Some(json)) => match serde_json::from_str::<CachedFetch>(&json) {
                Ok(entry) => {
                    debug!("cache HIT (raw) for {}", target_url);
                    Some(entry)
                }
                Err(e) => {
                    error!("failed to parse cached entry for {}: {}", target_url, e);
                    None
                }
            },
            Ok(None) => {
                debug!("cache MISS (raw) for {}", target_url);
                None
            }
            Err(e) => {
                error!("cache GET failed for {}: {}", target_url, e);
                None
            }
        }
    }

    async fn put_raw(&self, target_url: &str, entry: CachedFetch) {
        let key = Self::raw_key(target_url);
        let mut conn = self.redis.connection.clone();

        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize cache entry for {}: {}", target_url, e);
                return;
            }
        };

        let result: Result<(), redis::RedisError> =
            conn.set_ex(&key, json, self.ttl_seconds).await;

        match result {
            Ok(_) => debug!(
                "cached raw fetch for {} ({} bytes, TTL {}s)",
                target_url,
                entry.body.len(),
                self.ttl_seconds
            ),
            Err(e) => error!("failed to cache raw fetch for {}: {}", target_url, e),
        }
    }

    async fn get_playlist(&self, variant_url: &str) -> Option<String> {
        let key = Self::playlist_key(variant_url);
        let mut conn = self.redis.connection.clone();

        let result: Result<Option<String>, redis::RedisError> = conn.get(&key).await;

        match result {
            Ok(Some(body)) => {
                debug!("cache HIT (sub-playlist) for {}", variant_url);
                Some(body)
            }
            Ok(None) => {
                debug!("cache MISS (sub-playlist) for {}", variant_url);
                None
            }
            Err(e) => {
                error!("cache GET failed for {}: {}", variant_url, e);
                None
            }
        }
    }

    async fn put_playlist(&self, variant_url: &str, body: String) {
        let key = Self::playlist_key(variant_url);
        let mut conn = self.redis.connection.clone();

        let result: Result<(), redis::RedisError> =
            conn.set_ex(&key, &body, self.ttl_seconds).await;

        match result {
            Ok(_) => debug!(
                "cached resolved sub-playlist for {} ({} bytes, TTL {}s)",
                variant_url,
                body.len(),
                self.ttl_seconds
            ),
            Err(e) => error!("failed to cache sub-playlist for {}: {}", variant_url, e),
        }
    }
}

/// stand-in for deployments without a redis binding
/// everything misses, every write is dropped, the proxy behaves identically
pub struct NoopProxyCacheService;

#[async_trait::async_trait]
impl ProxyCacheServiceTrait for NoopProxyCacheService {
    async fn get_raw(&self, _target_url: &str) -> Option<CachedFetch> {
        None
    }

    async fn put_raw(&self, _target_url: &str, _entry: CachedFetch) {}

    async fn get_playlist(&self, _variant_url: &str) -> Option<String> {
        None
    }

    async fn put_playlist(&self, _variant_url: &str, _body: String) {}
}
