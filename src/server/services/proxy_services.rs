use std::sync::Arc;

use tracing::info;

use crate::{config::AppConfig, database::RedisDatabase};

use super::{
    fetch_services::FetchService,
    playlist_services::PlaylistService,
    proxy_cache_services::{NoopProxyCacheService, RedisProxyCacheService},
    user_agent_services::RandomUserAgentProvider,
};

use super::{
    fetch_services::DynFetchService, proxy_cache_services::DynProxyCacheService,
    user_agent_services::DynUserAgentProvider,
};

/// everything a request handler needs, wired once at startup
/// redis is optional - without it the cache service is a no-op and the proxy
/// just fetches upstream every time
#[derive(Clone)]
pub struct ProxyServices {
    pub fetch: DynFetchService,
    pub cache: DynProxyCacheService,
    pub playlists: Arc<PlaylistService>,
    pub user_agents: DynUserAgentProvider,
    pub http: reqwest::Client,
    pub redis: Option<Arc<RedisDatabase>>,
    pub config: Arc<AppConfig>,
}

impl ProxyServices {
    pub fn new(redis_db: Option<RedisDatabase>, config: Arc<AppConfig>) -> Self {
        info!("starting proxy services...");

        let http = reqwest::Client::new();
        let redis = redis_db.map(Arc::new);

        let user_agents =
            Arc::new(RandomUserAgentProvider::from_config(&config)) as DynUserAgentProvider;

        let cache: DynProxyCacheService = match redis.clone() {
            Some(redis) => {
                info!("cache backend: redis (TTL {}s)", config.cache_ttl);
                Arc::new(RedisProxyCacheService::new(redis, config.cache_ttl))
                    as DynProxyCacheService
            }
            None => {
                info!("cache backend: disabled");
                Arc::new(NoopProxyCacheService) as DynProxyCacheService
            }
        };

        let fetch =
            Arc::new(FetchService::new(http.clone(), user_agents.clone())) as DynFetchService;

        let playlists = Arc::new(PlaylistService::new(
            fetch.clone(),
            cache.clone(),
            config.clone(),
        ));

        Self {
            fetch,
            cache,
            playlists,
            user_agents,
            http,
            redis,
            config,
        }
    }

    /// fully injected variant for tests - any piece can be a mock
    pub fn with_parts(
        fetch: DynFetchService,
        cache: DynProxyCacheService,
        user_agents: DynUserAgentProvider,
        config: Arc<AppConfig>,
    ) -> Self {
        let playlists = Arc::new(PlaylistService::new(
            fetch.clone(),
            cache.clone(),
            config.clone(),
        ));

        Self {
            fetch,
            cache,
            playlists,
            user_agents,
            http: reqwest::Client::new(),
            redis: None,
            config,
        }
    }
}
