pub mod fetch_services;
pub mod playlist_services;
pub mod proxy_cache_services;
pub mod proxy_services;
pub mod user_agent_services;

pub use fetch_services::DynFetchService;
pub use proxy_cache_services::DynProxyCacheService;
pub use user_agent_services::DynUserAgentProvider;
