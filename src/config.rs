use serde_json::Value;
use tracing::warn;

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

/// built-in User-Agent pool, used whenever USER_AGENTS_JSON is absent or unusable
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:145.0) Gecko/20100101 Firefox/145.0",
];

#[derive(clap::Parser)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // redis url for the cache backend
    // leave unset to run with caching fully disabled, the proxy works fine without it
    #[clap(long, env)]
    pub redis_url: Option<String>,

    // ttl in seconds for cached upstream responses and resolved sub-playlists,
    // also echoed to clients via Cache-Control
    #[clap(long, env, default_value = "86400")]
    pub cache_ttl: u64,

    // how deep nested master playlists may go before we give up
    #[clap(long, env, default_value = "5")]
    pub max_recursion: u32,

    // JSON array of User-Agent strings to rotate through for upstream requests
    #[clap(long, env)]
    pub user_agents_json: Option<String>,

    // verbose logging
    #[clap(long, env, default_value_t = false)]
    pub debug: bool,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    /// parse USER_AGENTS_JSON into the upstream UA pool
    /// anything malformed or empty falls back to the built-in list
    pub fn user_agents(&self) -> Vec<String> {
        let Some(raw) = self.user_agents_json.as_deref() else {
            return Self::default_user_agents();
        };

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => {
                let agents: Vec<String> = items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) if !s.is_empty() => Some(s),
                        _ => None,
                    })
                    .collect();

                if agents.is_empty() {
                    warn!("USER_AGENTS_JSON is empty or has no usable entries, using defaults");
                    Self::default_user_agents()
                } else {
                    agents
                }
            }
            _ => {
                warn!("USER_AGENTS_JSON is not a JSON string array, using defaults");
                Self::default_user_agents()
            }
        }
    }

    fn default_user_agents() -> Vec<String> {
        DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
    }
}

impl Default for AppConfig {
    // defaults aren't really needed here but it's here as a bad fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            redis_url: None,
            cache_ttl: 86400,
            max_recursion: 5,
            user_agents_json: None,
            debug: false,
            sentry_dsn: None,
        }
    }
}
