use std::sync::Arc;

use rand::seq::IndexedRandom;

use crate::config::AppConfig;

pub type DynUserAgentProvider = Arc<dyn UserAgentProviderTrait + Send + Sync>;

/// injected capability so tests can pin the UA instead of rolling dice
pub trait UserAgentProviderTrait {
    fn pick(&self) -> String;
}

/// uniform random pick over the configured pool, nothing cryptographic about it
pub struct RandomUserAgentProvider {
    agents: Vec<String>,
}

impl RandomUserAgentProvider {
    pub fn new(agents: Vec<String>) -> Self {
        debug_assert!(!agents.is_empty(), "user agent pool must not be empty");
        Self { agents }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.user_agents())
    }
}

impl UserAgentProviderTrait for RandomUserAgentProvider {
    fn pick(&self) -> String {
        self.agents
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_default()
    }
}

/// fixed provider for tests and for anyone who wants a stable upstream identity
pub struct FixedUserAgentProvider(pub String);

impl UserAgentProviderTrait for FixedUserAgentProvider {
    fn pick(&self) -> String {
        self.0.clone()
    }
}
