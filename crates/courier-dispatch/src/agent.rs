//! Agent cache for the standalone transport.
//!
//! An [`Agent`] is a reusable HTTP client (direct keep-alive or proxy-routed)
//! that amortizes connection and TLS setup across standalone calls. Agents are
//! cached per `(proxy, auth class)` so authenticated and unauthenticated
//! traffic never share a keep-alive session, and are cycled once they are
//! older than the TTL. Replaced agents are simply dropped from the cache;
//! requests already holding one keep using it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::constants::AGENT_TTL;
use crate::error::{DispatchError, Result};

/// Which side of the authentication divide a request is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthClass {
    /// Carries the caller's identity.
    Auth,
    /// Carries no identity.
    Unauth,
}

impl AuthClass {
    /// Label used in cache keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            AuthClass::Auth => "auth",
            AuthClass::Unauth => "unauth",
        }
    }
}

/// Cache key: proxy URL (or none) plus auth class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentKey {
    /// Proxy the agent routes through, `None` for direct.
    pub proxy_url: Option<String>,
    /// Auth class the agent serves.
    pub class: AuthClass,
}

impl std::fmt::Display for AgentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.proxy_url {
            Some(proxy) => write!(f, "{}-{}", proxy, self.class.as_str()),
            None => write!(f, "direct-{}", self.class.as_str()),
        }
    }
}

/// Configuration for agents built by the cache.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum age before an agent is cycled.
    pub ttl: Duration,
    /// Disable idle connection reuse on direct agents.
    pub disable_session_resumption: bool,
    /// How long an idle pooled connection is kept.
    pub idle_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ttl: AGENT_TTL,
            disable_session_resumption: false,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// A cached connection/proxy handle.
#[derive(Debug)]
pub struct Agent {
    id: u64,
    key: AgentKey,
    client: reqwest::Client,
    created_at: Instant,
}

impl Agent {
    /// Unique id of this agent within its cache.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Key this agent was created for.
    pub fn key(&self) -> &AgentKey {
        &self.key
    }

    /// HTTP client carrying the keep-alive pool.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Age of this agent.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Statistics about the agent cache.
#[derive(Debug, Clone, Default)]
pub struct AgentCacheStats {
    /// Agents currently cached.
    pub cached: usize,
    /// Agents created since start.
    pub created: u64,
    /// Agents replaced because they outlived the TTL.
    pub cycled: u64,
}

/// Lazily populated, TTL-rotated map of agents.
pub struct AgentCache {
    config: AgentConfig,
    entries: Mutex<HashMap<AgentKey, Arc<Agent>>>,
    next_id: AtomicU64,
    cycled: AtomicU64,
}

impl AgentCache {
    /// Creates an empty cache.
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            cycled: AtomicU64::new(0),
        }
    }

    /// Returns the agent for `(proxy_url, class)`, creating or cycling it as needed.
    pub fn get(&self, proxy_url: Option<&str>, class: AuthClass) -> Result<Arc<Agent>> {
        let key = AgentKey {
            proxy_url: proxy_url.map(str::to_string),
            class,
        };

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DispatchError::Config("agent cache lock poisoned".to_string()))?;

        if let Some(agent) = entries.get(&key) {
            if agent.age() <= self.config.ttl {
                return Ok(Arc::clone(agent));
            }
            info!("Cycling agent for type {}", key);
            self.cycled.fetch_add(1, Ordering::Relaxed);
        }

        let agent = Arc::new(self.build(key.clone())?);
        debug!("Created agent {} for {}", agent.id, key);
        entries.insert(key, Arc::clone(&agent));
        Ok(agent)
    }

    /// Cache statistics.
    pub fn stats(&self) -> AgentCacheStats {
        let cached = self.entries.lock().map(|e| e.len()).unwrap_or(0);
        AgentCacheStats {
            cached,
            created: self.next_id.load(Ordering::Relaxed) - 1,
            cycled: self.cycled.load(Ordering::Relaxed),
        }
    }

    fn build(&self, key: AgentKey) -> Result<Agent> {
        let mut builder = reqwest::Client::builder().tcp_keepalive(Duration::from_secs(60));

        builder = match &key.proxy_url {
            Some(proxy) => {
                let proxy = reqwest::Proxy::all(proxy.as_str())
                    .map_err(|e| DispatchError::Config(format!("invalid proxy url: {e}")))?;
                builder.proxy(proxy)
            }
            None if self.config.disable_session_resumption => {
                builder.no_proxy().pool_max_idle_per_host(0)
            }
            None => builder
                .no_proxy()
                .pool_idle_timeout(self.config.idle_timeout),
        };

        let client = builder
            .build()
            .map_err(|e| DispatchError::Config(format!("failed to build agent: {e}")))?;

        Ok(Agent {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            key,
            client,
            created_at: Instant::now(),
        })
    }
}

impl Default for AgentCache {
    fn default() -> Self {
        Self::new(AgentConfig::default())
    }
}

impl std::fmt::Debug for AgentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
