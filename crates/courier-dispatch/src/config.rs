//! Dispatcher configuration, loadable from TOML or JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::constants::DEFAULT_TIMEOUT;
use crate::error::{DispatchError, Result};

/// Settings fixed for the lifetime of a dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Base URL of the home service; 401s from this host raise "might be unlinked".
    pub service_url: String,
    /// Base URL of the storage service; default host for storage operations.
    pub storage_url: String,
    /// CDN base URLs keyed by CDN number; `"0"` is required.
    pub cdn_urls: BTreeMap<String, String>,
    /// Proxy for all REST traffic.
    pub proxy_url: Option<String>,
    /// Proxy for third-party content fetches; they never go out directly.
    pub content_proxy_url: Option<String>,
    /// Client version reported in the user agent.
    pub version: String,
    /// Product name reported in the user agent.
    pub client_name: String,
    /// Value of the client identifier header.
    pub client_agent: String,
    /// Route multiplexable operations over the persistent transport when connected.
    pub use_multiplexed: bool,
    /// Timeout for requests that do not set one, in milliseconds.
    pub default_timeout_ms: u64,
    /// Disable keep-alive session reuse on direct agents.
    pub disable_session_resumption: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let mut cdn_urls = BTreeMap::new();
        cdn_urls.insert("0".to_string(), "https://cdn.example.org".to_string());
        Self {
            service_url: String::from("https://chat.example.org"),
            storage_url: String::from("https://storage.example.org"),
            cdn_urls,
            proxy_url: None,
            content_proxy_url: None,
            version: String::from(env!("CARGO_PKG_VERSION")),
            client_name: String::from("Courier-Desktop"),
            client_agent: String::from("OWD"),
            use_multiplexed: true,
            default_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            disable_session_resumption: false,
        }
    }
}

impl DispatchConfig {
    /// Loads a configuration file, choosing the format by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: DispatchConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that every URL parses and CDN `"0"` is present.
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.service_url)
            .map_err(|e| DispatchError::Config(format!("invalid service_url: {e}")))?;
        reqwest::Url::parse(&self.storage_url)
            .map_err(|e| DispatchError::Config(format!("invalid storage_url: {e}")))?;
        if !self.cdn_urls.contains_key("0") {
            return Err(DispatchError::Config("missing CDN 0 configuration".to_string()));
        }
        for (number, url) in &self.cdn_urls {
            reqwest::Url::parse(url)
                .map_err(|e| DispatchError::Config(format!("invalid CDN {number} url: {e}")))?;
        }
        for proxy in [&self.proxy_url, &self.content_proxy_url].into_iter().flatten() {
            reqwest::Url::parse(proxy)
                .map_err(|e| DispatchError::Config(format!("invalid proxy url: {e}")))?;
        }
        if self.version.is_empty() {
            return Err(DispatchError::Config("missing version".to_string()));
        }
        Ok(())
    }

    /// Default request timeout as a [`Duration`].
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// CDN base URL for `number`, falling back to CDN `"0"`.
    pub fn cdn_url(&self, number: Option<u32>) -> &str {
        number
            .and_then(|n| self.cdn_urls.get(&n.to_string()))
            .or_else(|| self.cdn_urls.get("0"))
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// User agent string sent on every request.
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} {}",
            self.client_name,
            self.version,
            std::env::consts::OS
        )
    }

    /// Host name of the home service, if the URL has one.
    pub fn service_host(&self) -> Option<String> {
        reqwest::Url::parse(&self.service_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}
