//! Proxy configuration
//!
//! One record per automation endpoint a campaign owner can use. The engine
//! only ever reads these; configuration storage owns them.

use uuid::Uuid;

/// Default automation endpoint port
pub const DEFAULT_PORT: u16 = 9222;

/// Credentials and endpoint for one remote automation provider.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Owning user/campaign identity
    pub owner_id: Uuid,
    /// Disabled configs are never returned as usable
    #[serde(default)]
    pub enabled: bool,
    /// Provider customer ID
    pub customer_id: String,
    /// Provider zone name
    pub zone: String,
    /// Zone password
    pub password: String,
    /// Automation endpoint host
    pub host: String,
    /// Automation endpoint port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Resolution tries configs in ascending priority order
    #[serde(default)]
    pub priority: u32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ProxyConfig {
    /// Whether this config is enabled and carries everything a session
    /// needs. Malformed records are treated the same as disabled ones.
    pub fn is_usable(&self) -> bool {
        self.enabled
            && !self.customer_id.is_empty()
            && !self.zone.is_empty()
            && !self.password.is_empty()
            && !self.host.is_empty()
            && self.port != 0
    }

    /// Base username for the provider: `brd-customer-{id}-zone-{zone}`
    pub fn username(&self) -> String {
        format!("brd-customer-{}-zone-{}", self.customer_id, self.zone)
    }

    /// HTTP base URL of the automation endpoint
    pub fn endpoint_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
