//! Service configuration, populated from environment variables.

use std::time::Duration;

use starksession::session::DEFAULT_METADATA;

/// Runtime configuration for the dapp-side session services.
///
/// Every field has a default, so services start with zero configuration
/// against a local devnet.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `STARKSESSION_RPC_URL` | `http://127.0.0.1:5050/rpc` | Starknet JSON-RPC endpoint |
/// | `STARKSESSION_RPC_TIMEOUT_SECS` | `30` | Per-request HTTP timeout |
/// | `STARKSESSION_SESSION_TTL_SECS` | `3600` | Lifetime of newly requested sessions |
/// | `STARKSESSION_LEGACY_TOKENS` | `false` | Emit the legacy token layout |
/// | `STARKSESSION_METADATA` | `{"metadata":"metadata","max_fee":0}` | Metadata attached to new sessions |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DappConfig {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: String,

    /// HTTP timeout applied to every RPC request.
    pub rpc_timeout_secs: u64,

    /// Seconds between "now" and the expiry of a requested session.
    pub session_ttl_secs: u64,

    /// Whether target accounts read the legacy `cache_authorization: bool`
    /// token layout.
    pub legacy_tokens: bool,

    /// Opaque metadata string hashed into every new session.
    pub metadata: String,
}

impl Default for DappConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:5050/rpc".into(),
            rpc_timeout_secs: 30,
            session_ttl_secs: 3600,
            legacy_tokens: false,
            metadata: DEFAULT_METADATA.into(),
        }
    }
}

impl DappConfig {
    /// Populate config from environment variables, applying defaults where
    /// absent or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        Self {
            rpc_url: lookup("STARKSESSION_RPC_URL").unwrap_or(defaults.rpc_url),
            rpc_timeout_secs: number("STARKSESSION_RPC_TIMEOUT_SECS", defaults.rpc_timeout_secs),
            session_ttl_secs: number("STARKSESSION_SESSION_TTL_SECS", defaults.session_ttl_secs),
            legacy_tokens: lookup("STARKSESSION_LEGACY_TOKENS")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.legacy_tokens),
            metadata: lookup("STARKSESSION_METADATA").unwrap_or(defaults.metadata),
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}
