use std::net::SocketAddr;
use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:8080")]
    pub address: SocketAddr,

    pub posthog_api_key: String,

    pub posthog_project_id: String,

    #[envconfig(default = "https://app.posthog.com")]
    pub posthog_host: String,

    #[envconfig(default = "30")]
    pub posthog_timeout_secs: u64,

    #[envconfig(default = "0")]
    pub default_rollout_percentage: u32,

    #[envconfig(default = "true")]
    pub archive_instead_of_delete: bool,

    #[envconfig(default = "false")]
    pub export_prometheus: bool,

    #[envconfig(nested = true)]
    pub type_coercion: TypeCoercionConfig,
}

impl Config {
    pub fn posthog_timeout(&self) -> Duration {
        Duration::from_secs(self.posthog_timeout_secs)
    }

    pub fn default_test_config() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], 0)),
            posthog_api_key: "phx_test".to_string(),
            posthog_project_id: "1".to_string(),
            posthog_host: "http://localhost:8000".to_string(),
            posthog_timeout_secs: 5,
            default_rollout_percentage: 0,
            archive_instead_of_delete: true,
            export_prometheus: false,
            type_coercion: TypeCoercionConfig::default(),
        }
    }
}

/// Opt-in coercion of payload strings. Read once at startup and never mutated,
/// so it is safe to copy into every request.
#[derive(Envconfig, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeCoercionConfig {
    /// Turn numeric payload strings ("1", "2.5") into numbers.
    #[envconfig(default = "false")]
    pub coerce_numeric_strings: bool,

    /// Turn "true"/"yes"/"on" style payload strings into booleans.
    #[envconfig(default = "false")]
    pub coerce_boolean_strings: bool,
}

impl TypeCoercionConfig {
    pub fn all() -> Self {
        Self {
            coerce_numeric_strings: true,
            coerce_boolean_strings: true,
        }
    }
}
