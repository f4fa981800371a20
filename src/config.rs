use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Where the interactive login form is served, relative to the identity service
pub const FORM_URL: &str = "/form";

/// How the identity service treats third-party conditions it does not know
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UnknownConditionPolicy {
    /// Discharge without adding restrictions
    #[default]
    Allow,
    /// Refuse the discharge
    Deny,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub listen_addr: SocketAddr,
    pub credentials_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    /// Validity of the restrictions added to an `is-authenticated-user` discharge
    pub auth_validity: Duration,
    /// `None` keeps sessions for the lifetime of the service
    pub session_ttl: Option<std::time::Duration>,
    pub unknown_conditions: UnknownConditionPolicy,
    pub form_url: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            credentials_path: None,
            key_path: None,
            auth_validity: Duration::hours(24),
            session_ttl: None,
            unknown_conditions: UnknownConditionPolicy::default(),
            form_url: FORM_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub listen_addr: SocketAddr,
    /// Base URL of the identity service; also the third-party caveat location
    pub identity_url: String,
    /// Identity service public key (hex); fetched from the service when unset
    pub identity_public_key: Option<String>,
    pub required_groups: Vec<String>,
    /// Validity of macaroons minted for a discharge-required response
    pub token_validity: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8082)),
            identity_url: "http://127.0.0.1:8081".to_string(),
            identity_public_key: None,
            required_groups: Vec::new(),
            token_validity: Duration::minutes(5),
        }
    }
}
