pub mod authorizer;
pub mod caveat;
pub mod checker;
pub mod client;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod discharge;
pub mod engine;
pub mod error;
pub mod http;
pub mod identity_service;
pub mod keys;
pub mod login;
pub mod macaroon;
pub mod op;
pub mod orchestrator;
pub mod resolver;
pub mod serialization;
pub mod session;
pub mod target_service;

pub use authorizer::{Authorizer, Identity, ThirdPartyAuthorizer};
pub use caveat::{Caveat, ConditionKind};
pub use client::{Client, FormInteractor};
pub use config::{IdentityConfig, TargetConfig, UnknownConditionPolicy};
pub use credentials::CredentialStore;
pub use engine::{AuthInfo, CredentialEngine, Decision, MacaroonEngine, StaticLocator};
pub use error::{Error, TokenError};
pub use identity_service::IdentityService;
pub use keys::KeyPair;
pub use macaroon::Macaroon;
pub use op::Op;
pub use session::SessionRegistry;
pub use target_service::TargetService;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, Error>;
