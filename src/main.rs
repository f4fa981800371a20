//! # macaroon-identity
//!
//! Runs the identity (discharge) service, a protected target service, or a
//! self-contained demo of the discharge protocol.
//!
//! - `macaroon-identity identity --credentials users.csv` - serve logins and discharges
//! - `macaroon-identity target --identity-url http://127.0.0.1:8081 --groups group1` - serve protected URLs
//! - `macaroon-identity demo` - run both on ephemeral ports and walk through the sample scenarios

use clap::{Parser, Subcommand};
use chrono::TimeDelta;
use color_eyre::eyre::{Result, WrapErr, bail, eyre};
use macaroon_identity::{
    Client, CredentialStore, Error, FormInteractor, IdentityConfig, IdentityService, KeyPair,
    TargetConfig, TargetService, UnknownConditionPolicy,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "macaroon-identity")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "MACAROON_IDENTITY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the identity service
    Identity {
        #[arg(long, env = "MACAROON_IDENTITY_LISTEN", default_value = "127.0.0.1:8081")]
        listen: SocketAddr,

        /// CSV file of `username,password[,group1 group2...]` rows
        #[arg(long, env = "MACAROON_IDENTITY_CREDENTIALS", value_name = "FILE")]
        credentials: Option<PathBuf>,

        /// JSON key pair file; a fresh key pair is generated when absent
        #[arg(long, env = "MACAROON_IDENTITY_KEYFILE", value_name = "FILE")]
        keyfile: Option<PathBuf>,

        /// Validity of an authenticated-user discharge, in seconds
        #[arg(long, env = "MACAROON_IDENTITY_AUTH_VALIDITY", default_value_t = 86400)]
        auth_validity: i64,

        /// Session lifetime in seconds; sessions never expire when unset
        #[arg(long, env = "MACAROON_IDENTITY_SESSION_TTL")]
        session_ttl: Option<u64>,

        /// What to do with third-party conditions the service does not know
        #[arg(long, env = "MACAROON_IDENTITY_UNKNOWN_CONDITIONS", value_enum, default_value_t)]
        unknown_conditions: UnknownConditionPolicy,
    },

    /// Run a target service protected by the identity service
    Target {
        #[arg(long, env = "MACAROON_IDENTITY_TARGET_LISTEN", default_value = "127.0.0.1:8082")]
        listen: SocketAddr,

        #[arg(long, env = "MACAROON_IDENTITY_URL", default_value = "http://127.0.0.1:8081")]
        identity_url: String,

        /// Hex public key of the identity service; fetched from it when unset
        #[arg(long, env = "MACAROON_IDENTITY_PUBLIC_KEY")]
        identity_key: Option<String>,

        /// Users must belong to at least one of these groups
        #[arg(long, env = "MACAROON_IDENTITY_GROUPS", value_delimiter = ',')]
        groups: Vec<String>,

        /// Validity of minted macaroons, in seconds
        #[arg(long, env = "MACAROON_IDENTITY_TOKEN_VALIDITY", default_value_t = 300)]
        token_validity: i64,
    },

    /// Start both services on ephemeral ports and run the sample scenarios
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Identity {
            listen,
            credentials,
            keyfile,
            auth_validity,
            session_ttl,
            unknown_conditions,
        } => {
            let config = IdentityConfig {
                listen_addr: listen,
                credentials_path: credentials,
                key_path: keyfile,
                auth_validity: seconds("auth-validity", auth_validity)?,
                session_ttl: session_ttl.map(std::time::Duration::from_secs),
                unknown_conditions,
                ..IdentityConfig::default()
            };
            let service =
                IdentityService::from_config(config).wrap_err("failed to set up identity service")?;
            let listener = TcpListener::bind(listen)
                .await
                .wrap_err_with(|| format!("failed to listen on {listen}"))?;
            service.serve(listener).await?;
        }
        Commands::Target {
            listen,
            identity_url,
            identity_key,
            groups,
            token_validity,
        } => {
            let config = TargetConfig {
                listen_addr: listen,
                identity_url,
                identity_public_key: identity_key,
                required_groups: groups,
                token_validity: seconds("token-validity", token_validity)?,
            };
            let service = TargetService::from_config(config)
                .await
                .wrap_err("failed to set up target service")?;
            let listener = TcpListener::bind(listen)
                .await
                .wrap_err_with(|| format!("failed to listen on {listen}"))?;
            service.serve(listener).await?;
        }
        Commands::Demo => run_demo().await?,
    }

    Ok(())
}

/// Converts a seconds flag, rejecting values chrono cannot represent
fn seconds(flag: &str, value: i64) -> Result<TimeDelta> {
    TimeDelta::try_seconds(value).ok_or_else(|| eyre!("--{flag} {value} is out of range"))
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .wrap_err("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

const SAMPLE_CREDENTIALS: &[[&str; 3]] = &[
    ["user1", "pass1", "group1 group3"],
    ["user2", "pass2", "group2"],
    ["user3", "pass3", "group3"],
];

const SAMPLE_GROUPS: &[&str] = &["group1", "group2"];

enum Expect {
    Echo,
    Fails(fn(&Error) -> bool),
}

async fn run_demo() -> Result<()> {
    let store = Arc::new(CredentialStore::new());
    store.load_from_table(SAMPLE_CREDENTIALS.iter().map(|row| row.to_vec()))?;

    let identity = IdentityService::new(IdentityConfig::default(), KeyPair::generate()?, store);
    let identity_key = identity.key_pair().public;
    let identity_listener = TcpListener::bind("127.0.0.1:0").await?;
    let identity_url = format!("http://{}", identity_listener.local_addr()?);
    tokio::spawn(async move {
        if let Err(e) = identity.serve(identity_listener).await {
            error!(error = %e, "identity service stopped");
        }
    });

    let target = TargetService::new(
        TargetConfig {
            identity_url: identity_url.clone(),
            required_groups: SAMPLE_GROUPS.iter().map(|g| g.to_string()).collect(),
            ..TargetConfig::default()
        },
        identity_key,
    );
    let target_listener = TcpListener::bind("127.0.0.1:0").await?;
    let target_url = format!("http://{}/", target_listener.local_addr()?);
    tokio::spawn(async move {
        if let Err(e) = target.serve(target_listener).await {
            error!(error = %e, "target service stopped");
        }
    });

    let scenarios: [(&str, Option<FormInteractor>, Expect); 4] = [
        ("user in a required group", Some(FormInteractor::new("user1", "pass1")), Expect::Echo),
        (
            "wrong password",
            Some(FormInteractor::new("user1", "bad")),
            Expect::Fails(|e| matches!(e, Error::InvalidCredentials)),
        ),
        (
            "user outside the required groups",
            Some(FormInteractor::new("user3", "pass3")),
            Expect::Fails(|e| matches!(e, Error::GroupMembership)),
        ),
        (
            "no way to log in",
            None,
            Expect::Fails(|e| matches!(e, Error::InteractionRequired(_))),
        ),
    ];

    let mut failures = 0;
    for (name, interactor, expect) in scenarios {
        let client = match interactor {
            Some(interactor) => Client::new().with_interactor(interactor),
            None => Client::new(),
        };
        let outcome = client.get(&target_url).await;
        let passed = match (&outcome, &expect) {
            (Ok(body), Expect::Echo) => body == "you requested URL \"/\"",
            (Err(e), Expect::Fails(check)) => check(e),
            _ => false,
        };

        if passed {
            info!(scenario = name, ?outcome, "scenario passed");
        } else {
            error!(scenario = name, ?outcome, "scenario failed");
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} demo scenario(s) failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_in_range() {
        assert_eq!(seconds("token-validity", 300).unwrap(), TimeDelta::minutes(5));
    }

    #[test]
    fn test_seconds_out_of_range() {
        let err = seconds("auth-validity", i64::MAX).unwrap_err();
        assert!(err.to_string().contains("--auth-validity"));
        assert!(seconds("auth-validity", i64::MIN).is_err());
    }
}
