//! The resource (target) service: every path is protected by the discharge
//! orchestrator and echoes the requested URL once authorized.

use crate::Result;
use crate::authorizer::ThirdPartyAuthorizer;
use crate::client::fetch_public_key;
use crate::config::TargetConfig;
use crate::engine::{MacaroonEngine, StaticLocator};
use crate::http::MACAROONS_HEADER;
use crate::keys::PublicKey;
use crate::macaroon::Macaroon;
use crate::orchestrator::DischargeOrchestrator;
use crate::serialization::decode_bundle;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct TargetService {
    config: TargetConfig,
    identity_key: PublicKey,
}

impl TargetService {
    pub fn new(config: TargetConfig, identity_key: PublicKey) -> Self {
        Self {
            config,
            identity_key,
        }
    }

    /// Uses the configured identity key, or asks the identity service for it
    pub async fn from_config(config: TargetConfig) -> Result<Self> {
        let identity_key = match &config.identity_public_key {
            Some(hex) => PublicKey::from_hex(hex)?,
            None => fetch_public_key(&reqwest::Client::new(), &config.identity_url).await?,
        };
        Ok(Self::new(config, identity_key))
    }

    /// Builds the router; `location` is the service's own base URL
    pub fn router(&self, location: &str) -> Result<Router> {
        let locator = StaticLocator::new().with(&self.config.identity_url, self.identity_key);
        let engine = MacaroonEngine::new(location, locator)?;
        let authorizer = ThirdPartyAuthorizer::new(
            &self.config.identity_url,
            self.config.required_groups.clone(),
        );
        let orchestrator = DischargeOrchestrator::new(
            Arc::new(engine),
            Arc::new(authorizer),
            self.config.token_validity,
        );

        Ok(Router::new()
            .fallback(protected)
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(orchestrator)))
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let location = format!("http://{}", listener.local_addr()?);
        info!(
            %location,
            identity = %self.config.identity_url,
            groups = ?self.config.required_groups,
            "target service running"
        );
        axum::serve(listener, self.router(&location)?).await?;
        Ok(())
    }
}

/// Decodes every `Macaroons` header; undecodable values are skipped
pub fn bundles_from_headers(headers: &HeaderMap) -> Vec<Vec<Macaroon>> {
    headers
        .get_all(MACAROONS_HEADER)
        .iter()
        .filter_map(|value| {
            let decoded = value
                .to_str()
                .map_err(|e| e.to_string())
                .and_then(|v| decode_bundle(v).map_err(|e| e.to_string()));
            match decoded {
                Ok(bundle) => Some(bundle),
                Err(error) => {
                    warn!(%error, "ignoring undecodable macaroon header");
                    None
                }
            }
        })
        .collect()
}

async fn protected(
    State(orchestrator): State<Arc<DischargeOrchestrator>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<String> {
    let bundles = bundles_from_headers(&headers);
    orchestrator.authorize(method.as_str(), uri.path(), &bundles)?;
    Ok(format!("you requested URL \"{}\"", uri.path()))
}
