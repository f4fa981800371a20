//! The identity (discharge) service: login form, discharge endpoint and
//! public key.

use crate::Result;
use crate::config::IdentityConfig;
use crate::credentials::CredentialStore;
use crate::discharge::Discharger;
use crate::error::Error;
use crate::http::{DischargeRequest, DischargeResponse, PublicKeyResponse};
use crate::keys::KeyPair;
use crate::login::{LoginHandler, LoginResponse, form_schema, parse_login};
use crate::resolver::ThirdPartyResolver;
use crate::serialization::decode_base64;
use crate::session::SessionRegistry;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
struct AppState {
    login: Arc<LoginHandler>,
    discharger: Arc<Discharger>,
}

/// Identity service state shared by every request handler
pub struct IdentityService {
    config: IdentityConfig,
    key_pair: Arc<KeyPair>,
    store: Arc<CredentialStore>,
    sessions: Arc<SessionRegistry>,
}

impl IdentityService {
    pub fn new(config: IdentityConfig, key_pair: KeyPair, store: Arc<CredentialStore>) -> Self {
        let sessions = Arc::new(SessionRegistry::with_ttl(config.session_ttl));
        Self {
            config,
            key_pair: Arc::new(key_pair),
            store,
            sessions,
        }
    }

    /// Loads keys and credentials named by `config`
    pub fn from_config(config: IdentityConfig) -> Result<Self> {
        let key_pair = KeyPair::load_or_generate(config.key_path.as_deref())?;
        let store = Arc::new(CredentialStore::new());
        if let Some(path) = &config.credentials_path {
            store.load_csv(path)?;
        }
        Ok(Self::new(config, key_pair, store))
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Builds the router; `location` is the service's own base URL
    pub fn router(&self, location: &str) -> Router {
        let resolver = ThirdPartyResolver::new(
            Arc::clone(&self.store),
            Arc::clone(&self.sessions),
            &self.config.form_url,
            self.config.auth_validity,
        )
        .with_unknown_conditions(self.config.unknown_conditions);

        let state = AppState {
            login: Arc::new(LoginHandler::new(
                Arc::clone(&self.store),
                Arc::clone(&self.sessions),
            )),
            discharger: Arc::new(Discharger::new(
                Arc::clone(&self.key_pair),
                location,
                resolver,
            )),
        };

        Router::new()
            .route(
                &self.config.form_url,
                get(get_form).post(post_form).fallback(form_method_not_allowed),
            )
            .route("/discharge", post(post_discharge))
            .route("/publickey", get(get_public_key))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serves on an already bound listener until the process stops
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let location = format!("http://{}", listener.local_addr()?);
        info!(%location, public_key = %self.key_pair.public.to_hex(), "identity service running");
        axum::serve(listener, self.router(&location)).await?;
        Ok(())
    }
}

async fn get_form() -> Json<Value> {
    Json(form_schema())
}

async fn post_form(State(state): State<AppState>, body: Bytes) -> Result<Json<LoginResponse>> {
    let form = parse_login(&body)?;
    Ok(Json(state.login.login(&form)?))
}

async fn form_method_not_allowed(method: Method) -> Error {
    Error::MethodNotAllowed(method.to_string())
}

async fn post_discharge(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DischargeResponse>> {
    let request: DischargeRequest =
        serde_json::from_slice(&body).map_err(|e| Error::BadRequest(e.to_string()))?;
    let caveat_id =
        decode_base64(&request.id).map_err(|e| Error::BadRequest(format!("invalid caveat id: {e}")))?;

    let discharge = state.discharger.discharge(&caveat_id, request.token.as_ref())?;
    Ok(Json(DischargeResponse {
        macaroon: discharge.to_base64()?,
    }))
}

async fn get_public_key(State(state): State<AppState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: state.discharger.key_pair().public.to_hex(),
    })
}
