use crate::Result;
use crate::credentials::CredentialStore;
use crate::error::Error;
use crate::session::SessionRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

/// Discharge token kind produced by the login form
pub const FORM_TOKEN_KIND: &str = "form";

/// Fields a login form submission must carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub form: LoginForm,
}

/// Proof of a completed interaction, presented with a discharge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DischargeToken {
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: DischargeToken,
}

/// Description of the fields `GET /form` advertises
pub fn form_schema() -> Value {
    json!({
        "schema": {
            "username": {
                "type": "string",
                "title": "User name",
                "mandatory": true
            },
            "password": {
                "type": "string",
                "title": "Password",
                "mandatory": true,
                "secret": true
            }
        }
    })
}

/// Parses a login submission body
pub fn parse_login(body: &[u8]) -> Result<LoginForm> {
    let request: LoginRequest =
        serde_json::from_slice(body).map_err(|e| Error::MalformedForm(e.to_string()))?;
    Ok(request.form)
}

/// Turns checked credentials into a form discharge token
#[derive(Debug, Clone)]
pub struct LoginHandler {
    store: Arc<CredentialStore>,
    sessions: Arc<SessionRegistry>,
}

impl LoginHandler {
    pub fn new(store: Arc<CredentialStore>, sessions: Arc<SessionRegistry>) -> Self {
        Self { store, sessions }
    }

    pub fn login(&self, form: &LoginForm) -> Result<LoginResponse> {
        if !self.store.check(&form.username, &form.password) {
            debug!(user = %form.username, "login rejected");
            return Err(Error::InvalidCredentials);
        }

        let value = self.sessions.create_session(&form.username)?;
        info!(user = %form.username, "user logged in");
        Ok(LoginResponse {
            token: DischargeToken {
                kind: FORM_TOKEN_KIND.to_string(),
                value,
            },
        })
    }
}
