//! Client side of the discharge protocol.

use crate::Result;
use crate::error::{Error, Interaction};
use crate::http::{
    DischargeRequest, DischargeResponse, ErrorEnvelope, MACAROONS_HEADER, PublicKeyResponse,
};
use crate::keys::PublicKey;
use crate::login::{DischargeToken, FORM_TOKEN_KIND, LoginForm, LoginRequest, LoginResponse};
use crate::macaroon::{MAX_DISCHARGE_DEPTH, Macaroon, TokenCaveat};
use crate::serialization::{encode_base64, encode_bundle};
use reqwest::{Method, Response};
use std::collections::VecDeque;
use tracing::debug;

/// Times a request is retried after obtaining discharges
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Logs in through the identity service's form with fixed credentials
#[derive(Debug, Clone)]
pub struct FormInteractor {
    username: String,
    password: String,
}

impl FormInteractor {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub async fn interact(
        &self,
        http: &reqwest::Client,
        location: &str,
        interaction: &Interaction,
    ) -> Result<DischargeToken> {
        if interaction.kind != FORM_TOKEN_KIND {
            return Err(Error::Http(format!(
                "unsupported interaction method {:?}",
                interaction.kind
            )));
        }

        let request = LoginRequest {
            form: LoginForm {
                username: self.username.clone(),
                password: self.password.clone(),
            },
        };
        let url = format!("{}{}", location.trim_end_matches('/'), interaction.url);
        let response = http.post(&url).json(&request).send().await?;
        let login: LoginResponse = json_or_error(response).await?;
        debug!(user = %self.username, "logged in through form");
        Ok(login.token)
    }
}

/// HTTP client that acquires discharges when a service asks for them
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    interactor: Option<FormInteractor>,
    max_retries: usize,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            interactor: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_interactor(mut self, interactor: FormInteractor) -> Self {
        self.interactor = Some(interactor);
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.request(Method::GET, url).await
    }

    /// Performs a request, discharging and retrying while the service
    /// answers with a discharge-required error
    pub async fn request(&self, method: Method, url: &str) -> Result<String> {
        let mut bundles = Vec::new();

        for attempt in 0..=self.max_retries {
            let mut request = self.http.request(method.clone(), url);
            for bundle in &bundles {
                request = request.header(MACAROONS_HEADER, bundle);
            }

            let response = request.send().await?;
            if response.status().is_success() {
                return Ok(response.text().await?);
            }

            match error_from_response(response).await {
                Error::DischargeRequired(required) => {
                    let Some(macaroon) = required.macaroon else {
                        return Err(Error::Http("discharge required without a macaroon".into()));
                    };
                    debug!(attempt, %url, "discharge required");
                    let bundle = self.discharge_all(&macaroon).await?;
                    bundles.push(encode_bundle(&bundle)?);
                }
                other => return Err(other),
            }
        }

        Err(Error::Http(format!(
            "giving up on {url} after {} attempts",
            self.max_retries + 1
        )))
    }

    /// Discharges every third-party caveat of `macaroon`, including those
    /// added by the discharges themselves, and binds the result
    pub async fn discharge_all(&self, macaroon: &Macaroon) -> Result<Vec<Macaroon>> {
        let mut pending: VecDeque<(TokenCaveat, usize)> = macaroon
            .third_party_caveats()
            .map(|caveat| (caveat.clone(), 0))
            .collect();
        let mut discharges = Vec::new();

        while let Some((caveat, depth)) = pending.pop_front() {
            if depth >= MAX_DISCHARGE_DEPTH {
                return Err(Error::Http("discharge chain too deep".into()));
            }
            let discharge = self.discharge(&caveat).await?;
            pending.extend(
                discharge
                    .third_party_caveats()
                    .map(|caveat| (caveat.clone(), depth + 1)),
            );
            discharges.push(discharge);
        }

        Ok(macaroon.prepare_for_request(discharges))
    }

    async fn discharge(&self, caveat: &TokenCaveat) -> Result<Macaroon> {
        let location = caveat
            .location
            .as_deref()
            .ok_or_else(|| Error::BadRequest("third-party caveat without location".into()))?;
        let id = encode_base64(&caveat.id);

        match self.request_discharge(location, &id, None).await {
            Err(Error::InteractionRequired(interaction)) => {
                let Some(interactor) = &self.interactor else {
                    return Err(Error::InteractionRequired(interaction));
                };
                let token = interactor.interact(&self.http, location, &interaction).await?;
                self.request_discharge(location, &id, Some(token)).await
            }
            other => other,
        }
    }

    async fn request_discharge(
        &self,
        location: &str,
        id: &str,
        token: Option<DischargeToken>,
    ) -> Result<Macaroon> {
        let url = format!("{}/discharge", location.trim_end_matches('/'));
        let request = DischargeRequest {
            id: id.to_string(),
            token,
        };
        let response = self.http.post(&url).json(&request).send().await?;
        let discharge: DischargeResponse = json_or_error(response).await?;
        Ok(Macaroon::from_base64(&discharge.macaroon)?)
    }
}

/// Fetches the identity service's public key
pub async fn fetch_public_key(http: &reqwest::Client, identity_url: &str) -> Result<PublicKey> {
    let url = format!("{}/publickey", identity_url.trim_end_matches('/'));
    let response: PublicKeyResponse = json_or_error(http.get(&url).send().await?).await?;
    Ok(PublicKey::from_hex(&response.public_key)?)
}

async fn json_or_error<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    Ok(response.json().await?)
}

/// Maps an error response back to the error the service reported
async fn error_from_response(response: Response) -> Error {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return e.into(),
    };

    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => envelope.into_error(),
        Err(_) => Error::Http(format!("{status}: {body}")),
    }
}
