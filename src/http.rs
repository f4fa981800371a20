//! Wire types shared by both services and the client.

use crate::caveat::Caveat;
use crate::error::{DischargeRequired, Error, Interaction};
use crate::login::DischargeToken;
use crate::macaroon::Macaroon;
use crate::op::Op;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::error;

/// Request header carrying one encoded macaroon bundle
pub const MACAROONS_HEADER: &str = "Macaroons";

pub const MACAROON_PATH: &str = "/";
pub const COOKIE_NAME_SUFFIX: &str = "auth";

/// Body of `POST /discharge`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DischargeRequest {
    /// Base64 caveat id
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<DischargeToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DischargeResponse {
    /// Base64 discharge macaroon
    pub macaroon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DischargeRequiredInfo {
    macaroon: String,
    macaroon_path: String,
    cookie_name_suffix: String,
    #[serde(default)]
    caveats: Vec<Caveat>,
    #[serde(default)]
    ops: Vec<Op>,
}

/// JSON body of every error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::MalformedRow { .. }
        | Error::MalformedForm(_)
        | Error::MalformedCaveat { .. }
        | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::InvalidCredentials
        | Error::InvalidToken
        | Error::GroupMembership
        | Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::InteractionRequired(_) | Error::DischargeRequired(_) => StatusCode::UNAUTHORIZED,
        Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        Error::Token(_) | Error::Io(_) | Error::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn code_for(err: &Error) -> &'static str {
    match err {
        Error::MalformedRow { .. } => "malformed_row",
        Error::MalformedForm(_) => "malformed_form",
        Error::MalformedCaveat { .. } => "malformed_caveat",
        Error::InvalidCredentials => "invalid_credentials",
        Error::InvalidToken => "invalid_token",
        Error::GroupMembership => "group_membership",
        Error::InteractionRequired(_) => "interaction_required",
        Error::DischargeRequired(_) => "discharge_required",
        Error::Forbidden(_) => "forbidden",
        Error::MethodNotAllowed(_) => "method_not_allowed",
        Error::BadRequest(_) => "bad_request",
        Error::Token(_) | Error::Io(_) | Error::Http(_) => "internal",
    }
}

fn detail(info: &Option<Value>) -> String {
    info.as_ref()
        .and_then(|i| i.get("detail"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl ErrorEnvelope {
    pub fn from_error(err: &Error) -> Self {
        let info = match err {
            Error::MalformedRow { row } => Some(json!({ "row": row })),
            Error::MalformedCaveat { condition, reason } => {
                Some(json!({ "condition": condition, "reason": reason }))
            }
            Error::MalformedForm(detail)
            | Error::Forbidden(detail)
            | Error::MethodNotAllowed(detail)
            | Error::BadRequest(detail) => Some(json!({ "detail": detail })),
            Error::InteractionRequired(interaction) => {
                Some(json!({ "kind": interaction.kind, "url": interaction.url }))
            }
            Error::DischargeRequired(required) => {
                let macaroon = required.macaroon.as_ref().map(Macaroon::to_base64);
                match macaroon {
                    Some(Ok(macaroon)) => serde_json::to_value(DischargeRequiredInfo {
                        macaroon,
                        macaroon_path: MACAROON_PATH.to_string(),
                        cookie_name_suffix: COOKIE_NAME_SUFFIX.to_string(),
                        caveats: required.caveats.clone(),
                        ops: required.ops.clone(),
                    })
                    .ok(),
                    _ => None,
                }
            }
            _ => None,
        };

        Self {
            code: code_for(err).to_string(),
            message: err.to_string(),
            info,
        }
    }

    /// Reconstructs the error a service reported
    pub fn into_error(self) -> Error {
        let info = self.info;
        match self.code.as_str() {
            "malformed_row" => Error::MalformedRow {
                row: info
                    .as_ref()
                    .and_then(|i| i.get("row"))
                    .and_then(Value::as_u64)
                    .unwrap_or_default() as usize,
            },
            "malformed_form" => Error::MalformedForm(detail(&info)),
            "malformed_caveat" => {
                let field = |name: &str| {
                    info.as_ref()
                        .and_then(|i| i.get(name))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                Error::MalformedCaveat {
                    condition: field("condition"),
                    reason: field("reason"),
                }
            }
            "invalid_credentials" => Error::InvalidCredentials,
            "invalid_token" => Error::InvalidToken,
            "group_membership" => Error::GroupMembership,
            "interaction_required" => match info.map(serde_json::from_value::<InteractionWire>) {
                Some(Ok(wire)) => Error::InteractionRequired(Interaction {
                    kind: wire.kind,
                    url: wire.url,
                }),
                _ => Error::Http(format!("malformed interaction: {}", self.message)),
            },
            "discharge_required" => {
                let Some(Ok(wire)) = info.map(serde_json::from_value::<DischargeRequiredInfo>)
                else {
                    return Error::Http(format!("malformed discharge request: {}", self.message));
                };
                match Macaroon::from_base64(&wire.macaroon) {
                    Ok(macaroon) => Error::DischargeRequired(Box::new(DischargeRequired {
                        caveats: wire.caveats,
                        ops: wire.ops,
                        macaroon: Some(macaroon),
                    })),
                    Err(e) => e.into(),
                }
            }
            "forbidden" => Error::Forbidden(detail(&info)),
            "method_not_allowed" => Error::MethodNotAllowed(detail(&info)),
            "bad_request" => Error::BadRequest(detail(&info)),
            code => Error::Http(format!("{code}: {}", self.message)),
        }
    }
}

#[derive(Deserialize)]
struct InteractionWire {
    kind: String,
    url: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(ErrorEnvelope::from_error(&self))).into_response()
    }
}
