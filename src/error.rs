use crate::caveat::Caveat;
use crate::macaroon::Macaroon;
use crate::op::Op;
use thiserror::Error;

/// Errors raised by the credential engine while minting or checking macaroons
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The macaroon's signature chain does not match
    #[error("Invalid macaroon signature")]
    InvalidSignature,

    /// A caveat condition was not satisfied
    #[error("Caveat violation: {0}")]
    CaveatViolation(String),

    /// Failed to decode a macaroon, identifier or ticket
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The macaroon structure is invalid
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// No public key is known for a third-party location
    #[error("Unknown third party: {0}")]
    UnknownThirdParty(String),
}

/// Interactive step a client must perform before a discharge is granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    /// Interaction method name (always `"form"` here)
    pub kind: String,
    /// Path of the interactive endpoint, relative to the discharger
    pub url: String,
}

/// Authorization is possible once `caveats` are discharged for `ops`.
///
/// `macaroon` is set by the resource service once it has minted the
/// conditional token the client must get discharged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DischargeRequired {
    pub caveats: Vec<Caveat>,
    pub ops: Vec<Op>,
    pub macaroon: Option<Macaroon>,
}

/// Protocol errors and signals exchanged between client and services
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid length on row {row}")]
    MalformedRow { row: usize },

    #[error("invalid login form data: {0}")]
    MalformedForm(String),

    #[error("cannot parse caveat {condition:?}: {reason}")]
    MalformedCaveat { condition: String, reason: String },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token")]
    InvalidToken,

    #[error("user not in required group(s)")]
    GroupMembership,

    #[error("interaction required: use {} at {}", .0.kind, .0.url)]
    InteractionRequired(Interaction),

    #[error("macaroon discharge required")]
    DischargeRequired(Box<DischargeRequired>),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} method not allowed")]
    MethodNotAllowed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.to_string())
    }
}
