//! Minting and verification of operation-scoped macaroons.
//!
//! A minted macaroon's identifier names the operations it grants. Third-party
//! caveats carry a sealed ticket only the discharger can open: the caveat
//! root key plus the condition it has to check.

use crate::Result;
use crate::authorizer::{Authorizer, Identity};
use crate::caveat::{Caveat, ConditionKind};
use crate::checker::{Checker, StandardChecker, infer_identity};
use crate::crypto::{KEY_SIZE, SealedBox, open, random_bytes, seal};
use crate::error::{DischargeRequired, Error, TokenError};
use crate::keys::{KeyPair, PublicKey};
use crate::macaroon::Macaroon;
use crate::op::Op;
use crate::serialization::{from_msgpack, to_msgpack};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Random bytes making every minted identifier unique
pub const NONCE_SIZE: usize = 16;

/// Identifier of a minted macaroon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenId {
    pub nonce: [u8; NONCE_SIZE],
    pub ops: Vec<Op>,
    /// Minted with an `is-authenticated-user` caveat. Only such bundles may
    /// establish an identity: the discharger declares the username there,
    /// so any other declaration conflicts with it.
    #[serde(default)]
    pub authenticates: bool,
}

fn requires_authentication(caveat: &Caveat) -> bool {
    caveat.is_third_party()
        && matches!(
            ConditionKind::parse(&caveat.encoded()),
            Ok(ConditionKind::IsAuthenticatedUser)
        )
}

/// What a third party learns from a caveat id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub caveat_key: [u8; KEY_SIZE],
    pub condition: String,
}

impl Ticket {
    /// Seals this ticket to the third party's public key
    pub fn seal(&self, third_party: &PublicKey) -> std::result::Result<Vec<u8>, TokenError> {
        let sealed = seal(&third_party.0, &to_msgpack(self)?)?;
        to_msgpack(&sealed)
    }

    /// Opens a caveat id with the third party's key pair
    pub fn open(key_pair: &KeyPair, caveat_id: &[u8]) -> std::result::Result<Self, TokenError> {
        let sealed: SealedBox = from_msgpack(caveat_id)?;
        from_msgpack(&open(&key_pair.private.0, &sealed)?)
    }
}

/// Finds the public key of the third party at a location
pub trait ThirdPartyLocator: Send + Sync {
    fn public_key(&self, location: &str) -> Option<PublicKey>;
}

/// A fixed location → public key table
#[derive(Debug, Clone, Default)]
pub struct StaticLocator {
    keys: HashMap<String, PublicKey>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: impl Into<String>, key: PublicKey) -> Self {
        self.insert(location, key);
        self
    }

    pub fn insert(&mut self, location: impl Into<String>, key: PublicKey) {
        self.keys.insert(location.into(), key);
    }
}

impl ThirdPartyLocator for StaticLocator {
    fn public_key(&self, location: &str) -> Option<PublicKey> {
        self.keys.get(location).copied()
    }
}

/// What a successful authorization established
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub identity: Option<Identity>,
    pub ops: Vec<Op>,
}

/// Outcome of [`CredentialEngine::verify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed(AuthInfo),
    DischargeRequired(DischargeRequired),
}

/// Mints, binds and verifies credential tokens
pub trait CredentialEngine: Send + Sync {
    /// Mints a macaroon granting `ops`, restricted by `caveats`
    fn mint(&self, ops: &[Op], caveats: &[Caveat]) -> Result<Macaroon>;

    fn add_third_party_caveat(
        &self,
        token: Macaroon,
        location: &str,
        condition: &str,
    ) -> Result<Macaroon>;

    fn bind(&self, token: &Macaroon, discharge: &Macaroon) -> Macaroon;

    /// Checks presented bundles against the operations a request needs.
    ///
    /// Operations not granted by any valid bundle are put to `authorizer`.
    fn verify(
        &self,
        bundles: &[Vec<Macaroon>],
        required: &[Op],
        authorizer: &dyn Authorizer,
    ) -> Result<Decision>;
}

/// The engine a service uses for macaroons it mints itself
pub struct MacaroonEngine<L: ThirdPartyLocator> {
    root_key: [u8; KEY_SIZE],
    location: String,
    locator: L,
}

impl<L: ThirdPartyLocator> MacaroonEngine<L> {
    /// Creates an engine with a fresh random root key
    pub fn new(location: impl Into<String>, locator: L) -> Result<Self> {
        Ok(Self::with_root_key(random_bytes()?, location, locator))
    }

    pub fn with_root_key(
        root_key: [u8; KEY_SIZE],
        location: impl Into<String>,
        locator: L,
    ) -> Self {
        Self {
            root_key,
            location: location.into(),
            locator,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Verifies one bundle and returns the operations it grants together
    /// with the identity it declares
    fn verify_bundle(
        &self,
        bundle: &[Macaroon],
        checker: &impl Checker,
    ) -> std::result::Result<(Vec<Op>, Option<Identity>), TokenError> {
        let Some((primary, discharges)) = bundle.split_first() else {
            return Err(TokenError::InvalidFormat("empty macaroon bundle".to_string()));
        };

        let id: TokenId = from_msgpack(&primary.identifier)?;
        primary.verify(&self.root_key, checker, discharges)?;
        if !id.authenticates {
            return Ok((id.ops, None));
        }
        let identity = infer_identity(bundle)?.map(Identity::new);

        Ok((id.ops, identity))
    }
}

impl<L: ThirdPartyLocator> CredentialEngine for MacaroonEngine<L> {
    fn mint(&self, ops: &[Op], caveats: &[Caveat]) -> Result<Macaroon> {
        let id = TokenId {
            nonce: random_bytes()?,
            ops: ops.to_vec(),
            authenticates: caveats.iter().any(requires_authentication),
        };
        let mut macaroon = Macaroon::new(&self.root_key, to_msgpack(&id)?, Some(&self.location));

        for caveat in caveats {
            match caveat.location.as_deref() {
                Some(location) if caveat.is_third_party() => {
                    macaroon = self.add_third_party_caveat(macaroon, location, &caveat.encoded())?;
                }
                _ => macaroon.add_first_party_caveat(caveat.encoded()),
            }
        }

        debug!(ops = ?ops, caveats = caveats.len(), "minted macaroon");
        Ok(macaroon)
    }

    fn add_third_party_caveat(
        &self,
        mut token: Macaroon,
        location: &str,
        condition: &str,
    ) -> Result<Macaroon> {
        let public_key = self
            .locator
            .public_key(location)
            .ok_or_else(|| TokenError::UnknownThirdParty(location.to_string()))?;

        let ticket = Ticket {
            caveat_key: random_bytes()?,
            condition: condition.to_string(),
        };
        let caveat_id = ticket.seal(&public_key)?;
        token.add_third_party_caveat(&ticket.caveat_key, caveat_id, location)?;
        Ok(token)
    }

    fn bind(&self, token: &Macaroon, discharge: &Macaroon) -> Macaroon {
        token.bind_discharge(discharge)
    }

    fn verify(
        &self,
        bundles: &[Vec<Macaroon>],
        required: &[Op],
        authorizer: &dyn Authorizer,
    ) -> Result<Decision> {
        let checker = StandardChecker::new();
        let mut granted = BTreeSet::new();
        let mut identity: Option<Identity> = None;

        for bundle in bundles {
            match self.verify_bundle(bundle, &checker) {
                Ok((ops, declared)) => {
                    if matches!((&identity, &declared), (Some(a), Some(b)) if a != b) {
                        warn!(?identity, ?declared, "ignoring bundle declaring a different user");
                        continue;
                    }
                    granted.extend(ops);
                    identity = identity.or(declared);
                }
                Err(e) => warn!(error = %e, "ignoring invalid macaroon bundle"),
            }
        }

        let mut pending = Vec::new();
        let mut caveats: Vec<Caveat> = Vec::new();
        for op in required.iter().filter(|op| !granted.contains(*op)) {
            let (allowed, needed) = authorizer.decide(identity.as_ref(), op);
            if allowed {
                continue;
            }
            if needed.is_empty() {
                return Err(Error::Forbidden(format!("{op} not allowed")));
            }
            for caveat in needed {
                if !caveats.contains(&caveat) {
                    caveats.push(caveat);
                }
            }
            pending.push(op.clone());
        }

        if pending.is_empty() {
            return Ok(Decision::Allowed(AuthInfo {
                identity,
                ops: required.to_vec(),
            }));
        }

        Ok(Decision::DischargeRequired(DischargeRequired {
            caveats,
            ops: pending,
            macaroon: None,
        }))
    }
}
