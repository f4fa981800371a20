use crate::Result;
use crate::engine::Ticket;
use crate::error::Error;
use crate::keys::KeyPair;
use crate::login::DischargeToken;
use crate::macaroon::Macaroon;
use crate::resolver::ThirdPartyResolver;
use std::sync::Arc;
use tracing::info;

/// Issues discharge macaroons for caveats sealed to this service's key
#[derive(Debug, Clone)]
pub struct Discharger {
    key_pair: Arc<KeyPair>,
    location: String,
    resolver: ThirdPartyResolver,
}

impl Discharger {
    pub fn new(key_pair: Arc<KeyPair>, location: impl Into<String>, resolver: ThirdPartyResolver) -> Self {
        Self {
            key_pair,
            location: location.into(),
            resolver,
        }
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Opens the ticket in `caveat_id`, resolves its condition and mints the
    /// discharge carrying the resulting restrictions
    pub fn discharge(&self, caveat_id: &[u8], token: Option<&DischargeToken>) -> Result<Macaroon> {
        let ticket = Ticket::open(&self.key_pair, caveat_id)
            .map_err(|e| Error::BadRequest(format!("cannot open caveat: {e}")))?;

        let caveats = self.resolver.resolve(&ticket.condition, token)?;

        let mut discharge =
            Macaroon::create_discharge(&ticket.caveat_key, caveat_id, Some(&self.location));
        for caveat in &caveats {
            discharge.add_first_party_caveat(caveat.encoded());
        }

        info!(condition = %ticket.condition, caveats = caveats.len(), "caveat discharged");
        Ok(discharge)
    }
}
