use crate::checker::Checker;
use crate::crypto::{
    KEY_SIZE, SIGNATURE_SIZE, bind_caveat, bind_discharge, decrypt, encrypt, hmac_sha3,
    signatures_match,
};
use crate::error::TokenError;
use serde::{Deserialize, Serialize};

/// Maximum nesting of discharges that themselves carry third-party caveats
pub const MAX_DISCHARGE_DEPTH: usize = 8;

type TokenResult<T> = std::result::Result<T, TokenError>;

/// A caveat as stored inside a macaroon.
///
/// First-party caveats carry their condition in `id`. Third-party caveats
/// carry the sealed ticket for the discharger in `id` and the caveat root
/// key, encrypted under the signature at that point of the chain, in
/// `verification_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCaveat {
    pub id: Vec<u8>,
    pub verification_id: Option<Vec<u8>>,
    pub location: Option<String>,
}

impl TokenCaveat {
    pub fn is_first_party(&self) -> bool {
        self.verification_id.is_none()
    }

    pub fn is_third_party(&self) -> bool {
        !self.is_first_party()
    }

    fn chain_input(&self) -> Vec<u8> {
        match &self.verification_id {
            None => self.id.clone(),
            Some(vid) => [vid.as_slice(), self.id.as_slice()].concat(),
        }
    }
}

/// A macaroon is a bearer token with embedded, attenuating caveats.
///
/// Signatures are chained HMAC-SHA3-256, so any holder can add caveats but
/// nobody can remove one without the root key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macaroon {
    /// Optional location hint for the issuing service
    pub location: Option<String>,

    /// Public identifier for this macaroon
    pub identifier: Vec<u8>,

    /// Caveats (restrictions) attached to this macaroon, in chain order
    pub caveats: Vec<TokenCaveat>,

    /// HMAC-SHA3-256 signature (32 bytes)
    pub signature: [u8; SIGNATURE_SIZE],
}

impl Macaroon {
    /// Creates a new macaroon (minting operation)
    ///
    /// # Example
    /// ```
    /// use macaroon_identity::Macaroon;
    ///
    /// let root_key = b"this is our super secret key; only we should know it";
    /// let macaroon = Macaroon::new(root_key, b"we used our secret key", Some("http://mybank/"));
    /// assert!(macaroon.is_unrestricted());
    /// ```
    pub fn new(
        root_key: &[u8],
        identifier: impl Into<Vec<u8>>,
        location: Option<impl Into<String>>,
    ) -> Self {
        let identifier = identifier.into();
        let signature = hmac_sha3(root_key, &identifier);

        Self {
            location: location.map(|l| l.into()),
            identifier,
            caveats: Vec::new(),
            signature,
        }
    }

    /// Adds a first-party caveat, checked by whoever verifies this macaroon
    pub fn add_first_party_caveat(&mut self, condition: impl Into<Vec<u8>>) {
        let caveat = TokenCaveat {
            id: condition.into(),
            verification_id: None,
            location: None,
        };
        self.signature = bind_caveat(&self.signature, &caveat.chain_input());
        self.caveats.push(caveat);
    }

    /// Adds a third-party caveat.
    ///
    /// `caveat_key` is the root key the third party will use for the
    /// discharge; `caveat_id` is the ticket telling it which key and
    /// condition to use.
    pub fn add_third_party_caveat(
        &mut self,
        caveat_key: &[u8; KEY_SIZE],
        caveat_id: impl Into<Vec<u8>>,
        location: impl Into<String>,
    ) -> TokenResult<()> {
        let caveat = TokenCaveat {
            id: caveat_id.into(),
            verification_id: Some(encrypt(&self.signature, caveat_key)?),
            location: Some(location.into()),
        };
        self.signature = bind_caveat(&self.signature, &caveat.chain_input());
        self.caveats.push(caveat);
        Ok(())
    }

    /// Returns the number of caveats in this macaroon
    pub fn caveat_count(&self) -> usize {
        self.caveats.len()
    }

    /// Returns true if this macaroon has no caveats
    pub fn is_unrestricted(&self) -> bool {
        self.caveats.is_empty()
    }

    pub fn third_party_caveats(&self) -> impl Iterator<Item = &TokenCaveat> {
        self.caveats.iter().filter(|c| c.is_third_party())
    }

    /// First-party conditions, lossily decoded as UTF-8
    pub fn first_party_conditions(&self) -> impl Iterator<Item = String> + '_ {
        self.caveats
            .iter()
            .filter(|c| c.is_first_party())
            .map(|c| String::from_utf8_lossy(&c.id).into_owned())
    }

    /// Creates a discharge macaroon for a third-party caveat
    pub fn create_discharge(
        caveat_key: &[u8; KEY_SIZE],
        caveat_id: impl Into<Vec<u8>>,
        location: Option<impl Into<String>>,
    ) -> Self {
        Self::new(caveat_key, caveat_id, location)
    }

    /// Binds a discharge macaroon to this macaroon's signature so the two
    /// cannot be used separately
    pub fn bind_discharge(&self, discharge: &Macaroon) -> Macaroon {
        let mut bound = discharge.clone();
        bound.signature = bind_discharge(&discharge.signature, &self.signature);
        bound
    }

    /// Returns this macaroon followed by all discharges bound to it
    pub fn prepare_for_request(&self, discharges: Vec<Macaroon>) -> Vec<Macaroon> {
        let mut result = vec![self.clone()];

        for discharge in discharges {
            result.push(self.bind_discharge(&discharge));
        }

        result
    }

    /// Verifies this macaroon against its root key.
    ///
    /// Rebuilds the signature chain, then checks every first-party caveat
    /// with `checker` and every third-party caveat against a bound
    /// discharge from `discharges`.
    ///
    /// # Example
    /// ```
    /// use macaroon_identity::{Macaroon, checker::AcceptAll};
    ///
    /// let root_key = b"secret";
    /// let mut macaroon = Macaroon::new(root_key, b"identifier", None::<String>);
    /// macaroon.add_first_party_caveat("declared username alice");
    ///
    /// assert!(macaroon.verify(root_key, &AcceptAll, &[]).is_ok());
    /// assert!(macaroon.verify(b"wrong", &AcceptAll, &[]).is_err());
    /// ```
    pub fn verify(
        &self,
        root_key: &[u8],
        checker: &impl Checker,
        discharges: &[Macaroon],
    ) -> TokenResult<()> {
        self.verify_chain(root_key, &self.signature, true, checker, discharges, 0)
    }

    fn verify_chain(
        &self,
        key: &[u8],
        primary_signature: &[u8; SIGNATURE_SIZE],
        is_primary: bool,
        checker: &impl Checker,
        discharges: &[Macaroon],
        depth: usize,
    ) -> TokenResult<()> {
        if depth > MAX_DISCHARGE_DEPTH {
            return Err(TokenError::InvalidFormat(
                "discharge chain too deep".to_string(),
            ));
        }

        // Rebuild the chain, remembering the signature each caveat was added under
        let mut signature = hmac_sha3(key, &self.identifier);
        let mut preceding = Vec::with_capacity(self.caveats.len());
        for caveat in &self.caveats {
            preceding.push(signature);
            signature = bind_caveat(&signature, &caveat.chain_input());
        }

        let expected = if is_primary {
            signature
        } else {
            bind_discharge(&signature, primary_signature)
        };
        if !signatures_match(&expected, &self.signature) {
            return Err(TokenError::InvalidSignature);
        }

        for (caveat, signature) in self.caveats.iter().zip(&preceding) {
            match &caveat.verification_id {
                None => {
                    let condition = std::str::from_utf8(&caveat.id).map_err(|_| {
                        TokenError::CaveatViolation("caveat is not valid UTF-8".to_string())
                    })?;
                    checker.check(condition)?;
                }
                Some(vid) => {
                    let caveat_key: [u8; KEY_SIZE] = decrypt(signature, vid)?
                        .try_into()
                        .map_err(|_| TokenError::Crypto("bad caveat key length".to_string()))?;

                    let discharge = discharges
                        .iter()
                        .find(|d| d.identifier == caveat.id)
                        .ok_or_else(|| {
                            TokenError::CaveatViolation(format!(
                                "missing discharge for third-party caveat at {}",
                                caveat.location.as_deref().unwrap_or("<unknown>")
                            ))
                        })?;

                    discharge.verify_chain(
                        &caveat_key,
                        primary_signature,
                        false,
                        checker,
                        discharges,
                        depth + 1,
                    )?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{AcceptAll, FnChecker, RejectAll};
    use crate::crypto::random_bytes;

    fn caveat_key() -> [u8; KEY_SIZE] {
        random_bytes().unwrap()
    }

    #[test]
    fn test_new_macaroon() {
        let root_key = b"this is our super secret key; only we should know it";
        let macaroon = Macaroon::new(root_key, b"we used our secret key", Some("http://mybank/"));

        assert_eq!(macaroon.identifier, b"we used our secret key");
        assert_eq!(macaroon.location.as_deref(), Some("http://mybank/"));
        assert!(macaroon.is_unrestricted());

        let again = Macaroon::new(root_key, b"we used our secret key", Some("http://mybank/"));
        assert_eq!(macaroon.signature, again.signature);
    }

    #[test]
    fn test_add_first_party_caveat_changes_signature() {
        let mut macaroon = Macaroon::new(b"secret", b"identifier", None::<String>);
        let original = macaroon.signature;

        macaroon.add_first_party_caveat("declared username alice");

        assert_eq!(macaroon.caveat_count(), 1);
        assert!(macaroon.caveats[0].is_first_party());
        assert_ne!(macaroon.signature, original);
    }

    #[test]
    fn test_add_third_party_caveat() {
        let mut macaroon = Macaroon::new(b"secret", b"identifier", None::<String>);
        macaroon
            .add_third_party_caveat(&caveat_key(), b"ticket", "http://auth")
            .unwrap();

        let caveat = &macaroon.caveats[0];
        assert!(caveat.is_third_party());
        assert_eq!(caveat.location.as_deref(), Some("http://auth"));
        assert_eq!(macaroon.third_party_caveats().count(), 1);
    }

    #[test]
    fn test_verify_wrong_root_key() {
        let macaroon = Macaroon::new(b"secret", b"identifier", None::<String>);
        assert_eq!(
            macaroon.verify(b"wrong", &AcceptAll, &[]),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_verify_tampered_caveat() {
        let mut macaroon = Macaroon::new(b"secret", b"identifier", None::<String>);
        macaroon.add_first_party_caveat("declared username alice");
        macaroon.caveats[0].id = b"declared username mallory".to_vec();

        assert_eq!(
            macaroon.verify(b"secret", &AcceptAll, &[]),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_verify_removed_caveat() {
        let mut macaroon = Macaroon::new(b"secret", b"identifier", None::<String>);
        macaroon.add_first_party_caveat("time-before 2000-01-01T00:00:00Z");
        macaroon.caveats.clear();

        assert!(macaroon.verify(b"secret", &AcceptAll, &[]).is_err());
    }

    #[test]
    fn test_checker_rejection_propagates() {
        let mut macaroon = Macaroon::new(b"secret", b"identifier", None::<String>);
        macaroon.add_first_party_caveat("anything");

        assert!(matches!(
            macaroon.verify(b"secret", &RejectAll, &[]),
            Err(TokenError::CaveatViolation(_))
        ));
    }

    #[test]
    fn test_third_party_requires_discharge() {
        let mut primary = Macaroon::new(b"secret", b"primary", None::<String>);
        primary
            .add_third_party_caveat(&caveat_key(), b"ticket", "http://auth")
            .unwrap();

        assert!(matches!(
            primary.verify(b"secret", &AcceptAll, &[]),
            Err(TokenError::CaveatViolation(_))
        ));
    }

    #[test]
    fn test_bound_discharge_verifies() {
        let key = caveat_key();
        let mut primary = Macaroon::new(b"secret", b"primary", None::<String>);
        primary.add_third_party_caveat(&key, b"ticket", "http://auth").unwrap();

        let mut discharge = Macaroon::create_discharge(&key, b"ticket", Some("http://auth"));
        discharge.add_first_party_caveat("declared username alice");

        let bundle = primary.prepare_for_request(vec![discharge]);
        assert_eq!(bundle.len(), 2);
        assert!(bundle[0].verify(b"secret", &AcceptAll, &bundle[1..]).is_ok());
    }

    #[test]
    fn test_unbound_discharge_rejected() {
        let key = caveat_key();
        let mut primary = Macaroon::new(b"secret", b"primary", None::<String>);
        primary.add_third_party_caveat(&key, b"ticket", "http://auth").unwrap();

        let discharge = Macaroon::create_discharge(&key, b"ticket", None::<String>);
        assert_eq!(
            primary.verify(b"secret", &AcceptAll, &[discharge]),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_discharge_bound_to_other_macaroon_rejected() {
        let key = caveat_key();
        let mut primary = Macaroon::new(b"secret", b"primary", None::<String>);
        primary.add_third_party_caveat(&key, b"ticket", "http://auth").unwrap();

        let other = Macaroon::new(b"secret", b"other", None::<String>);
        let discharge = Macaroon::create_discharge(&key, b"ticket", None::<String>);
        let bound_elsewhere = other.bind_discharge(&discharge);

        assert!(primary.verify(b"secret", &AcceptAll, &[bound_elsewhere]).is_err());
    }

    #[test]
    fn test_discharge_with_wrong_key_rejected() {
        let mut primary = Macaroon::new(b"secret", b"primary", None::<String>);
        primary
            .add_third_party_caveat(&caveat_key(), b"ticket", "http://auth")
            .unwrap();

        let forged = Macaroon::create_discharge(&caveat_key(), b"ticket", None::<String>);
        let bundle = primary.prepare_for_request(vec![forged]);
        assert_eq!(
            bundle[0].verify(b"secret", &AcceptAll, &bundle[1..]),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_discharge_caveats_are_checked() {
        let key = caveat_key();
        let mut primary = Macaroon::new(b"secret", b"primary", None::<String>);
        primary.add_third_party_caveat(&key, b"ticket", "http://auth").unwrap();

        let mut discharge = Macaroon::create_discharge(&key, b"ticket", None::<String>);
        discharge.add_first_party_caveat("declared username mallory");
        let bundle = primary.prepare_for_request(vec![discharge]);

        let checker = FnChecker::new(|condition| {
            if condition.ends_with("alice") {
                Ok(())
            } else {
                Err(TokenError::CaveatViolation(condition.to_string()))
            }
        });
        assert!(bundle[0].verify(b"secret", &checker, &bundle[1..]).is_err());
    }

    #[test]
    fn test_nested_discharge() {
        let outer_key = caveat_key();
        let inner_key = caveat_key();

        let mut primary = Macaroon::new(b"secret", b"primary", None::<String>);
        primary.add_third_party_caveat(&outer_key, b"outer", "http://a").unwrap();

        let mut outer = Macaroon::create_discharge(&outer_key, b"outer", None::<String>);
        outer.add_third_party_caveat(&inner_key, b"inner", "http://b").unwrap();
        let inner = Macaroon::create_discharge(&inner_key, b"inner", None::<String>);

        let bundle = primary.prepare_for_request(vec![outer, inner]);
        assert!(bundle[0].verify(b"secret", &AcceptAll, &bundle[1..]).is_ok());
    }

    #[test]
    fn test_self_referencing_discharge_is_bounded() {
        let key = caveat_key();
        let mut primary = Macaroon::new(b"secret", b"primary", None::<String>);
        primary.add_third_party_caveat(&key, b"loop", "http://a").unwrap();

        let mut discharge = Macaroon::create_discharge(&key, b"loop", None::<String>);
        discharge.add_third_party_caveat(&key, b"loop", "http://a").unwrap();

        let bundle = primary.prepare_for_request(vec![discharge]);
        assert!(bundle[0].verify(b"secret", &AcceptAll, &bundle[1..]).is_err());
    }
}
