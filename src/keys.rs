//! Service key pairs.
//!
//! Each service owns an X25519 key pair. Third-party caveats are sealed to
//! the discharger's public key; only the discharger can open them.

use crate::crypto::{KEY_SIZE, public_key_for, random_bytes};
use crate::error::{Error, TokenError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// X25519 public key, hex-encoded on the wire
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; KEY_SIZE]);

/// X25519 private key, hex-encoded in the key file
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(pub [u8; KEY_SIZE]);

impl PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, TokenError> {
        decode_key(s).map(PublicKey)
    }
}

impl PrivateKey {
    pub fn from_hex(s: &str) -> Result<Self, TokenError> {
        decode_key(s).map(PrivateKey)
    }
}

fn decode_key(s: &str) -> Result<[u8; KEY_SIZE], TokenError> {
    let bytes = hex::decode(s.trim()).map_err(|e| TokenError::Deserialization(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| TokenError::InvalidFormat(format!("key must be {KEY_SIZE} bytes")))
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PrivateKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A service key pair, persisted as `{"public": hex, "private": hex}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl KeyPair {
    /// Generates a fresh key pair from the OS random source
    pub fn generate() -> Result<Self, TokenError> {
        let private: [u8; KEY_SIZE] = random_bytes()?;
        Ok(Self::from_private(PrivateKey(private)))
    }

    pub fn from_private(private: PrivateKey) -> Self {
        Self {
            public: PublicKey(public_key_for(&private.0)),
            private,
        }
    }

    /// Loads a key pair from a JSON file.
    ///
    /// The public half must match the private half.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path)?;
        let pair: KeyPair = serde_json::from_str(&data)
            .map_err(|e| TokenError::Deserialization(e.to_string()))?;
        if PublicKey(public_key_for(&pair.private.0)) != pair.public {
            return Err(TokenError::InvalidFormat("public key does not match private key".into()).into());
        }
        Ok(pair)
    }

    /// Loads the key pair at `path`, or generates one when no path is given
    pub fn load_or_generate(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::generate()?),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TokenError::Deserialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
