use crate::error::TokenError;
use crate::macaroon::Macaroon;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Serialize;
use serde::de::DeserializeOwned;

type TokenResult<T> = std::result::Result<T, TokenError>;

/// Encodes any value as MessagePack
pub(crate) fn to_msgpack<T: Serialize>(value: &T) -> TokenResult<Vec<u8>> {
    rmp_serde::to_vec(value).map_err(|e| TokenError::Deserialization(e.to_string()))
}

/// Decodes a MessagePack value
pub(crate) fn from_msgpack<T: DeserializeOwned>(data: &[u8]) -> TokenResult<T> {
    rmp_serde::from_slice(data).map_err(|e| TokenError::Deserialization(e.to_string()))
}

/// Decodes URL-safe base64, accepting padded input as well
pub(crate) fn decode_base64(b64: &str) -> TokenResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(b64.trim().trim_end_matches('=').as_bytes())
        .map_err(|e| TokenError::Deserialization(e.to_string()))
}

pub(crate) fn encode_base64(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

impl Macaroon {
    /// Serializes this macaroon to JSON
    ///
    /// Binary fields are encoded as arrays of bytes.
    pub fn to_json(&self) -> TokenResult<String> {
        serde_json::to_string(self).map_err(|e| TokenError::Deserialization(e.to_string()))
    }

    /// Deserializes a macaroon from JSON
    pub fn from_json(json: &str) -> TokenResult<Self> {
        serde_json::from_str(json).map_err(|e| TokenError::Deserialization(e.to_string()))
    }

    /// Serializes this macaroon to MessagePack binary format
    pub fn to_msgpack(&self) -> TokenResult<Vec<u8>> {
        to_msgpack(self)
    }

    /// Deserializes a macaroon from MessagePack binary format
    pub fn from_msgpack(data: &[u8]) -> TokenResult<Self> {
        from_msgpack(data)
    }

    /// Serializes this macaroon to URL-safe base64 (MessagePack encoding)
    ///
    /// # Example
    /// ```
    /// use macaroon_identity::Macaroon;
    ///
    /// let original = Macaroon::new(b"secret", b"my-identifier", Some("http://example.com/"));
    /// let b64 = original.to_base64().unwrap();
    ///
    /// assert_eq!(Macaroon::from_base64(&b64).unwrap(), original);
    /// ```
    pub fn to_base64(&self) -> TokenResult<String> {
        Ok(encode_base64(&self.to_msgpack()?))
    }

    /// Deserializes a macaroon from URL-safe base64 (MessagePack encoding)
    pub fn from_base64(b64: &str) -> TokenResult<Self> {
        Self::from_msgpack(&decode_base64(b64)?)
    }
}

/// Encodes a bundle (primary macaroon followed by its bound discharges) as
/// the value of one `Macaroons` header
pub fn encode_bundle(bundle: &[Macaroon]) -> TokenResult<String> {
    Ok(encode_base64(&to_msgpack(&bundle)?))
}

/// Decodes one `Macaroons` header value
pub fn decode_bundle(b64: &str) -> TokenResult<Vec<Macaroon>> {
    let bundle: Vec<Macaroon> = from_msgpack(&decode_base64(b64)?)?;
    if bundle.is_empty() {
        return Err(TokenError::InvalidFormat("empty macaroon bundle".to_string()));
    }
    Ok(bundle)
}
