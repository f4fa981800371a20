use crate::error::TokenError;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use curve25519_dalek::montgomery::MontgomeryPoint;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha3::Sha3_256;
use subtle::ConstantTimeEq;

type HmacSha3 = Hmac<Sha3_256>;

/// Size of HMAC-SHA3-256 output in bytes (32 bytes = 256 bits)
pub const SIGNATURE_SIZE: usize = 32;

/// Size of root keys, caveat keys and X25519 keys
pub const KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce size
pub const NONCE_SIZE: usize = 12;

/// Generates an HMAC-SHA3-256 signature
///
/// # Arguments
/// * `key` - The secret key
/// * `message` - The message to authenticate
pub fn hmac_sha3(key: &[u8], message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    let mut mac =
        <HmacSha3 as Mac>::new_from_slice(key).expect("HMAC can take key of any length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Binds a new caveat to the signature chain: HMAC-SHA3(previous_signature, data)
pub fn bind_caveat(signature: &[u8], data: &[u8]) -> [u8; SIGNATURE_SIZE] {
    hmac_sha3(signature, data)
}

/// Binds a discharge signature to the primary macaroon's signature
pub fn bind_discharge(discharge_signature: &[u8], primary_signature: &[u8]) -> [u8; SIGNATURE_SIZE] {
    hmac_sha3(discharge_signature, primary_signature)
}

/// Compares two signatures without leaking the position of the first mismatch
pub fn signatures_match(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Fills an array from the operating system's CSPRNG
pub fn random_bytes<const N: usize>() -> Result<[u8; N], TokenError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).map_err(|e| TokenError::Crypto(e.to_string()))?;
    Ok(buf)
}

/// Encrypts `plaintext` under a symmetric key; output is `nonce || ciphertext`
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, TokenError> {
    let nonce: [u8; NONCE_SIZE] = random_bytes()?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| TokenError::Crypto(format!("encryption failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverses [`encrypt`]
pub fn decrypt(key: &[u8; KEY_SIZE], data: &[u8]) -> Result<Vec<u8>, TokenError> {
    if data.len() < NONCE_SIZE {
        return Err(TokenError::Crypto("ciphertext too short".to_string()));
    }
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| TokenError::Crypto("decryption failed".to_string()))
}

/// Derives the X25519 public key for a private key
pub fn public_key_for(private_key: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    MontgomeryPoint::mul_base_clamped(*private_key).to_bytes()
}

/// Payload encrypted to a recipient's public key with an ephemeral sender key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    pub ephemeral_public: [u8; KEY_SIZE],
    pub ciphertext: Vec<u8>,
}

fn shared_key(
    private_key: &[u8; KEY_SIZE],
    peer_public: &[u8; KEY_SIZE],
    ephemeral_public: &[u8; KEY_SIZE],
    recipient_public: &[u8; KEY_SIZE],
) -> Result<[u8; KEY_SIZE], TokenError> {
    let shared = MontgomeryPoint(*peer_public).mul_clamped(*private_key);
    if shared.to_bytes() == [0u8; KEY_SIZE] {
        return Err(TokenError::Crypto("low-order public key".to_string()));
    }

    let mut context = Vec::with_capacity(2 * KEY_SIZE);
    context.extend_from_slice(ephemeral_public);
    context.extend_from_slice(recipient_public);
    Ok(hmac_sha3(shared.as_bytes(), &context))
}

/// Encrypts `plaintext` so that only the holder of the private key matching
/// `recipient_public` can read it
pub fn seal(recipient_public: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<SealedBox, TokenError> {
    let ephemeral_private: [u8; KEY_SIZE] = random_bytes()?;
    let ephemeral_public = public_key_for(&ephemeral_private);
    let key = shared_key(
        &ephemeral_private,
        recipient_public,
        &ephemeral_public,
        recipient_public,
    )?;

    Ok(SealedBox {
        ephemeral_public,
        ciphertext: encrypt(&key, plaintext)?,
    })
}

/// Opens a [`SealedBox`] with the recipient's private key
pub fn open(private_key: &[u8; KEY_SIZE], sealed: &SealedBox) -> Result<Vec<u8>, TokenError> {
    let own_public = public_key_for(private_key);
    let key = shared_key(
        private_key,
        &sealed.ephemeral_public,
        &sealed.ephemeral_public,
        &own_public,
    )?;
    decrypt(&key, &sealed.ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_sha3_deterministic() {
        let sig1 = hmac_sha3(b"secret key", b"hello world");
        let sig2 = hmac_sha3(b"secret key", b"hello world");

        assert_eq!(sig1, sig2);
        assert_eq!(sig1.len(), SIGNATURE_SIZE);
    }

    #[test]
    fn test_hmac_sha3_different_keys() {
        assert_ne!(hmac_sha3(b"key1", b"message"), hmac_sha3(b"key2", b"message"));
    }

    #[test]
    fn test_bind_caveat_chaining() {
        let sig1 = hmac_sha3(b"root secret", b"my macaroon");
        let sig2 = bind_caveat(&sig1, b"time-before 2030-01-01T00:00:00Z");
        let sig3 = bind_caveat(&sig2, b"declared username alice");

        assert_ne!(sig1, sig2);
        assert_ne!(sig2, sig3);

        let rebuilt = bind_caveat(
            &bind_caveat(&sig1, b"time-before 2030-01-01T00:00:00Z"),
            b"declared username alice",
        );
        assert_eq!(sig3, rebuilt);
    }

    #[test]
    fn test_signatures_match() {
        let sig = hmac_sha3(b"k", b"m");
        assert!(signatures_match(&sig, &sig));
        assert!(!signatures_match(&sig, &hmac_sha3(b"k", b"n")));
        assert!(!signatures_match(&sig, &sig[..16]));
    }

    #[test]
    fn test_symmetric_encryption() {
        let key: [u8; KEY_SIZE] = random_bytes().unwrap();
        let data = encrypt(&key, b"caveat root key").unwrap();

        assert_eq!(decrypt(&key, &data).unwrap(), b"caveat root key");

        let other: [u8; KEY_SIZE] = random_bytes().unwrap();
        assert!(decrypt(&other, &data).is_err());
        assert!(decrypt(&key, &data[..4]).is_err());
    }

    #[test]
    fn test_seal_and_open() {
        let private: [u8; KEY_SIZE] = random_bytes().unwrap();
        let public = public_key_for(&private);

        let sealed = seal(&public, b"is-member-of group1").unwrap();
        assert_eq!(open(&private, &sealed).unwrap(), b"is-member-of group1");
    }

    #[test]
    fn test_public_key_is_standard_x25519() {
        // RFC 7748 section 6.1
        let private: [u8; KEY_SIZE] =
            hex::decode("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a")
                .unwrap()
                .try_into()
                .unwrap();
        assert_eq!(
            hex::encode(public_key_for(&private)),
            "8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a"
        );
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let private: [u8; KEY_SIZE] = random_bytes().unwrap();
        let sealed = seal(&public_key_for(&private), b"secret").unwrap();

        let intruder: [u8; KEY_SIZE] = random_bytes().unwrap();
        assert!(open(&intruder, &sealed).is_err());
    }
}
