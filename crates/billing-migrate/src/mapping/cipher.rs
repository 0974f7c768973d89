//! Reversible field encryption and the serialize/encrypt codec.
//!
//! Values flagged `encrypted` in a mapping rule are stored through
//! [`AeadCipher`]: AES-256-GCM with a key derived from configured secret
//! material via HKDF-SHA256. Ciphertext is stored as base64 of
//! `nonce || sealed`.
//!
//! Composite values are serialized before encryption and must be decrypted
//! before deserialization; [`FieldCodec`] owns both steps so the order cannot
//! be mixed up.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::hkdf::{Salt, HKDF_SHA256};
use ring::rand::{SecureRandom, SystemRandom};

use crate::core::Value;
use crate::error::{MigrateError, Result};

/// AES-256 key size in bytes
const KEY_SIZE: usize = 32;

/// HKDF salt; changing it invalidates every stored ciphertext.
const KEY_SALT: &[u8] = b"billing-migrate/field-cipher/v1";

/// Symmetric, reversible encryption of text values.
pub trait FieldCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;

    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

struct DataKeyLen;

impl ring::hkdf::KeyType for DataKeyLen {
    fn len(&self) -> usize {
        KEY_SIZE
    }
}

/// AES-256-GCM field cipher.
pub struct AeadCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl AeadCipher {
    /// Derive a cipher from secret material and a context label.
    ///
    /// Different labels yield unrelated keys for the same secret.
    pub fn from_secret(secret: &str, context: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(MigrateError::Crypto("encryption key is empty".into()));
        }

        let prk = Salt::new(HKDF_SHA256, KEY_SALT).extract(secret.as_bytes());
        let info = [context.as_bytes()];
        let okm = prk
            .expand(&info, DataKeyLen)
            .map_err(|_| MigrateError::Crypto("key derivation failed".into()))?;
        let mut key_bytes = [0u8; KEY_SIZE];
        okm.fill(&mut key_bytes)
            .map_err(|_| MigrateError::Crypto("key derivation failed".into()))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| MigrateError::Crypto("failed to create encryption key".into()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }
}

impl FieldCipher for AeadCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| MigrateError::Crypto("nonce generation failed".into()))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| MigrateError::Crypto("encryption failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let data = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| MigrateError::Crypto(format!("invalid ciphertext encoding: {}", e)))?;
        if data.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(MigrateError::Crypto("ciphertext too short".into()));
        }

        let (nonce_bytes, sealed) = data.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| MigrateError::Crypto("invalid nonce".into()))?;
        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| MigrateError::Crypto("decryption failed".into()))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|e| MigrateError::Crypto(format!("decrypted value is not UTF-8: {}", e)))
    }
}

impl fmt::Debug for AeadCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadCipher")
            .field("algorithm", &"AES-256-GCM")
            .finish()
    }
}

/// Cipher that returns its input; used when the foreign system stored a
/// value in clear text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCipher;

impl FieldCipher for PassthroughCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        Ok(ciphertext.to_string())
    }
}

/// Serialization and encryption of target field values.
#[derive(Clone)]
pub struct FieldCodec {
    cipher: Arc<dyn FieldCipher>,
}

impl FieldCodec {
    pub fn new(cipher: Arc<dyn FieldCipher>) -> Self {
        Self { cipher }
    }

    /// Serialize a (possibly composite) value to its canonical JSON text.
    /// NULL stays NULL.
    pub fn serialize(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let text = serde_json::to_string(&value.to_json())
            .map_err(|e| MigrateError::Serialization(e.to_string()))?;
        Ok(Value::Text(text))
    }

    /// Inverse of [`FieldCodec::serialize`].
    pub fn deserialize(&self, value: &Value) -> Result<Value> {
        match value.as_text() {
            None => Ok(Value::Null),
            Some(text) => serde_json::from_str::<serde_json::Value>(&text)
                .map(Value::from)
                .map_err(|e| MigrateError::Serialization(e.to_string())),
        }
    }

    /// Encrypt a value's text form. NULL stays NULL.
    pub fn encrypt(&self, value: &Value) -> Result<Value> {
        match value.as_text() {
            None => Ok(Value::Null),
            Some(text) => Ok(Value::Text(self.cipher.encrypt(&text)?)),
        }
    }

    /// Inverse of [`FieldCodec::encrypt`].
    pub fn decrypt(&self, value: &Value) -> Result<Value> {
        match value.as_text() {
            None => Ok(Value::Null),
            Some(text) => Ok(Value::Text(self.cipher.decrypt(&text)?)),
        }
    }
}

impl fmt::Debug for FieldCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCodec").finish_non_exhaustive()
    }
}
