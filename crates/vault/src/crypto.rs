//! Symmetric authenticated encryption for credentials at rest.
//!
//! A 256-bit AES-GCM key is derived with PBKDF2-SHA256 (fixed salt) from
//! the configured master key. Each ciphertext embeds its own fresh
//! 96-bit nonce: `<hex-nonce>:<hex-ciphertext>`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::Sha256;
use slipway_core::Error;
use zeroize::Zeroizing;

/// Fixed derivation salt. Key separation across deployments comes from
/// the master key, not the salt.
const DERIVATION_SALT: &[u8] = b"slipway-credential-vault";

/// PBKDF2 iteration count; derivation happens once per process.
const DERIVATION_ROUNDS: u32 = 100_000;

/// The vault cipher: a derived AES-256-GCM key.
pub struct Cipher {
    cipher: Aes256Gcm,
}

/// How the master key was obtained at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Derived from the configured `ENCRYPTION_KEY`.
    Configured,
    /// Generated fresh because no key was configured. Credentials
    /// encrypted in this mode do not survive a restart.
    Ephemeral,
}

impl Cipher {
    /// Build the cipher from optional configuration.
    ///
    /// With no configured key the vault still works, but on a freshly
    /// generated key -- the documented degraded mode. The caller is
    /// expected to warn loudly when [`KeySource::Ephemeral`] comes back.
    #[must_use]
    pub fn from_config(configured: Option<&str>) -> (Self, KeySource) {
        match configured {
            Some(master) => (Self::derive(&decode_master(master)), KeySource::Configured),
            None => {
                let random = Aes256Gcm::generate_key(&mut OsRng);
                let master = Zeroizing::new(random.to_vec());
                (Self::derive(&master), KeySource::Ephemeral)
            }
        }
    }

    fn derive(master: &[u8]) -> Self {
        let mut key_bytes = Zeroizing::new([0u8; 32]);
        pbkdf2::pbkdf2_hmac::<Sha256>(
            master,
            DERIVATION_SALT,
            DERIVATION_ROUNDS,
            key_bytes.as_mut(),
        );
        let key = Key::<Aes256Gcm>::from_slice(key_bytes.as_ref());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, Error> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| Error::internal("credential encryption failed"))?;
        Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
    }

    /// Decrypt a `<hex-nonce>:<hex-ciphertext>` document.
    ///
    /// Fails when the document is malformed, tampered with, or was
    /// sealed under a different key (an ephemeral key from a previous
    /// process, for instance).
    pub fn decrypt(&self, sealed: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
        let malformed = || Error::InvalidCredential {
            message: "stored ciphertext is malformed".into(),
        };
        let (nonce_hex, ciphertext_hex) = sealed.split_once(':').ok_or_else(malformed)?;
        let nonce_bytes = hex::decode(nonce_hex).map_err(|_| malformed())?;
        if nonce_bytes.len() != 12 {
            return Err(malformed());
        }
        let ciphertext = hex::decode(ciphertext_hex).map_err(|_| malformed())?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| Error::InvalidCredential {
                message: "credential decryption failed (key rotated or data tampered)".into(),
            })?;
        Ok(Zeroizing::new(plaintext))
    }
}

/// Accept the configured key as hex or base64, falling back to its raw
/// bytes; PBKDF2 derivation flattens the difference either way.
fn decode_master(configured: &str) -> Zeroizing<Vec<u8>> {
    use base64::Engine as _;

    if let Ok(bytes) = hex::decode(configured) {
        return Zeroizing::new(bytes);
    }
    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(configured) {
        return Zeroizing::new(bytes);
    }
    Zeroizing::new(configured.as_bytes().to_vec())
}
