use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use crate::{config::SecurityConfig, error::Result, Error};

/// Encrypts and decrypts platform credentials at rest.
///
/// Connections store an opaque base64 blob; workers decrypt it at the top
/// of each job and never cache the plaintext beyond the job. Ciphertext
/// layout is `nonce (12 bytes) || AES-256-GCM output`.
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let key_bytes = config.credential_encryption_key.as_bytes();

        if key_bytes.len() != 32 {
            return Err(Error::new(
                crate::error::ErrorCode::EncryptionError,
                "credential encryption key must be exactly 32 bytes",
            ));
        }

        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        let cipher = Aes256Gcm::new(key);

        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| {
                Error::new(
                    crate::error::ErrorCode::EncryptionError,
                    format!("encryption failed: {}", e),
                )
            })?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < 12 {
            return Err(Error::new(
                crate::error::ErrorCode::DecryptionError,
                "invalid ciphertext length",
            ));
        }

        let (nonce_bytes, encrypted_data) = ciphertext.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, encrypted_data)
            .map_err(|e| {
                Error::new(
                    crate::error::ErrorCode::DecryptionError,
                    format!("decryption failed: {}", e),
                )
            })?;

        Ok(plaintext)
    }

    pub fn encrypt_string(&self, plaintext: &str) -> Result<String> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let encrypted = self.encrypt(plaintext.as_bytes())?;
        Ok(STANDARD.encode(&encrypted))
    }

    pub fn decrypt_string(&self, ciphertext: &str) -> Result<String> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let decoded = STANDARD.decode(ciphertext).map_err(|e| {
            Error::new(
                crate::error::ErrorCode::DecryptionError,
                format!("invalid base64: {}", e),
            )
        })?;

        let decrypted = self.decrypt(&decoded)?;

        String::from_utf8(decrypted).map_err(|e| {
            Error::new(
                crate::error::ErrorCode::DecryptionError,
                format!("invalid UTF-8: {}", e),
            )
        })
    }
}
