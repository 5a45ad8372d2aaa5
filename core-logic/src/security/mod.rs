use aes_gcm::{
    aead::{Aead, NewAead}, // NewAead for 0.9/0.4
    Aes256Gcm,
    Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::SecurityError;
use crate::traits::KeyVault;

const TAG_LEN: usize = 16;
const IV_LEN: usize = 12;
const SALT_LEN: usize = 16;

/// Hex-encoded ciphertext envelope, same shape as the `encrypted` block of
/// the wallet-json files plus the scrypt cost it was derived with.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    ciphertext: String,
    iv: String,
    salt: String,
    tag: String,
    #[serde(default = "default_log_n")]
    log_n: u8,
}

fn default_log_n() -> u8 {
    SecurityUtils::DEFAULT_LOG_N
}

/// scrypt + AES-256-GCM key vault.
#[derive(Debug, Clone, Copy)]
pub struct SecurityUtils {
    log_n: u8,
}

impl Default for SecurityUtils {
    fn default() -> Self {
        Self {
            log_n: Self::DEFAULT_LOG_N,
        }
    }
}

impl SecurityUtils {
    /// Node.js crypto.scryptSync defaults: N=16384, r=8, p=1
    pub const DEFAULT_LOG_N: u8 = 14;

    /// Vault with a custom scrypt cost for new ciphertexts. Decryption always
    /// uses the cost recorded in the envelope.
    pub fn with_log_n(log_n: u8) -> Self {
        Self { log_n }
    }

    fn derive_key(password: &str, salt: &[u8], log_n: u8) -> Result<Zeroizing<[u8; 32]>, SecurityError> {
        let params = scrypt::Params::new(log_n, 8, 1, 32).map_err(|e| {
            SecurityError::MalformedEnvelope {
                reason: format!("Invalid scrypt params: {}", e),
            }
        })?;
        let mut key = Zeroizing::new([0u8; 32]);
        scrypt::scrypt(password.as_bytes(), salt, &params, &mut key[..]).map_err(|e| {
            SecurityError::EncryptionFailed {
                reason: format!("Scrypt failed: {}", e),
            }
        })?;
        Ok(key)
    }

    pub fn decrypt_components(
        ciphertext_hex: &str,
        iv_hex: &str,
        salt_hex: &str,
        tag_hex: &str,
        log_n: u8,
        password: &str,
    ) -> Result<String, SecurityError> {
        let malformed = |field: &str| SecurityError::MalformedEnvelope {
            reason: format!("Invalid {} hex", field),
        };
        let ciphertext = hex::decode(ciphertext_hex).map_err(|_| malformed("ciphertext"))?;
        let iv = hex::decode(iv_hex).map_err(|_| malformed("iv"))?;
        let salt = hex::decode(salt_hex).map_err(|_| malformed("salt"))?;
        let mut tag = hex::decode(tag_hex).map_err(|_| malformed("tag"))?;

        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(SecurityError::MalformedEnvelope {
                reason: format!("iv/tag length {}/{}", iv.len(), tag.len()),
            });
        }

        let key = Self::derive_key(password, &salt, log_n)?;
        let cipher = Aes256Gcm::new(&(*key).into());
        let nonce = Nonce::from_slice(&iv);

        let mut full_payload = ciphertext;
        full_payload.append(&mut tag);

        let plaintext = cipher
            .decrypt(nonce, full_payload.as_ref())
            .map_err(|_| SecurityError::DecryptionFailed {
                reason: "wrong password or corrupted ciphertext".to_string(),
            })?;

        String::from_utf8(plaintext).map_err(|_| SecurityError::DecryptionFailed {
            reason: "Decrypted data is not valid UTF-8".to_string(),
        })
    }
}

impl KeyVault for SecurityUtils {
    fn encrypt(&self, plaintext: &str, password: &str) -> Result<String, SecurityError> {
        if password.is_empty() {
            return Err(SecurityError::PasswordRequired);
        }

        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut iv);

        let key = Self::derive_key(password, &salt, self.log_n)?;
        let cipher = Aes256Gcm::new(&(*key).into());

        let mut sealed = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|e| SecurityError::EncryptionFailed {
                reason: e.to_string(),
            })?;
        // aes-gcm appends the tag to the ciphertext
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        let envelope = Envelope {
            ciphertext: hex::encode(sealed),
            iv: hex::encode(iv),
            salt: hex::encode(salt),
            tag: hex::encode(tag),
            log_n: self.log_n,
        };
        serde_json::to_string(&envelope).map_err(|e| SecurityError::EncryptionFailed {
            reason: e.to_string(),
        })
    }

    fn decrypt(&self, ciphertext: &str, password: &str) -> Result<String, SecurityError> {
        if password.is_empty() {
            return Err(SecurityError::PasswordRequired);
        }
        let envelope: Envelope =
            serde_json::from_str(ciphertext).map_err(|e| SecurityError::MalformedEnvelope {
                reason: e.to_string(),
            })?;
        Self::decrypt_components(
            &envelope.ciphertext,
            &envelope.iv,
            &envelope.salt,
            &envelope.tag,
            envelope.log_n,
            password,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> SecurityUtils {
        SecurityUtils::with_log_n(4)
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let secret = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
        let sealed = vault().encrypt(secret, "hunter2").unwrap();
        assert!(!sealed.contains(secret));
        assert_eq!(vault().decrypt(&sealed, "hunter2").unwrap(), secret);
    }

    #[test]
    fn test_wrong_password_fails() {
        let sealed = vault().encrypt("secret", "right").unwrap();
        let err = vault().decrypt(&sealed, "wrong").unwrap_err();
        assert!(matches!(err, SecurityError::DecryptionFailed { .. }));
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(matches!(
            vault().encrypt("secret", ""),
            Err(SecurityError::PasswordRequired)
        ));
    }

    #[test]
    fn test_garbage_envelope_rejected() {
        let err = vault().decrypt("not-json", "pw").unwrap_err();
        assert!(matches!(err, SecurityError::MalformedEnvelope { .. }));
    }

    #[test]
    fn test_each_encryption_uses_fresh_salt() {
        let a = vault().encrypt("same", "pw").unwrap();
        let b = vault().encrypt("same", "pw").unwrap();
        assert_ne!(a, b);
    }
}
