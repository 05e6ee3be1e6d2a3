use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use base64::Engine;
use password_hash::{PasswordHash, SaltString};

use crate::config::HashingConfig;
use crate::error::StorageError;

/// Argon2id hasher bound to a fixed cost configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordHashing {
    cfg: HashingConfig,
}

impl PasswordHashing {
    pub fn new(cfg: HashingConfig) -> Self { Self { cfg } }

    fn argon2(&self) -> Result<Argon2<'static>, StorageError> {
        let params = Params::new(self.cfg.memory_kib, self.cfg.iterations, self.cfg.parallelism, None)
            .map_err(|e| StorageError::Hashing(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a plaintext password into a PHC string with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, StorageError> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| StorageError::Hashing(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| StorageError::Hashing(e.to_string()))?;
        let phc = self.argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| StorageError::Hashing(e.to_string()))?
            .to_string();
        Ok(phc)
    }
}

/// Check a plaintext against a stored PHC string. Parameters come from the hash itself.
pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// 256-bit random token, base64url without padding. Used for email confirmation.
pub fn generate_token() -> Result<String, StorageError> {
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| StorageError::Hashing(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

// Largest multiple of 1_000_000 that fits in u32; draws above it are rejected to keep codes uniform.
const CODE_SPACE: u32 = 1_000_000;
const CODE_ZONE: u32 = (u32::MAX / CODE_SPACE) * CODE_SPACE;

/// Six ASCII digits, uniform over 000000..=999999, from the OS random source.
pub fn generate_recovery_code() -> Result<String, StorageError> {
    loop {
        let mut buf = [0u8; 4];
        getrandom::getrandom(&mut buf).map_err(|e| StorageError::Hashing(e.to_string()))?;
        let draw = u32::from_le_bytes(buf);
        if draw < CODE_ZONE {
            return Ok(format!("{:06}", draw % CODE_SPACE));
        }
    }
}
