use std::fmt;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::error;

/// Argon2id memory cost in KiB (19 MiB).
pub const MEMORY_COST_KIB: u32 = 19_456;
/// Argon2id iteration count.
pub const TIME_COST: u32 = 2;
/// Argon2id degree of parallelism.
pub const PARALLELISM: u32 = 1;

/// A PHC-formatted password hash. Only [`hash_password`] produces one, so a
/// value of this type never holds plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword(String);

impl HashedPassword {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedPassword(..)")
    }
}

fn hasher() -> anyhow::Result<Argon2<'static>> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)
        .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash_password(plain: &str) -> anyhow::Result<HashedPassword> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(HashedPassword(hash))
}

/// Compare a candidate against a stored hash. The parameters embedded in the
/// stored hash win over the current constants.
pub fn verify_password(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(hasher()?.verify_password(plain.as_bytes(), &parsed).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_not_plaintext_and_verifies() {
        let hash = hash_password("Secr3t!").unwrap();
        assert_ne!(hash.as_str(), "Secr3t!");
        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(verify_password("Secr3t!", hash.as_str()).unwrap());
    }

    #[test]
    fn wrong_candidate_is_rejected() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(!verify_password("battery-staple", hash.as_str()).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn embeds_fixed_work_factor() {
        let hash = hash_password("x").unwrap();
        assert!(hash.as_str().contains("m=19456,t=2,p=1"));
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-valid-hash").is_err());
    }

    #[test]
    fn debug_redacts() {
        let hash = hash_password("x").unwrap();
        assert_eq!(format!("{hash:?}"), "HashedPassword(..)");
    }
}
