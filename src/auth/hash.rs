use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::Deserialize;

use crate::error::{Error, Result};

const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const VERIFIER_BYTES: usize = 24;

/// Argon2id work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl HashParams {
    /// Smallest parameters argon2 accepts. Only suitable for tests.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: ARGON2_MEMORY_KIB,
            iterations: ARGON2_ITERATIONS,
            parallelism: ARGON2_PARALLELISM,
        }
    }
}

/// One-way hashing of API key verifiers.
#[derive(Clone)]
pub struct KeyHasher {
    argon2: Argon2<'static>,
    /// Hash of a throwaway verifier, checked when there is no real hash to
    /// compare against so every failed lookup costs one argon2 run.
    decoy: String,
}

impl KeyHasher {
    pub fn new(params: HashParams) -> Result<Self> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(ARGON2_OUTPUT_LEN),
        )
        .map_err(|e| Error::Config(format!("invalid argon2 params: {e}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let decoy = hash_with(&argon2, &generate_verifier())?;

        Ok(Self { argon2, decoy })
    }

    /// Hashes a verifier using Argon2id, returning a PHC string.
    pub fn hash(&self, verifier: &str) -> Result<String> {
        hash_with(&self.argon2, verifier)
    }

    /// Verifies a raw verifier against a stored hash. The comparison inside
    /// argon2 is constant time.
    pub fn verify(&self, verifier: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Crypto(format!("invalid hash format: {e}")))?;

        match self.argon2.verify_password(verifier.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Crypto(format!("failed to verify key: {e}"))),
        }
    }

    /// Spends the same work as [`KeyHasher::verify`] without a stored hash.
    pub fn verify_decoy(&self, verifier: &str) {
        if let Err(e) = self.verify(verifier, &self.decoy) {
            tracing::debug!("decoy verification failed: {e}");
        }
    }
}

fn hash_with(argon2: &Argon2<'static>, verifier: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(verifier.as_bytes(), &salt)
        .map_err(|e| Error::Crypto(format!("failed to hash key: {e}")))?;
    Ok(hash.to_string())
}

/// Generates a fresh URL-safe verifier from cryptographically secure bytes.
#[must_use]
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
