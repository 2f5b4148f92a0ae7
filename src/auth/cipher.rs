use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use rand::Rng;

use crate::error::{Error, Result};

const NONCE_LEN: usize = 12;

type Aes192Gcm = AesGcm<Aes192, U12>;

#[derive(Clone)]
enum Inner {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

/// Encrypts provider access tokens before they are stored on the user row.
/// The AES variant follows the key length (16, 24 or 32 bytes).
#[derive(Clone)]
pub struct ProviderTokenCipher {
    inner: Inner,
}

impl ProviderTokenCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        let invalid = |_| Error::Config(format!("invalid AES key length {}", key.len()));
        let inner = match key.len() {
            16 => Inner::Aes128(Aes128Gcm::new_from_slice(key).map_err(invalid)?),
            24 => Inner::Aes192(Aes192Gcm::new_from_slice(key).map_err(invalid)?),
            32 => Inner::Aes256(Aes256Gcm::new_from_slice(key).map_err(invalid)?),
            len => {
                return Err(Error::Config(format!(
                    "provider token key must be 16, 24 or 32 bytes, got {len}"
                )));
            }
        };
        Ok(Self { inner })
    }

    /// Returns `base64url(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce);

        let sealed = match &self.inner {
            Inner::Aes128(c) => seal(c, &nonce, plaintext.as_bytes()),
            Inner::Aes192(c) => seal(c, &nonce, plaintext.as_bytes()),
            Inner::Aes256(c) => seal(c, &nonce, plaintext.as_bytes()),
        }?;

        let mut raw = Vec::with_capacity(NONCE_LEN + sealed.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&sealed);
        Ok(URL_SAFE.encode(raw))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<String> {
        let raw = URL_SAFE
            .decode(sealed)
            .map_err(|e| Error::Crypto(format!("invalid provider token encoding: {e}")))?;
        if raw.len() <= NONCE_LEN {
            return Err(Error::Crypto("provider token too short".into()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);

        let plaintext = match &self.inner {
            Inner::Aes128(c) => open(c, nonce, ciphertext),
            Inner::Aes192(c) => open(c, nonce, ciphertext),
            Inner::Aes256(c) => open(c, nonce, ciphertext),
        }?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Crypto("provider token is not valid UTF-8".into()))
    }
}

fn seal<C>(cipher: &C, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: Aead + AeadCore<NonceSize = U12>,
{
    cipher
        .encrypt(GenericArray::from_slice(nonce), plaintext)
        .map_err(|_| Error::Crypto("failed to encrypt provider token".into()))
}

fn open<C>(cipher: &C, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>
where
    C: Aead + AeadCore<NonceSize = U12>,
{
    cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Crypto("failed to decrypt provider token".into()))
}
