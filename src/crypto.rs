use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::KdfParams;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const MAGIC: &[u8; 4] = b"CYIN";
const FORMAT_VERSION: u8 = 2;
/// Argon2 memory KiB, iterations, parallelism as little-endian u32s.
const PARAMS_LEN: usize = 12;
const PARAMS_OFFSET: usize = MAGIC.len() + 1;
const SALT_OFFSET: usize = PARAMS_OFFSET + PARAMS_LEN;
/// magic || version || params || salt. Authenticated as associated data.
const HEADER_LEN: usize = SALT_OFFSET + SALT_LEN;

// Upper bounds on header params, checked before any key derivation.
const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed: wrong passphrase or corrupted data")]
    Decryption,
    #[error("invalid data format")]
    InvalidFormat,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),
}

/// A passphrase-derived AES-256 key bound to its salt and KDF params.
///
/// The key is derived once per store and reused for every write, so the
/// Argon2 cost is paid on open only. Key bytes are wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SealingKey {
    key: [u8; KEY_LEN],
    #[zeroize(skip)]
    salt: [u8; SALT_LEN],
    #[zeroize(skip)]
    params: KdfParams,
}

impl SealingKey {
    /// Derive a key under a fresh random salt.
    pub fn generate(passphrase: &str, params: &KdfParams) -> Result<Self, CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::derive(passphrase, salt, *params)
    }

    /// Derive the key that `sealed` was written with, using the salt and
    /// KDF params recorded in its header.
    pub fn for_sealed(passphrase: &str, sealed: &[u8]) -> Result<Self, CryptoError> {
        let (salt, params) = parse_header(sealed)?;
        Self::derive(passphrase, salt, params)
    }

    /// KDF params this key was derived with.
    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    fn derive(
        passphrase: &str,
        salt: [u8; SALT_LEN],
        params: KdfParams,
    ) -> Result<Self, CryptoError> {
        let argon_params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|_| CryptoError::KeyDerivation)?;
        let argon2 = Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            argon_params,
        );

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;
        Ok(Self { key, salt, params })
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[..MAGIC.len()].copy_from_slice(MAGIC);
        header[MAGIC.len()] = FORMAT_VERSION;
        let fields = [
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
        ];
        for (i, value) in fields.iter().enumerate() {
            let at = PARAMS_OFFSET + i * 4;
            header[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        header[SALT_OFFSET..].copy_from_slice(&self.salt);
        header
    }

    /// Output: magic || version || params || salt || nonce || ciphertext
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| CryptoError::Encryption)?;
        let header = self.header();
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: &header,
                },
            )
            .map_err(|_| CryptoError::Encryption)?;

        let mut output = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&header);
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    /// Reverse of [`SealingKey::seal`]. Fails if the data was sealed under a
    /// different key or has been modified.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        parse_header(sealed)?;
        let header = &sealed[..HEADER_LEN];
        if header != self.header() {
            return Err(CryptoError::Decryption);
        }
        let nonce_bytes = &sealed[HEADER_LEN..HEADER_LEN + NONCE_LEN];
        let ciphertext = &sealed[HEADER_LEN + NONCE_LEN..];

        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| CryptoError::Decryption)?;
        cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| CryptoError::Decryption)
    }
}

fn read_u32(sealed: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&sealed[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn parse_header(sealed: &[u8]) -> Result<([u8; SALT_LEN], KdfParams), CryptoError> {
    if sealed.len() < MAGIC.len() + 1 || &sealed[..MAGIC.len()] != MAGIC {
        return Err(CryptoError::InvalidFormat);
    }
    let version = sealed[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(CryptoError::UnsupportedVersion(version));
    }
    if sealed.len() < HEADER_LEN + NONCE_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let params = KdfParams {
        memory_kib: read_u32(sealed, PARAMS_OFFSET),
        iterations: read_u32(sealed, PARAMS_OFFSET + 4),
        parallelism: read_u32(sealed, PARAMS_OFFSET + 8),
    };
    if params.memory_kib > MAX_MEMORY_KIB
        || params.iterations == 0
        || params.iterations > MAX_ITERATIONS
        || params.parallelism == 0
        || params.parallelism > MAX_PARALLELISM
    {
        return Err(CryptoError::InvalidFormat);
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&sealed[SALT_OFFSET..HEADER_LEN]);
    Ok((salt, params))
}
