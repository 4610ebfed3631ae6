//! DES and Triple-DES encryption helpers.
//!
//! Stateless wrappers over the `des` block ciphers driven through the
//! `ecb` and `cbc` block modes, with PKCS#5 or zero-byte padding. In CBC
//! mode the first block of the key doubles as the IV.

mod padding;

use cbc::cipher::block_padding::{Pkcs7, ZeroPadding};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, InvalidLength, KeyInit, KeyIvInit};
use des::{Des, TdesEde3};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use padding::Padding;

/// Block size shared by DES and Triple-DES.
pub const BLOCK_SIZE: usize = 8;

/// Errors returned by the cipher helpers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("invalid key length {actual} for {algorithm}, expected {expected}")]
    InvalidKeyLength {
        algorithm: Algorithm,
        expected: usize,
        actual: usize,
    },
    #[error("input length {0} is not a multiple of the block size")]
    NotFullBlocks(usize),
    #[error("invalid padding")]
    InvalidPadding,
    #[error("unknown padding: {0}")]
    UnknownPadding(String),
    #[error("unknown block mode: {0}")]
    UnknownMode(String),
}

/// Which DES variant to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Single DES, 8-byte key
    Des,
    /// Triple-DES in EDE mode with three independent keys, 24-byte key
    TripleDes,
}

impl Algorithm {
    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            Algorithm::Des => 8,
            Algorithm::TripleDes => 24,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Des => write!(f, "DES"),
            Algorithm::TripleDes => write!(f, "3DES"),
        }
    }
}

/// Block chaining mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Electronic codebook: every block on its own
    Ecb,
    /// Cipher block chaining
    Cbc,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Ecb => write!(f, "ecb"),
            Mode::Cbc => write!(f, "cbc"),
        }
    }
}

impl FromStr for Mode {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecb" => Ok(Mode::Ecb),
            "cbc" => Ok(Mode::Cbc),
            _ => Err(CipherError::UnknownMode(s.to_string())),
        }
    }
}

fn check_key(algorithm: Algorithm, key: &[u8]) -> Result<(), CipherError> {
    if key.len() != algorithm.key_len() {
        return Err(CipherError::InvalidKeyLength {
            algorithm,
            expected: algorithm.key_len(),
            actual: key.len(),
        });
    }
    Ok(())
}

/// Encrypt `plaintext` with `key`.
///
/// Zero padding leaves block-aligned input as is; PKCS#5 always adds at
/// least one pad byte.
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8],
    algorithm: Algorithm,
    mode: Mode,
    padding: Padding,
) -> Result<Vec<u8>, CipherError> {
    check_key(algorithm, key)?;
    let invalid = |_: InvalidLength| CipherError::InvalidKeyLength {
        algorithm,
        expected: algorithm.key_len(),
        actual: key.len(),
    };
    let iv = &key[..BLOCK_SIZE];

    let ciphertext = match (algorithm, mode) {
        (Algorithm::Des, Mode::Ecb) => {
            encrypt_padded(ecb::Encryptor::<Des>::new_from_slice(key).map_err(invalid)?, plaintext, padding)
        }
        (Algorithm::Des, Mode::Cbc) => {
            encrypt_padded(cbc::Encryptor::<Des>::new_from_slices(key, iv).map_err(invalid)?, plaintext, padding)
        }
        (Algorithm::TripleDes, Mode::Ecb) => {
            encrypt_padded(ecb::Encryptor::<TdesEde3>::new_from_slice(key).map_err(invalid)?, plaintext, padding)
        }
        (Algorithm::TripleDes, Mode::Cbc) => encrypt_padded(
            cbc::Encryptor::<TdesEde3>::new_from_slices(key, iv).map_err(invalid)?,
            plaintext,
            padding,
        ),
    };
    Ok(ciphertext)
}

/// Decrypt `ciphertext` with `key`.
///
/// Fails if the ciphertext is not made of whole blocks or its padding does
/// not check out.
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8],
    algorithm: Algorithm,
    mode: Mode,
    padding: Padding,
) -> Result<Vec<u8>, CipherError> {
    check_key(algorithm, key)?;
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::NotFullBlocks(ciphertext.len()));
    }
    let invalid = |_: InvalidLength| CipherError::InvalidKeyLength {
        algorithm,
        expected: algorithm.key_len(),
        actual: key.len(),
    };
    let iv = &key[..BLOCK_SIZE];

    match (algorithm, mode) {
        (Algorithm::Des, Mode::Ecb) => {
            decrypt_padded(ecb::Decryptor::<Des>::new_from_slice(key).map_err(invalid)?, ciphertext, padding)
        }
        (Algorithm::Des, Mode::Cbc) => {
            decrypt_padded(cbc::Decryptor::<Des>::new_from_slices(key, iv).map_err(invalid)?, ciphertext, padding)
        }
        (Algorithm::TripleDes, Mode::Ecb) => {
            decrypt_padded(ecb::Decryptor::<TdesEde3>::new_from_slice(key).map_err(invalid)?, ciphertext, padding)
        }
        (Algorithm::TripleDes, Mode::Cbc) => decrypt_padded(
            cbc::Decryptor::<TdesEde3>::new_from_slices(key, iv).map_err(invalid)?,
            ciphertext,
            padding,
        ),
    }
}

fn encrypt_padded<C: BlockEncryptMut>(cipher: C, plaintext: &[u8], padding: Padding) -> Vec<u8> {
    match padding {
        Padding::Pkcs5 => cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        Padding::Zero => cipher.encrypt_padded_vec_mut::<ZeroPadding>(plaintext),
    }
}

fn decrypt_padded<C: BlockDecryptMut>(cipher: C, ciphertext: &[u8], padding: Padding) -> Result<Vec<u8>, CipherError> {
    let plaintext = match padding {
        Padding::Pkcs5 => cipher.decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        Padding::Zero => cipher.decrypt_padded_vec_mut::<ZeroPadding>(ciphertext),
    };
    plaintext.map_err(|_| CipherError::InvalidPadding)
}

/// Single-DES encryption.
pub fn des_encrypt(plaintext: &[u8], key: &[u8], mode: Mode, padding: Padding) -> Result<Vec<u8>, CipherError> {
    encrypt(plaintext, key, Algorithm::Des, mode, padding)
}

/// Single-DES decryption.
pub fn des_decrypt(ciphertext: &[u8], key: &[u8], mode: Mode, padding: Padding) -> Result<Vec<u8>, CipherError> {
    decrypt(ciphertext, key, Algorithm::Des, mode, padding)
}

/// Triple-DES encryption.
pub fn triple_des_encrypt(plaintext: &[u8], key: &[u8], mode: Mode, padding: Padding) -> Result<Vec<u8>, CipherError> {
    encrypt(plaintext, key, Algorithm::TripleDes, mode, padding)
}

/// Triple-DES decryption.
pub fn triple_des_decrypt(ciphertext: &[u8], key: &[u8], mode: Mode, padding: Padding) -> Result<Vec<u8>, CipherError> {
    decrypt(ciphertext, key, Algorithm::TripleDes, mode, padding)
}
