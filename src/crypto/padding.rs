//! Block padding schemes, selected by name.

use std::fmt;
use std::str::FromStr;

use super::CipherError;

/// How plaintext is padded to a whole number of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Padding {
    /// Each pad byte holds the pad length (1..=block size)
    Pkcs5,
    /// Pad with zero bytes; trailing zeros of the last block are stripped
    /// on decrypt
    Zero,
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Padding::Pkcs5 => write!(f, "pkcs5"),
            Padding::Zero => write!(f, "zero"),
        }
    }
}

impl FromStr for Padding {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pkcs5" | "pkcs7" => Ok(Padding::Pkcs5),
            "zero" | "zeros" => Ok(Padding::Zero),
            _ => Err(CipherError::UnknownPadding(s.to_string())),
        }
    }
}
