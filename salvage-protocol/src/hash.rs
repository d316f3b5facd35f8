use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

/// Raw digest width of a SHA-1 object name.
pub const HASH_LEN: usize = 20;

/// Hex width of a SHA-1 object name.
pub const HEX_LEN: usize = HASH_LEN * 2;

/// Content hash naming a loose object: SHA-1 over `<type> <len>\0<body>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHash([u8; HASH_LEN]);

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum HashParseError {
    #[error("invalid hash length: expected {HEX_LEN} hex chars, got {0}")]
    Length(usize),

    #[error("invalid hex in hash: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// The remote served content whose hash differs from the one requested.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("hash mismatch: expected {expected}, content hashes to {actual}")]
pub struct IntegrityError {
    pub expected: ObjectHash,
    pub actual: ObjectHash,
}

impl ObjectHash {
    pub const fn from_raw(bytes: [u8; HASH_LEN]) -> Self {
        ObjectHash(bytes)
    }

    /// Build from a 20-byte slice, e.g. a tree record. Returns `None` on a
    /// short slice.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(ObjectHash(raw))
    }

    /// Parse the 40-char hex form.
    pub fn from_hex(hex_str: &str) -> Result<Self, HashParseError> {
        if hex_str.len() != HEX_LEN {
            return Err(HashParseError::Length(hex_str.len()));
        }
        let mut raw = [0u8; HASH_LEN];
        hex::decode_to_slice(hex_str, &mut raw)?;
        Ok(ObjectHash(raw))
    }

    /// Hash an already-framed object (header + body).
    pub fn of_object(inflated: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(inflated);
        ObjectHash(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Loose-object path fragment: `xx/yyyy...`, shared by the remote URL
    /// layout and the local store.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }

    /// Abbreviated form for display.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHash({})", self.to_hex())
    }
}

impl FromStr for ObjectHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectHash::from_hex(s.trim())
    }
}

/// Recompute the hash of `inflated` and compare with `expected`.
#[inline]
pub fn verify(expected: &ObjectHash, inflated: &[u8]) -> bool {
    &ObjectHash::of_object(inflated) == expected
}

/// Error-returning form of [`verify`].
pub fn check(expected: &ObjectHash, inflated: &[u8]) -> Result<(), IntegrityError> {
    let actual = ObjectHash::of_object(inflated);
    if &actual == expected {
        Ok(())
    } else {
        Err(IntegrityError {
            expected: *expected,
            actual,
        })
    }
}
