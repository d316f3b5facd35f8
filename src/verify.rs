use anyhow::Result;
use rayon::prelude::*;
use salvage_protocol::hash::{self, IntegrityError};
use salvage_protocol::object::{self, DecodeError, DecodedObject};
use salvage_protocol::{LooseObjectStore, ObjectHash};

use crate::report::FailureKind;

/// Why a compressed object is unusable.
#[derive(thiserror::Error, Debug)]
pub enum ObjectFault {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

impl ObjectFault {
    pub fn kind(&self) -> FailureKind {
        match self {
            ObjectFault::Decode(_) => FailureKind::Decode,
            ObjectFault::Integrity(_) => FailureKind::Integrity,
        }
    }
}

/// Inflate, parse and check a compressed object against the hash it was
/// requested under. Nothing may be stored unless this succeeds.
pub fn decode_verified(expected: &ObjectHash, raw: &[u8]) -> Result<DecodedObject, ObjectFault> {
    decode_verified_limited(expected, raw, object::DEFAULT_MAX_OBJECT_SIZE)
}

/// [`decode_verified`] with an explicit ceiling on the declared body size.
pub fn decode_verified_limited(
    expected: &ObjectHash,
    raw: &[u8],
    max_object_size: u64,
) -> Result<DecodedObject, ObjectFault> {
    let inflated = object::inflate_limited(raw, max_object_size)?;
    let decoded = object::parse(&inflated)?;
    hash::check(expected, &inflated)?;
    Ok(decoded)
}

#[derive(Debug)]
pub struct StoreCheck {
    pub checked: usize,
    pub corrupt: Vec<(ObjectHash, String)>,
}

impl StoreCheck {
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty()
    }
}

/// Check every object in `store` in parallel.
pub fn verify_store(store: &LooseObjectStore) -> Result<StoreCheck> {
    let hashes = store.list()?;

    let mut corrupt: Vec<(ObjectHash, String)> = hashes
        .par_iter()
        .filter_map(|hash| {
            let outcome = store
                .read(hash)
                .map_err(|e| format!("{e:#}"))
                .and_then(|raw| decode_verified(hash, &raw).map_err(|e| e.to_string()));
            outcome.err().map(|reason| (*hash, reason))
        })
        .collect();
    corrupt.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(StoreCheck {
        checked: hashes.len(),
        corrupt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use salvage_protocol::object::{encode, ObjectKind};
    use tempfile::TempDir;

    #[test]
    fn test_decode_verified_accepts_matching_content() -> Result<()> {
        let (hash, raw) = encode(ObjectKind::Blob, b"good")?;
        assert_eq!(decode_verified(&hash, &raw)?, DecodedObject::Blob { size: 4 });
        Ok(())
    }

    #[test]
    fn test_decode_verified_rejects_mismatch() -> Result<()> {
        let (requested, _) = encode(ObjectKind::Blob, b"good")?;
        let (_, served) = encode(ObjectKind::Blob, b"evil")?;

        let fault = decode_verified(&requested, &served).unwrap_err();
        assert_eq!(fault.kind(), FailureKind::Integrity);
        Ok(())
    }

    #[test]
    fn test_decode_verified_reports_decode_before_integrity() -> Result<()> {
        let (requested, _) = encode(ObjectKind::Blob, b"good")?;
        let fault = decode_verified(&requested, b"not zlib at all").unwrap_err();
        assert_eq!(fault.kind(), FailureKind::Decode);
        Ok(())
    }

    #[test]
    fn test_verify_store_finds_corrupt_objects() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = LooseObjectStore::new(temp_dir.path());

        let (good, good_raw) = encode(ObjectKind::Blob, b"fine")?;
        let (bad, _) = encode(ObjectKind::Blob, b"expected")?;
        let (_, wrong_raw) = encode(ObjectKind::Blob, b"something else")?;
        store.put(&good, &good_raw)?;
        store.put(&bad, &wrong_raw)?;

        let check = verify_store(&store)?;
        assert_eq!(check.checked, 2);
        assert_eq!(check.corrupt.len(), 1);
        assert_eq!(check.corrupt[0].0, bad);
        assert!(!check.is_clean());
        Ok(())
    }
}
