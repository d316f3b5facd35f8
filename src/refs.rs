// Start point resolution: HEAD -> ref -> commit hash.
//
// HEAD is either `ref: refs/heads/<name>` or a bare hash (detached). A ref
// that is not present as a loose file is looked up in packed-refs.

use anyhow::{bail, Context, Result};
use salvage_protocol::ObjectHash;
use tracing::debug;

use crate::remote::{RemoteError, RemoteSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartPoint {
    /// Ref the hash came from, `None` for a detached HEAD or an explicit hash.
    pub ref_name: Option<String>,
    pub hash: ObjectHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadTarget {
    Symbolic(String),
    Detached(ObjectHash),
}

/// Parse the contents of a HEAD file.
pub fn parse_head(content: &str) -> Result<HeadTarget> {
    let content = content.trim();
    if let Some(name) = content.strip_prefix("ref:") {
        let name = name.trim();
        validate_ref_name(name)?;
        return Ok(HeadTarget::Symbolic(name.to_string()));
    }
    let hash = content
        .parse()
        .with_context(|| format!("HEAD is neither a ref nor a hash: {:?}", content))?;
    Ok(HeadTarget::Detached(hash))
}

/// Refs are fetched as paths under the remote root, so only plain names
/// below `refs/` are accepted.
pub fn validate_ref_name(name: &str) -> Result<()> {
    if !name.starts_with("refs/") {
        bail!("ref {:?} is not under refs/", name);
    }
    if name
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        bail!("ref {:?} has an invalid path component", name);
    }
    Ok(())
}

/// Find `name` in a packed-refs file. Comment lines and peeled (`^`) lines
/// are skipped.
pub fn find_packed_ref(packed: &str, name: &str) -> Option<ObjectHash> {
    packed
        .lines()
        .filter(|line| !line.starts_with('#') && !line.starts_with('^'))
        .filter_map(|line| line.split_once(' '))
        .find(|(_, ref_name)| ref_name.trim() == name)
        .and_then(|(hash, _)| hash.parse().ok())
}

async fn fetch_text<R: RemoteSource + ?Sized>(
    remote: &R,
    path: &str,
) -> Result<String, RemoteError> {
    let bytes = remote.fetch_path(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Resolve a ref name to a hash via its loose file, then packed-refs.
pub async fn resolve_ref<R: RemoteSource + ?Sized>(remote: &R, name: &str) -> Result<ObjectHash> {
    validate_ref_name(name)?;

    match fetch_text(remote, name).await {
        Ok(text) => {
            return text
                .parse()
                .with_context(|| format!("{} does not contain a hash", name));
        }
        Err(RemoteError::NotFound(_)) => {
            debug!(ref_name = name, "loose ref missing, trying packed-refs");
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to fetch {}", name)),
    }

    let packed = fetch_text(remote, "packed-refs")
        .await
        .with_context(|| format!("{} is neither a loose nor a packed ref", name))?;
    find_packed_ref(&packed, name)
        .with_context(|| format!("{} not found in packed-refs", name))
}

/// Work out where recovery starts.
///
/// `requested` may be a 40-char hash, a full ref name, or `None` for HEAD.
pub async fn resolve_start<R: RemoteSource + ?Sized>(
    remote: &R,
    requested: Option<&str>,
) -> Result<StartPoint> {
    let ref_name = match requested {
        Some(name) => match name.parse::<ObjectHash>() {
            Ok(hash) => {
                return Ok(StartPoint {
                    ref_name: None,
                    hash,
                })
            }
            Err(_) => name.to_string(),
        },
        None => {
            let head = fetch_text(remote, "HEAD")
                .await
                .context("Failed to fetch HEAD")?;
            match parse_head(&head)? {
                HeadTarget::Detached(hash) => {
                    return Ok(StartPoint {
                        ref_name: None,
                        hash,
                    })
                }
                HeadTarget::Symbolic(name) => name,
            }
        }
    };

    let hash = resolve_ref(remote, &ref_name).await?;
    Ok(StartPoint {
        ref_name: Some(ref_name),
        hash,
    })
}
