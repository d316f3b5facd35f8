mod common;

use anyhow::Result;
use common::MemoryRemote;
use salvage::refs::{resolve_ref, resolve_start, StartPoint};
use salvage_protocol::ObjectHash;

const MAIN: &str = "3f786850e387550fdab836ed7e6dc881de23001b";
const DEV: &str = "89e6c98d92887913cadf06b2adb97f26cde4849b";

fn hash(hex: &str) -> ObjectHash {
    hex.parse().unwrap()
}

#[tokio::test]
async fn test_head_to_loose_ref() -> Result<()> {
    let remote = MemoryRemote::new();
    remote.insert_file("HEAD", "ref: refs/heads/main\n");
    remote.insert_file("refs/heads/main", format!("{MAIN}\n"));

    assert_eq!(
        resolve_start(&remote, None).await?,
        StartPoint {
            ref_name: Some("refs/heads/main".into()),
            hash: hash(MAIN),
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_head_to_packed_ref() -> Result<()> {
    let remote = MemoryRemote::new();
    remote.insert_file("HEAD", "ref: refs/heads/main\n");
    remote.insert_file(
        "packed-refs",
        format!(
            "# pack-refs with: peeled fully-peeled sorted\n\
             {DEV} refs/heads/dev\n\
             {MAIN} refs/heads/main\n"
        ),
    );

    let start = resolve_start(&remote, None).await?;
    assert_eq!(start.hash, hash(MAIN));
    assert_eq!(start.ref_name.as_deref(), Some("refs/heads/main"));
    Ok(())
}

#[tokio::test]
async fn test_loose_ref_wins_over_packed() -> Result<()> {
    let remote = MemoryRemote::new();
    remote.insert_file("refs/heads/main", format!("{DEV}\n"));
    remote.insert_file("packed-refs", format!("{MAIN} refs/heads/main\n"));

    assert_eq!(resolve_ref(&remote, "refs/heads/main").await?, hash(DEV));
    Ok(())
}

#[tokio::test]
async fn test_detached_head() -> Result<()> {
    let remote = MemoryRemote::new();
    remote.insert_file("HEAD", format!("{MAIN}\n"));

    assert_eq!(
        resolve_start(&remote, None).await?,
        StartPoint {
            ref_name: None,
            hash: hash(MAIN),
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_explicit_hash_skips_head() -> Result<()> {
    let remote = MemoryRemote::new();

    let start = resolve_start(&remote, Some(DEV)).await?;
    assert_eq!(start.hash, hash(DEV));
    assert_eq!(start.ref_name, None);
    Ok(())
}

#[tokio::test]
async fn test_explicit_ref() -> Result<()> {
    let remote = MemoryRemote::new();
    remote.insert_file("HEAD", "ref: refs/heads/main\n");
    remote.insert_file("refs/heads/main", format!("{MAIN}\n"));
    remote.insert_file("refs/heads/dev", format!("{DEV}\n"));

    let start = resolve_start(&remote, Some("refs/heads/dev")).await?;
    assert_eq!(start.hash, hash(DEV));
    assert_eq!(start.ref_name.as_deref(), Some("refs/heads/dev"));
    Ok(())
}

#[tokio::test]
async fn test_unknown_ref_is_error() {
    let remote = MemoryRemote::new();
    remote.insert_file("packed-refs", format!("{MAIN} refs/heads/main\n"));

    assert!(resolve_start(&remote, Some("refs/heads/gone")).await.is_err());
    assert!(resolve_start(&remote, Some("../config")).await.is_err());
}

#[tokio::test]
async fn test_missing_head_is_error() {
    let remote = MemoryRemote::new();
    assert!(resolve_start(&remote, None).await.is_err());
}

#[tokio::test]
async fn test_ref_with_garbage_content_is_error() {
    let remote = MemoryRemote::new();
    remote.insert_file("HEAD", "ref: refs/heads/main\n");
    remote.insert_file("refs/heads/main", "<html>Not Found</html>");

    assert!(resolve_start(&remote, None).await.is_err());
}
