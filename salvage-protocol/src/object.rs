// Loose object codec.
//
// On the wire and on disk a loose object is zlib(`<type> <len>\0<body>`).
// Decoding goes only as deep as traversal needs: the tree and parents of a
// commit, the entries of a tree, the target of a tag. Blobs stay opaque.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fmt;
use std::io::{self, Read, Write};

use crate::hash::{HashParseError, ObjectHash, HASH_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Tag => "tag",
        }
    }

    pub fn parse(name: &[u8]) -> Option<Self> {
        match name {
            b"commit" => Some(ObjectKind::Commit),
            b"tree" => Some(ObjectKind::Tree),
            b"blob" => Some(ObjectKind::Blob),
            b"tag" => Some(ObjectKind::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("zlib inflate failed: {0}")]
    Inflate(#[from] io::Error),

    #[error("malformed object header: {0}")]
    MalformedHeader(&'static str),

    #[error("unknown object type {0:?}")]
    UnknownType(String),

    #[error("truncated body: header declares {declared} bytes, found {actual}")]
    Truncated { declared: usize, actual: usize },

    #[error("trailing data: header declares {declared} bytes, found {actual}")]
    TrailingData { declared: usize, actual: usize },

    #[error("object too large: header declares {declared} bytes, limit is {limit}")]
    TooLarge { declared: u64, limit: u64 },

    #[error("malformed commit: {0}")]
    MalformedCommit(&'static str),

    #[error("malformed tag: {0}")]
    MalformedTag(&'static str),

    #[error("invalid {field} hash: {source}")]
    InvalidHash {
        field: &'static str,
        #[source]
        source: HashParseError,
    },

    #[error("truncated tree entry at byte {offset}")]
    TruncatedEntry { offset: usize },

    #[error("invalid tree entry mode {mode:?} at byte {offset}")]
    InvalidMode { offset: usize, mode: String },

    #[error("unsupported tree entry mode {mode:o} at byte {offset}")]
    UnknownMode { offset: usize, mode: u32 },
}

/// What a tree entry points at, derived from its octal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// `040000`
    Tree,
    /// `100644` and other non-executable regular files
    Blob,
    /// `100755`
    Executable,
    /// `120000`
    Symlink,
    /// `160000`, a commit in another repository. Never fetched.
    Gitlink,
}

impl EntryMode {
    const TYPE_MASK: u32 = 0o170000;

    pub fn from_octal(mode: u32) -> Option<Self> {
        match mode & Self::TYPE_MASK {
            0o040000 => Some(EntryMode::Tree),
            0o100000 if mode & 0o111 != 0 => Some(EntryMode::Executable),
            0o100000 => Some(EntryMode::Blob),
            0o120000 => Some(EntryMode::Symlink),
            0o160000 => Some(EntryMode::Gitlink),
            _ => None,
        }
    }

    /// Canonical mode bits written by git.
    pub fn to_octal(&self) -> u32 {
        match self {
            EntryMode::Tree => 0o040000,
            EntryMode::Blob => 0o100644,
            EntryMode::Executable => 0o100755,
            EntryMode::Symlink => 0o120000,
            EntryMode::Gitlink => 0o160000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub hash: ObjectHash,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, mode: EntryMode, hash: ObjectHash) -> Self {
        Self {
            name: name.into(),
            mode,
            hash,
        }
    }

    /// Serialize as a tree record: `<mode> <name>\0<20 bytes>`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.name.len() + 28);
        // git writes trees as "40000", without the leading zero
        bytes.extend_from_slice(format!("{:o}", self.mode.to_octal()).as_bytes());
        bytes.push(b' ');
        bytes.extend_from_slice(self.name.as_bytes());
        bytes.push(b'\0');
        bytes.extend_from_slice(self.hash.as_bytes());
        bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectHash,
    pub parents: Vec<ObjectHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Entries naming a commit in another repository.
    pub fn gitlinks(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|e| e.mode == EntryMode::Gitlink)
    }

    /// Concatenated records in their current order.
    pub fn to_body(&self) -> Vec<u8> {
        self.entries.iter().flat_map(|e| e.to_bytes()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub target: ObjectHash,
    pub target_kind: Option<ObjectKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedObject {
    Commit(Commit),
    Tree(Tree),
    Blob { size: usize },
    Tag(Tag),
}

impl DecodedObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            DecodedObject::Commit(_) => ObjectKind::Commit,
            DecodedObject::Tree(_) => ObjectKind::Tree,
            DecodedObject::Blob { .. } => ObjectKind::Blob,
            DecodedObject::Tag(_) => ObjectKind::Tag,
        }
    }

    /// Hashes in this repository's object space that this object points at.
    /// Gitlink entries are excluded.
    pub fn references(&self) -> Vec<ObjectHash> {
        match self {
            DecodedObject::Commit(commit) => {
                let mut refs = Vec::with_capacity(commit.parents.len() + 1);
                refs.push(commit.tree);
                refs.extend_from_slice(&commit.parents);
                refs
            }
            DecodedObject::Tree(tree) => tree
                .entries
                .iter()
                .filter(|e| e.mode != EntryMode::Gitlink)
                .map(|e| e.hash)
                .collect(),
            DecodedObject::Blob { .. } => Vec::new(),
            DecodedObject::Tag(tag) => vec![tag.target],
        }
    }
}

/// Default ceiling on the declared body size of a single object.
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 512 * 1024 * 1024;

/// `"commit "` plus a 20-digit length plus NUL fits comfortably.
const MAX_HEADER_LEN: usize = 32;

/// Inflate a raw loose object, with the default size ceiling.
pub fn inflate(raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
    inflate_limited(raw, DEFAULT_MAX_OBJECT_SIZE)
}

/// Inflate a raw loose object, reading no more than the header plus the
/// body length it declares (and one extra byte, so trailing data is still
/// detected by [`split_header`]). A declared length above `max_body` is
/// rejected before the body is inflated.
pub fn inflate_limited(raw: &[u8], max_body: u64) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = ZlibDecoder::new(raw);
    let mut out = Vec::with_capacity(MAX_HEADER_LEN);

    let mut byte = [0u8; 1];
    loop {
        if decoder.read(&mut byte)? == 0 {
            // no NUL at all; split_header reports it
            return Ok(out);
        }
        out.push(byte[0]);
        if byte[0] == 0 {
            break;
        }
        if out.len() >= MAX_HEADER_LEN {
            return Err(DecodeError::MalformedHeader("header too long"));
        }
    }

    let Some(declared) = declared_len(&out[..out.len() - 1]) else {
        // malformed length; split_header reports the precise error
        return Ok(out);
    };
    if declared > max_body {
        return Err(DecodeError::TooLarge {
            declared,
            limit: max_body,
        });
    }

    decoder.take(declared + 1).read_to_end(&mut out)?;
    Ok(out)
}

fn declared_len(header: &[u8]) -> Option<u64> {
    let space = header.iter().position(|&b| b == b' ')?;
    std::str::from_utf8(&header[space + 1..]).ok()?.parse().ok()
}

/// Inflate and parse a raw loose object.
pub fn decode(raw: &[u8]) -> Result<DecodedObject, DecodeError> {
    parse(&inflate(raw)?)
}

/// Split `<type> <len>\0<body>` and check the declared length.
pub fn split_header(inflated: &[u8]) -> Result<(ObjectKind, &[u8]), DecodeError> {
    let nul = inflated
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::MalformedHeader("missing NUL"))?;
    let header = &inflated[..nul];
    let body = &inflated[nul + 1..];

    let space = header
        .iter()
        .position(|&b| b == b' ')
        .ok_or(DecodeError::MalformedHeader("missing space"))?;
    let type_name = &header[..space];
    let len_digits = &header[space + 1..];

    let kind = ObjectKind::parse(type_name)
        .ok_or_else(|| DecodeError::UnknownType(String::from_utf8_lossy(type_name).into_owned()))?;

    if len_digits.is_empty() || !len_digits.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::MalformedHeader("length is not a decimal number"));
    }
    let declared: usize = std::str::from_utf8(len_digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(DecodeError::MalformedHeader("length out of range"))?;

    if body.len() < declared {
        return Err(DecodeError::Truncated {
            declared,
            actual: body.len(),
        });
    }
    if body.len() > declared {
        return Err(DecodeError::TrailingData {
            declared,
            actual: body.len(),
        });
    }

    Ok((kind, body))
}

/// Parse an inflated object (header + body).
pub fn parse(inflated: &[u8]) -> Result<DecodedObject, DecodeError> {
    let (kind, body) = split_header(inflated)?;
    match kind {
        ObjectKind::Commit => parse_commit(body).map(DecodedObject::Commit),
        ObjectKind::Tree => parse_tree(body).map(DecodedObject::Tree),
        ObjectKind::Blob => Ok(DecodedObject::Blob { size: body.len() }),
        ObjectKind::Tag => parse_tag(body).map(DecodedObject::Tag),
    }
}

/// Header lines of a commit or tag, up to the blank line before the message.
fn header_lines(body: &[u8]) -> impl Iterator<Item = &[u8]> {
    body.split(|&b| b == b'\n').take_while(|line| !line.is_empty())
}

fn parse_hash_field(value: &[u8], field: &'static str) -> Result<ObjectHash, DecodeError> {
    let text = std::str::from_utf8(value).map_err(|_| DecodeError::InvalidHash {
        field,
        source: HashParseError::Length(value.len()),
    })?;
    ObjectHash::from_hex(text).map_err(|source| DecodeError::InvalidHash { field, source })
}

pub fn parse_commit(body: &[u8]) -> Result<Commit, DecodeError> {
    let mut tree = None;
    let mut parents = Vec::new();

    for line in header_lines(body) {
        if let Some(value) = line.strip_prefix(b"tree ") {
            if tree.is_some() {
                return Err(DecodeError::MalformedCommit("duplicate tree header"));
            }
            tree = Some(parse_hash_field(value, "tree")?);
        } else if let Some(value) = line.strip_prefix(b"parent ") {
            parents.push(parse_hash_field(value, "parent")?);
        }
        // author, committer, encoding, gpgsig and continuation lines are
        // irrelevant to traversal
    }

    let tree = tree.ok_or(DecodeError::MalformedCommit("missing tree header"))?;
    Ok(Commit { tree, parents })
}

pub fn parse_tree(body: &[u8]) -> Result<Tree, DecodeError> {
    let mut entries = Vec::new();
    let mut cursor = 0;

    while cursor < body.len() {
        let start = cursor;
        let rest = &body[cursor..];

        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or(DecodeError::TruncatedEntry { offset: start })?;
        let mode_digits = &rest[..space];
        let mode = parse_octal(mode_digits).ok_or_else(|| DecodeError::InvalidMode {
            offset: start,
            mode: String::from_utf8_lossy(mode_digits).into_owned(),
        })?;
        let mode = EntryMode::from_octal(mode)
            .ok_or(DecodeError::UnknownMode { offset: start, mode })?;

        let after_mode = &rest[space + 1..];
        let nul = after_mode
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::TruncatedEntry { offset: start })?;
        let name = String::from_utf8_lossy(&after_mode[..nul]).into_owned();

        let hash_start = cursor + space + 1 + nul + 1;
        let hash_end = hash_start + HASH_LEN;
        if hash_end > body.len() {
            return Err(DecodeError::TruncatedEntry { offset: start });
        }
        let hash = ObjectHash::from_slice(&body[hash_start..hash_end])
            .ok_or(DecodeError::TruncatedEntry { offset: start })?;

        entries.push(TreeEntry { name, mode, hash });
        cursor = hash_end;
    }

    Ok(Tree { entries })
}

fn parse_octal(digits: &[u8]) -> Option<u32> {
    if digits.is_empty() || digits.len() > 7 {
        return None;
    }
    digits.iter().try_fold(0u32, |acc, &d| match d {
        b'0'..=b'7' => Some(acc * 8 + u32::from(d - b'0')),
        _ => None,
    })
}

pub fn parse_tag(body: &[u8]) -> Result<Tag, DecodeError> {
    let mut target = None;
    let mut target_kind = None;

    for line in header_lines(body) {
        if let Some(value) = line.strip_prefix(b"object ") {
            target = Some(parse_hash_field(value, "object")?);
        } else if let Some(value) = line.strip_prefix(b"type ") {
            target_kind = ObjectKind::parse(value);
        }
    }

    let target = target.ok_or(DecodeError::MalformedTag("missing object header"))?;
    Ok(Tag {
        target,
        target_kind,
    })
}

/// Prefix `body` with its `<type> <len>\0` header.
pub fn frame(kind: ObjectKind, body: &[u8]) -> Vec<u8> {
    let header = format!("{} {}\0", kind.as_str(), body.len());
    let mut object = Vec::with_capacity(header.len() + body.len());
    object.extend_from_slice(header.as_bytes());
    object.extend_from_slice(body);
    object
}

/// Build a loose object: returns its hash and zlib-compressed framed bytes.
pub fn encode(kind: ObjectKind, body: &[u8]) -> io::Result<(ObjectHash, Vec<u8>)> {
    let framed = frame(kind, body);
    let hash = ObjectHash::of_object(&framed);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&framed)?;
    Ok((hash, encoder.finish()?))
}
