//! Loose-object primitives shared by the recovery engine: content hashes,
//! the object codec and the on-disk store.

pub mod hash;
pub mod object;
pub mod storage;

pub use hash::{IntegrityError, ObjectHash};
pub use object::{DecodeError, DecodedObject, EntryMode, ObjectKind, TreeEntry};
pub use storage::{LooseObjectStore, WriteResult};
