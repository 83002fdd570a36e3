//! Repository adapters that ship with the crate.

mod durable;
mod memory;

pub use durable::WalLodgeRepository;
pub use memory::InMemoryLodgeRepository;

use crate::limits::MAX_NAME_LEN;
use crate::model::{Lodge, LodgeId};
use crate::repository::RepoError;

/// A lodge plus its insertion sequence number, which fixes `list()` order.
#[derive(Debug, Clone)]
pub(crate) struct StoredLodge {
    pub seq: u64,
    pub lodge: Lodge,
}

/// Checks shared by both stores before a lodge is created. Assigns an id when
/// the record has none.
pub(crate) fn prepare_new(mut lodge: Lodge) -> Result<Lodge, RepoError> {
    if lodge.id.is_empty() {
        lodge.id = LodgeId::generate();
    }
    if lodge.name.len() > MAX_NAME_LEN {
        return Err(RepoError::Rejected("lodge name too long".into()));
    }
    Ok(lodge)
}

pub(crate) fn in_insertion_order(mut stored: Vec<StoredLodge>) -> Vec<Lodge> {
    stored.sort_by_key(|s| s.seq);
    stored.into_iter().map(|s| s.lodge).collect()
}
