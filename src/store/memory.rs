use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::model::{AvailabilityPatch, Lodge, LodgeId};
use crate::repository::{LodgeRepository, RepoError};

use super::{StoredLodge, in_insertion_order, prepare_new};

/// Process-local lodge store. Nothing survives a restart.
pub struct InMemoryLodgeRepository {
    lodges: DashMap<LodgeId, StoredLodge>,
    next_seq: AtomicU64,
}

impl Default for InMemoryLodgeRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLodgeRepository {
    pub fn new() -> Self {
        Self {
            lodges: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn with_lodges(lodges: impl IntoIterator<Item = Lodge>) -> Result<Self, RepoError> {
        let repo = Self::new();
        for lodge in lodges {
            repo.insert(lodge)?;
        }
        Ok(repo)
    }

    pub fn len(&self) -> usize {
        self.lodges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lodges.is_empty()
    }

    /// Add a lodge, assigning an id if it has none. Returns the stored record.
    pub fn insert(&self, lodge: Lodge) -> Result<Lodge, RepoError> {
        let lodge = prepare_new(lodge)?;
        match self.lodges.entry(lodge.id.clone()) {
            Entry::Occupied(_) => Err(RepoError::AlreadyExists(lodge.id)),
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(StoredLodge {
                    seq,
                    lodge: lodge.clone(),
                });
                Ok(lodge)
            }
        }
    }

    pub fn delete(&self, id: &LodgeId) -> Result<Lodge, RepoError> {
        self.lodges
            .remove(id)
            .map(|(_, stored)| stored.lodge)
            .ok_or_else(|| RepoError::NotFound(id.clone()))
    }
}

#[async_trait]
impl LodgeRepository for InMemoryLodgeRepository {
    async fn get(&self, id: &LodgeId) -> Result<Lodge, RepoError> {
        self.lodges
            .get(id)
            .map(|e| e.lodge.clone())
            .ok_or_else(|| RepoError::NotFound(id.clone()))
    }

    async fn update(&self, id: &LodgeId, patch: AvailabilityPatch) -> Result<Lodge, RepoError> {
        let mut entry = self
            .lodges
            .get_mut(id)
            .ok_or_else(|| RepoError::NotFound(id.clone()))?;
        entry.lodge.apply_patch(&patch);
        Ok(entry.lodge.clone())
    }

    async fn list(&self) -> Result<Vec<Lodge>, RepoError> {
        Ok(in_insertion_order(
            self.lodges.iter().map(|e| e.value().clone()).collect(),
        ))
    }
}
