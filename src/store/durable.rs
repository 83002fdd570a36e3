use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

use crate::model::{AvailabilityPatch, Event, Lodge, LodgeId};
use crate::observability;
use crate::repository::{LodgeRepository, RepoError};
use crate::wal::Wal;

use super::{StoredLodge, in_insertion_order, prepare_new};

type SharedLodge = Arc<RwLock<StoredLodge>>;
type Ack = oneshot::Sender<io::Result<()>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append { event: Event, response: Ack },
    Compact { events: Vec<Event>, response: Ack },
    AppendsSinceCompact { response: oneshot::Sender<u64> },
}

/// Owns the log file. Appends that queue up while a flush is running are
/// written together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    tracing::debug!(path = %wal.path().display(), "lodge log writer stopped");
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, Ack)]) -> io::Result<()> {
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            // The whole batch is reported failed, so none of it may land.
            wal.discard_pending();
            return Err(e);
        }
    }
    wal.flush_sync()
}

fn respond_batch(batch: Vec<(Event, Ack)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let batch = vec![(event, response)];
            let result = flush_batch(wal, &batch);
            respond_batch(batch, &result);
        }
    }
}

/// Lodge store backed by an append-only log.
///
/// Every mutation is fsynced before it becomes visible. On open the log is
/// replayed; once `compact_threshold` appends have accumulated the log is
/// rewritten as one `LodgeCreated` per live lodge.
pub struct WalLodgeRepository {
    lodges: DashMap<LodgeId, SharedLodge>,
    next_seq: AtomicU64,
    wal_tx: mpsc::Sender<WalCommand>,
    path: PathBuf,
    compact_threshold: u64,
    /// Creations and deletions, one at a time.
    catalog: Mutex<()>,
    /// Writers hold it shared, compaction exclusively.
    compaction: RwLock<()>,
}

impl WalLodgeRepository {
    /// Replay `path` and start the log writer. Must be called inside a tokio
    /// runtime.
    pub fn open(path: &Path, compact_threshold: u64) -> io::Result<Self> {
        let replay = Wal::replay(path)?;
        if replay.discarded_tail {
            tracing::warn!(
                path = %path.display(),
                valid_len = replay.valid_len,
                "lodge log ended in a torn or corrupt entry; cutting it off"
            );
            Wal::truncate(path, replay.valid_len)?;
        }

        let mut state: HashMap<LodgeId, StoredLodge> = HashMap::new();
        let mut next_seq = 0u64;
        for event in replay.events {
            match event {
                Event::LodgeCreated { lodge } => {
                    state.insert(
                        lodge.id.clone(),
                        StoredLodge {
                            seq: next_seq,
                            lodge,
                        },
                    );
                    next_seq += 1;
                }
                Event::AvailabilityUpdated {
                    id,
                    blocked_dates,
                    booked_dates,
                } => match state.get_mut(&id) {
                    Some(stored) => stored
                        .lodge
                        .apply_patch(&AvailabilityPatch::both(blocked_dates, booked_dates)),
                    None => tracing::warn!(lodge = %id, "log updates a lodge it never created"),
                },
                Event::LodgeDeleted { id } => {
                    state.remove(&id);
                }
            }
        }
        tracing::info!(path = %path.display(), lodges = state.len(), "lodge log replayed");

        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            lodges: state
                .into_iter()
                .map(|(id, stored)| (id, Arc::new(RwLock::new(stored))))
                .collect(),
            next_seq: AtomicU64::new(next_seq),
            wal_tx,
            path: path.to_path_buf(),
            compact_threshold,
            catalog: Mutex::new(()),
            compaction: RwLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lodges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lodges.is_empty()
    }

    async fn wal_append(&self, operation: &'static str, event: Event) -> Result<(), RepoError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event,
                response: tx,
            })
            .await
            .map_err(|_| RepoError::backend(operation, "log writer shut down"))?;
        rx.await
            .map_err(|_| RepoError::backend(operation, "log writer dropped response"))?
            .map_err(|e| RepoError::backend(operation, e))
    }

    /// Add a lodge, assigning an id if it has none. Returns the stored record.
    pub async fn insert(&self, lodge: Lodge) -> Result<Lodge, RepoError> {
        let lodge = prepare_new(lodge)?;
        {
            let _catalog = self.catalog.lock().await;
            let _gate = self.compaction.read().await;
            if self.lodges.contains_key(&lodge.id) {
                return Err(RepoError::AlreadyExists(lodge.id));
            }
            self.wal_append(
                "insert",
                Event::LodgeCreated {
                    lodge: lodge.clone(),
                },
            )
            .await?;
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            self.lodges.insert(
                lodge.id.clone(),
                Arc::new(RwLock::new(StoredLodge {
                    seq,
                    lodge: lodge.clone(),
                })),
            );
        }
        self.compact_if_due().await;
        Ok(lodge)
    }

    pub async fn delete(&self, id: &LodgeId) -> Result<Lodge, RepoError> {
        let removed = {
            let _catalog = self.catalog.lock().await;
            let _gate = self.compaction.read().await;
            let entry = self
                .lodges
                .get(id)
                .map(|e| e.value().clone())
                .ok_or_else(|| RepoError::NotFound(id.clone()))?;
            // Waits out any update already holding the lodge.
            let guard = entry.write().await;
            self.wal_append("delete", Event::LodgeDeleted { id: id.clone() })
                .await?;
            self.lodges.remove(id);
            guard.lodge.clone()
        };
        self.compact_if_due().await;
        Ok(removed)
    }

    /// Rewrite the log from current state. Blocks writers while it runs.
    pub async fn compact(&self) -> Result<(), RepoError> {
        let _gate = self.compaction.write().await;
        self.compact_locked().await
    }

    async fn compact_locked(&self) -> Result<(), RepoError> {
        let entries: Vec<SharedLodge> = self.lodges.iter().map(|e| e.value().clone()).collect();
        let mut stored = Vec::with_capacity(entries.len());
        for entry in entries {
            stored.push(entry.read().await.clone());
        }
        let events: Vec<Event> = in_insertion_order(stored)
            .into_iter()
            .map(|lodge| Event::LodgeCreated { lodge })
            .collect();
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| RepoError::backend("compact", "log writer shut down"))?;
        rx.await
            .map_err(|_| RepoError::backend("compact", "log writer dropped response"))?
            .map_err(|e| RepoError::backend("compact", e))?;

        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        tracing::info!(path = %self.path.display(), lodges = count, "lodge log compacted");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Caller must not hold the compaction gate.
    async fn compact_if_due(&self) {
        if self.compact_threshold == 0 || self.appends_since_compact().await < self.compact_threshold {
            return;
        }
        let _gate = self.compaction.write().await;
        // Another writer may have compacted while we waited for the gate.
        if self.appends_since_compact().await < self.compact_threshold {
            return;
        }
        if let Err(e) = self.compact_locked().await {
            tracing::warn!(path = %self.path.display(), "lodge log compaction failed: {e}");
        }
    }
}

#[async_trait]
impl LodgeRepository for WalLodgeRepository {
    async fn get(&self, id: &LodgeId) -> Result<Lodge, RepoError> {
        let entry = self
            .lodges
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RepoError::NotFound(id.clone()))?;
        let stored = entry.read().await;
        Ok(stored.lodge.clone())
    }

    async fn update(&self, id: &LodgeId, patch: AvailabilityPatch) -> Result<Lodge, RepoError> {
        let updated = {
            let _gate = self.compaction.read().await;
            let entry = self
                .lodges
                .get(id)
                .map(|e| e.value().clone())
                .ok_or_else(|| RepoError::NotFound(id.clone()))?;
            let mut guard = entry.write().await;
            // Deleted (or deleted and recreated) while we waited for the lock.
            if !self
                .lodges
                .get(id)
                .is_some_and(|e| Arc::ptr_eq(e.value(), &entry))
            {
                return Err(RepoError::NotFound(id.clone()));
            }

            let mut next = guard.lodge.clone();
            next.apply_patch(&patch);
            self.wal_append(
                "update",
                Event::AvailabilityUpdated {
                    id: id.clone(),
                    blocked_dates: next.blocked_dates.clone(),
                    booked_dates: next.booked_dates.clone(),
                },
            )
            .await?;
            guard.lodge = next.clone();
            next
        };
        self.compact_if_due().await;
        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<Lodge>, RepoError> {
        let entries: Vec<SharedLodge> = self.lodges.iter().map(|e| e.value().clone()).collect();
        let mut stored = Vec::with_capacity(entries.len());
        for entry in entries {
            stored.push(entry.read().await.clone());
        }
        Ok(in_insertion_order(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("lodge_test_store");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn lodge(id: &str) -> Lodge {
        Lodge::new(LodgeId::from(id), format!("Lodge {id}"), "Ridge Road")
    }

    fn booked(dates: &[&str]) -> AvailabilityPatch {
        AvailabilityPatch {
            blocked_dates: None,
            booked_dates: Some(dates.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let path = tmp_path("reopen.wal");
        {
            let repo = WalLodgeRepository::open(&path, 0).unwrap();
            repo.insert(lodge("b")).await.unwrap();
            repo.insert(lodge("a")).await.unwrap();
            repo.update(&LodgeId::from("a"), booked(&["2024-03-02"]))
                .await
                .unwrap();
        }

        let repo = WalLodgeRepository::open(&path, 0).unwrap();
        let lodges = repo.list().await.unwrap();
        let ids: Vec<&str> = lodges.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(lodges[1].booked_dates, vec!["2024-03-02"]);

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn writes_after_torn_tail_survive() {
        let path = tmp_path("torn_tail.wal");
        {
            let repo = WalLodgeRepository::open(&path, 0).unwrap();
            repo.insert(lodge("a")).await.unwrap();
        }
        {
            use std::io::Write;
            let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[40u8, 0, 0, 0, 9, 9, 9]).unwrap();
        }
        {
            let repo = WalLodgeRepository::open(&path, 0).unwrap();
            assert_eq!(repo.len(), 1);
            repo.insert(lodge("b")).await.unwrap();
        }

        let repo = WalLodgeRepository::open(&path, 0).unwrap();
        let ids: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(!Wal::replay(&path).unwrap().discarded_tail);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn failed_batch_leaves_nothing_behind() {
        let path = tmp_path("failed_batch.wal");
        let kept = Event::LodgeCreated { lodge: lodge("a") };
        let batch: Vec<(Event, Ack)> = ["b", "c"]
            .into_iter()
            .map(|id| (Event::LodgeCreated { lodge: lodge(id) }, oneshot::channel().0))
            .collect();

        {
            let mut wal = Wal::open(&path).unwrap();
            let first = vec![(kept.clone(), oneshot::channel().0)];
            assert!(flush_batch(&mut wal, &first).is_ok());
            wal.fail_next_write_after = Some(10);
            assert!(flush_batch(&mut wal, &batch).is_err());
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![kept]);
        assert!(!replay.discarded_tail);

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn delete_is_durable() {
        let path = tmp_path("delete.wal");
        {
            let repo = WalLodgeRepository::open(&path, 0).unwrap();
            repo.insert(lodge("a")).await.unwrap();
            repo.insert(lodge("b")).await.unwrap();
            let removed = repo.delete(&LodgeId::from("a")).await.unwrap();
            assert_eq!(removed.id, LodgeId::from("a"));
        }

        let repo = WalLodgeRepository::open(&path, 0).unwrap();
        assert_eq!(repo.len(), 1);
        assert!(repo.get(&LodgeId::from("a")).await.unwrap_err().is_not_found());

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let path = tmp_path("duplicate.wal");
        let repo = WalLodgeRepository::open(&path, 0).unwrap();
        repo.insert(lodge("a")).await.unwrap();
        assert_eq!(
            repo.insert(lodge("a")).await.unwrap_err(),
            RepoError::AlreadyExists(LodgeId::from("a"))
        );
        assert_eq!(repo.appends_since_compact().await, 1);

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn update_unknown_lodge_writes_nothing() {
        let path = tmp_path("update_unknown.wal");
        let repo = WalLodgeRepository::open(&path, 0).unwrap();
        let err = repo
            .update(&LodgeId::from("ghost"), booked(&["2024-03-02"]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(repo.appends_since_compact().await, 0);

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn compacts_after_threshold() {
        let path = tmp_path("threshold.wal");
        {
            let repo = WalLodgeRepository::open(&path, 4).unwrap();
            repo.insert(lodge("a")).await.unwrap();
            for day in ["2024-03-01", "2024-03-02", "2024-03-03"] {
                repo.update(&LodgeId::from("a"), booked(&[day])).await.unwrap();
            }
            // The fourth append tripped compaction.
            assert_eq!(repo.appends_since_compact().await, 0);
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events.len(), 1);
        let Event::LodgeCreated { lodge } = &replay.events[0] else {
            panic!("expected a creation record, got {:?}", replay.events[0]);
        };
        assert_eq!(lodge.booked_dates, vec!["2024-03-03"]);

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn concurrent_updates_all_land() {
        let path = tmp_path("concurrent.wal");
        let repo = Arc::new(WalLodgeRepository::open(&path, 0).unwrap());
        for i in 0..8 {
            repo.insert(lodge(&format!("l{i}"))).await.unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.update(&LodgeId::new(format!("l{i}")), booked(&["2024-05-05"]))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        drop(repo);

        let reopened = WalLodgeRepository::open(&path, 0).unwrap();
        for lodge in reopened.list().await.unwrap() {
            assert_eq!(lodge.booked_dates, vec!["2024-05-05"]);
        }

        let _ = fs::remove_file(&path);
    }
}
