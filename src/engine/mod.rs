mod alternatives;
mod availability;
mod dates;
mod error;
mod mutations;
mod queries;
mod toggle;

pub use alternatives::{AvailabilityIndex, find_alternatives, unavailable_days};
pub use availability::{AvailabilityResult, DateRange, check_range, validate_dates, validate_range};
pub use dates::{CalendarDate, DateSet, date_equals, is_past};
pub use error::EngineError;
pub use queries::{Alternatives, CalendarDay, SearchOutcome};
pub use toggle::{
    DayStatus, EditContext, IgnoreReason, TogglePlan, ToggleOutcome, check_guards, classify,
    plan_toggle,
};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};

use crate::model::{Lodge, LodgeId};
use crate::notify::NotifyHub;
use crate::repository::{LodgeRepository, RepoError};

pub const DEFAULT_REPO_TIMEOUT: Duration = Duration::from_secs(5);

/// A lodge record together with its parsed date sets.
///
/// Built only from what the repository returned, so it is always a confirmed
/// state and never an optimistic one.
#[derive(Debug, Clone)]
pub struct LodgeSnapshot {
    pub lodge: Lodge,
    pub blocked: DateSet,
    pub booked: DateSet,
    /// Stored entries that are not valid `YYYY-MM-DD` dates.
    pub invalid_dates: Vec<String>,
}

impl LodgeSnapshot {
    pub fn from_lodge(lodge: Lodge) -> Self {
        let (blocked, mut invalid_dates) = DateSet::parse_lenient(&lodge.blocked_dates);
        let (booked, bad_booked) = DateSet::parse_lenient(&lodge.booked_dates);
        invalid_dates.extend(bad_booked);

        if !invalid_dates.is_empty() {
            tracing::warn!(lodge = %lodge.id, invalid = ?invalid_dates, "lodge has malformed dates");
        }
        let overlap = blocked.overlap(&booked);
        if !overlap.is_empty() {
            tracing::error!(lodge = %lodge.id, dates = ?overlap, "dates are both blocked and booked");
        }

        Self {
            lodge,
            blocked,
            booked,
            invalid_dates,
        }
    }

    pub fn status_of(&self, date: &CalendarDate) -> DayStatus {
        classify(date, &self.blocked, &self.booked)
    }

    pub fn validate(&self, range: &DateRange) -> AvailabilityResult {
        validate_range(&self.blocked, &self.booked, range)
    }
}

/// Availability service for lodges held in a [`LodgeRepository`].
///
/// Keeps the last confirmed snapshot per lodge and allows at most one
/// outstanding availability write per lodge.
pub struct AvailabilityEngine {
    repo: Arc<dyn LodgeRepository>,
    pub notify: Arc<NotifyHub>,
    snapshots: DashMap<LodgeId, Arc<LodgeSnapshot>>,
    in_flight: DashSet<LodgeId>,
    repo_timeout: Duration,
}

/// Marks a lodge busy for as long as it is alive.
pub(super) struct InFlightWrite<'a> {
    set: &'a DashSet<LodgeId>,
    id: LodgeId,
}

impl Drop for InFlightWrite<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

impl AvailabilityEngine {
    pub fn new(repo: Arc<dyn LodgeRepository>, notify: Arc<NotifyHub>) -> Self {
        Self {
            repo,
            notify,
            snapshots: DashMap::new(),
            in_flight: DashSet::new(),
            repo_timeout: DEFAULT_REPO_TIMEOUT,
        }
    }

    pub fn with_repo_timeout(mut self, timeout: Duration) -> Self {
        self.repo_timeout = timeout;
        self
    }

    pub fn cached(&self, id: &LodgeId) -> Option<Arc<LodgeSnapshot>> {
        self.snapshots.get(id).map(|e| e.value().clone())
    }

    /// Drop the cached snapshot so the next read goes to the repository.
    pub fn evict(&self, id: &LodgeId) {
        self.snapshots.remove(id);
    }

    pub fn is_busy(&self, id: &LodgeId) -> bool {
        self.in_flight.contains(id)
    }

    /// Claim the single write slot for a lodge. `None` when already taken.
    pub(super) fn try_begin_write(&self, id: &LodgeId) -> Option<InFlightWrite<'_>> {
        if self.in_flight.insert(id.clone()) {
            Some(InFlightWrite {
                set: &self.in_flight,
                id: id.clone(),
            })
        } else {
            None
        }
    }

    pub(super) fn repo(&self) -> &dyn LodgeRepository {
        self.repo.as_ref()
    }

    pub(super) fn cache(&self, id: &LodgeId, snapshot: LodgeSnapshot) -> Arc<LodgeSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.snapshots.insert(id.clone(), snapshot.clone());
        snapshot
    }

    /// Run a repository call under the configured timeout.
    pub(super) async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, RepoError>
    where
        F: Future<Output = Result<T, RepoError>>,
    {
        match tokio::time::timeout(self.repo_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RepoError::Timeout { operation }),
        }
    }
}
