use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::limits::*;
use crate::model::{Lodge, LodgeId, LodgeSummary};
use crate::observability;

use super::alternatives::find_alternatives;
use super::availability::{AvailabilityResult, DateRange, validate_dates};
use super::dates::{CalendarDate, is_past};
use super::toggle::DayStatus;
use super::{AvailabilityEngine, EngineError, LodgeSnapshot};

/// Result of a guest's date search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub availability: AvailabilityResult,
    pub alternatives: Alternatives,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Alternatives {
    /// The requested lodge is free; nothing else was looked up.
    NotNeeded,
    /// Other lodges free for the whole stay, in repository order. May be empty.
    Found(Vec<LodgeSummary>),
    /// The lodge list could not be fetched. The availability answer still stands.
    LookupFailed(String),
}

impl Alternatives {
    pub fn message(&self) -> Option<String> {
        match self {
            Alternatives::NotNeeded | Alternatives::LookupFailed(_) => None,
            Alternatives::Found(found) if found.is_empty() => Some(
                "Unfortunately, no other lodges are available for your selected dates. Please try different dates."
                    .into(),
            ),
            Alternatives::Found(found) => Some(format!(
                "We found {} {} available for your dates:",
                found.len(),
                if found.len() == 1 { "lodge" } else { "lodges" }
            )),
        }
    }
}

/// One cell of a month view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub date: CalendarDate,
    pub status: DayStatus,
    pub past: bool,
    pub selected: bool,
}

fn check_stay_limit(range: &DateRange) -> Result<(), EngineError> {
    if range.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

impl AvailabilityEngine {
    /// Fetch a lodge from the repository and replace the cached snapshot.
    pub async fn load(&self, lodge_id: &LodgeId) -> Result<Arc<LodgeSnapshot>, EngineError> {
        let lodge = match self.bounded("get", self.repo().get(lodge_id)).await {
            Ok(lodge) => lodge,
            Err(e) => {
                if e.is_not_found() {
                    self.evict(lodge_id);
                }
                return Err(EngineError::from_read(e));
            }
        };
        Ok(self.cache(lodge_id, LodgeSnapshot::from_lodge(lodge)))
    }

    /// Cached snapshot, loading it on first use. The cache is refreshed only
    /// by `load`, `search` and this engine's own toggles; call `load` to pick
    /// up writes made elsewhere.
    pub async fn snapshot(&self, lodge_id: &LodgeId) -> Result<Arc<LodgeSnapshot>, EngineError> {
        match self.cached(lodge_id) {
            Some(snapshot) => Ok(snapshot),
            None => self.load(lodge_id).await,
        }
    }

    pub async fn check_availability(
        &self,
        lodge_id: &LodgeId,
        check_in: Option<CalendarDate>,
        check_out: Option<CalendarDate>,
    ) -> Result<AvailabilityResult, EngineError> {
        let range = DateRange::from_selection(check_in, check_out)?;
        check_stay_limit(&range)?;
        let snapshot = self.snapshot(lodge_id).await?;
        let result = snapshot.validate(&range);
        record_check(&result);
        Ok(result)
    }

    /// Check a stay and, when the lodge is taken, suggest lodges that are free
    /// for every night of it. The requested lodge is re-read so it is judged
    /// on the same footing as the freshly listed alternatives.
    pub async fn search(
        &self,
        lodge_id: &LodgeId,
        check_in: Option<CalendarDate>,
        check_out: Option<CalendarDate>,
    ) -> Result<SearchOutcome, EngineError> {
        let range = DateRange::from_selection(check_in, check_out)?;
        check_stay_limit(&range)?;
        let snapshot = self.load(lodge_id).await?;

        let dates_in_range = range.dates_in_range();
        let availability = validate_dates(&snapshot.blocked, &snapshot.booked, &dates_in_range);
        record_check(&availability);

        if availability.is_available() {
            return Ok(SearchOutcome {
                availability,
                alternatives: Alternatives::NotNeeded,
            });
        }

        let started = Instant::now();
        let alternatives = match self.bounded("list", self.repo().list()).await {
            Ok(lodges) => Alternatives::Found(
                find_alternatives(lodge_id, &lodges, &dates_in_range)
                    .into_iter()
                    .map(Lodge::summary)
                    .collect(),
            ),
            Err(e) => {
                tracing::warn!(lodge = %lodge_id, "alternative lodge lookup failed: {e}");
                Alternatives::LookupFailed(EngineError::from_read(e).user_message())
            }
        };
        metrics::counter!(observability::ALTERNATIVE_SEARCHES_TOTAL).increment(1);
        metrics::histogram!(observability::ALTERNATIVE_SEARCH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        Ok(SearchOutcome {
            availability,
            alternatives,
        })
    }

    /// Every day of one month with its status, whether it is past, and whether
    /// it falls inside `selection` (both ends highlighted).
    pub async fn month_calendar(
        &self,
        lodge_id: &LodgeId,
        year: i32,
        month: u32,
        today: CalendarDate,
        selection: Option<DateRange>,
    ) -> Result<Vec<CalendarDay>, EngineError> {
        let first = CalendarDate::from_ymd(year, month, 1)
            .ok_or_else(|| EngineError::InvalidDateFormat(format!("{year:04}-{month:02}")))?;
        let snapshot = self.snapshot(lodge_id).await?;

        Ok(std::iter::successors(Some(first), CalendarDate::succ)
            .take_while(|d| d.month() == month && d.year() == year)
            .map(|date| CalendarDay {
                date,
                status: snapshot.status_of(&date),
                past: is_past(&date, &today),
                selected: selection.is_some_and(|r| r.covers_for_display(&date)),
            })
            .collect())
    }
}

fn record_check(result: &AvailabilityResult) {
    let outcome = if result.is_available() { "available" } else { "unavailable" };
    metrics::counter!(observability::AVAILABILITY_CHECKS_TOTAL, "outcome" => outcome).increment(1);
}
