use std::collections::{HashMap, HashSet};

use crate::model::{Lodge, LodgeId};

use super::dates::{CalendarDate, DateSet};

// ── Scan ─────────────────────────────────────────────────────────

/// Union of a lodge's blocked and booked days. Malformed entries are skipped
/// and logged.
pub fn unavailable_days(lodge: &Lodge) -> DateSet {
    let (blocked, bad_blocked) = DateSet::parse_lenient(&lodge.blocked_dates);
    let (booked, bad_booked) = DateSet::parse_lenient(&lodge.booked_dates);
    if !bad_blocked.is_empty() || !bad_booked.is_empty() {
        tracing::warn!(
            lodge = %lodge.id,
            blocked = ?bad_blocked,
            booked = ?bad_booked,
            "skipping malformed availability dates"
        );
    }
    blocked.union(&booked)
}

/// Lodges that could take the stay instead of `exclude`.
///
/// A candidate qualifies when it is not the excluded lodge, has a name and a
/// location, and none of `dates_in_range` is blocked or booked. Input order is
/// kept. Each candidate's dates are parsed once.
pub fn find_alternatives<'a>(
    exclude: &LodgeId,
    lodges: &'a [Lodge],
    dates_in_range: &[CalendarDate],
) -> Vec<&'a Lodge> {
    lodges
        .iter()
        .filter(|lodge| &lodge.id != exclude && lodge.is_complete())
        .filter(|lodge| {
            let unavailable = unavailable_days(lodge);
            !dates_in_range.iter().any(|d| unavailable.contains(d))
        })
        .collect()
}

// ── Inverted index ───────────────────────────────────────────────

/// Per-day index of which lodges are unavailable, for large collections or
/// long stays where rescanning every lodge per search gets expensive.
///
/// Built from one snapshot of the collection; rebuild after writes.
pub struct AvailabilityIndex {
    lodges: Vec<Lodge>,
    /// Day → positions in `lodges` that are blocked or booked that day.
    by_day: HashMap<CalendarDate, Vec<usize>>,
}

impl AvailabilityIndex {
    pub fn build(lodges: Vec<Lodge>) -> Self {
        let mut by_day: HashMap<CalendarDate, Vec<usize>> = HashMap::new();
        for (pos, lodge) in lodges.iter().enumerate() {
            for day in unavailable_days(lodge).iter() {
                by_day.entry(*day).or_default().push(pos);
            }
        }
        Self { lodges, by_day }
    }

    pub fn len(&self) -> usize {
        self.lodges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lodges.is_empty()
    }

    /// Lodges blocked or booked on `day`.
    pub fn unavailable_on(&self, day: &CalendarDate) -> Vec<&Lodge> {
        self.by_day
            .get(day)
            .map(|positions| positions.iter().map(|&p| &self.lodges[p]).collect())
            .unwrap_or_default()
    }

    /// Same answer as [`find_alternatives`], in the same order, without
    /// touching lodges that are free on every requested day.
    pub fn alternatives(&self, exclude: &LodgeId, dates_in_range: &[CalendarDate]) -> Vec<&Lodge> {
        let taken: HashSet<usize> = dates_in_range
            .iter()
            .filter_map(|d| self.by_day.get(d))
            .flatten()
            .copied()
            .collect();

        self.lodges
            .iter()
            .enumerate()
            .filter(|(pos, lodge)| {
                !taken.contains(pos) && &lodge.id != exclude && lodge.is_complete()
            })
            .map(|(_, lodge)| lodge)
            .collect()
    }
}
