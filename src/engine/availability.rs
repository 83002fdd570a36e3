use serde::{Deserialize, Serialize};

use super::EngineError;
use super::dates::{CalendarDate, DateSet};

// ── Stay ranges ──────────────────────────────────────────────────

/// Half-open stay `[check_in, check_out)`.
///
/// The nights are check-in through the day before check-out. Check-out day is
/// the boundary: the guest leaves that morning and the lodge can take a new
/// arrival the same day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    check_in: CalendarDate,
    check_out: CalendarDate,
}

/// Wire shape of a range before the ordering check.
#[derive(Deserialize)]
struct RawDateRange {
    check_in: CalendarDate,
    check_out: CalendarDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = EngineError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.check_in, raw.check_out)
    }
}

impl DateRange {
    pub fn new(check_in: CalendarDate, check_out: CalendarDate) -> Result<Self, EngineError> {
        if check_out <= check_in {
            return Err(EngineError::InvalidRange {
                check_in: check_in.to_iso(),
                check_out: check_out.to_iso(),
            });
        }
        Ok(Self { check_in, check_out })
    }

    /// Build from a half-filled search form.
    pub fn from_selection(
        check_in: Option<CalendarDate>,
        check_out: Option<CalendarDate>,
    ) -> Result<Self, EngineError> {
        match (check_in, check_out) {
            (Some(check_in), Some(check_out)) => Self::new(check_in, check_out),
            _ => Err(EngineError::IncompleteRange),
        }
    }

    pub fn parse(check_in: &str, check_out: &str) -> Result<Self, EngineError> {
        Self::new(CalendarDate::parse(check_in)?, CalendarDate::parse(check_out)?)
    }

    pub fn check_in(&self) -> CalendarDate {
        self.check_in
    }

    pub fn check_out(&self) -> CalendarDate {
        self.check_out
    }

    pub fn nights(&self) -> u32 {
        self.check_in.days_until(&self.check_out) as u32
    }

    /// Every occupied night, in order. Alternative search reuses exactly this list.
    pub fn dates_in_range(&self) -> Vec<CalendarDate> {
        let end = self.check_out;
        std::iter::successors(Some(self.check_in), CalendarDate::succ)
            .take_while(|d| *d < end)
            .collect()
    }

    pub fn contains_night(&self, date: &CalendarDate) -> bool {
        self.check_in <= *date && *date < self.check_out
    }

    /// Highlighting on a calendar covers both ends of the selection.
    pub fn covers_for_display(&self, date: &CalendarDate) -> bool {
        self.check_in <= *date && *date <= self.check_out
    }
}

// ── Validation ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvailabilityResult {
    Available { nights: u32 },
    /// `conflicts` are the blocked or booked nights inside the range, in order.
    Unavailable { conflicts: Vec<CalendarDate> },
}

impl AvailabilityResult {
    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityResult::Available { .. })
    }

    pub fn conflict_count(&self) -> usize {
        match self {
            AvailabilityResult::Available { .. } => 0,
            AvailabilityResult::Unavailable { conflicts } => conflicts.len(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            AvailabilityResult::Available { nights } => format!(
                "This lodge is available for your selected dates ({nights} {})!",
                if *nights == 1 { "night" } else { "nights" }
            ),
            AvailabilityResult::Unavailable { conflicts } => {
                let n = conflicts.len();
                let (noun, verb) = if n == 1 { ("date", "is") } else { ("dates", "are") };
                format!("Unfortunately, {n} {noun} in your range {verb} unavailable.")
            }
        }
    }
}

/// Test pre-enumerated nights against a lodge's two sets.
pub fn validate_dates(
    blocked: &DateSet,
    booked: &DateSet,
    dates_in_range: &[CalendarDate],
) -> AvailabilityResult {
    let conflicts: Vec<CalendarDate> = dates_in_range
        .iter()
        .filter(|d| blocked.contains(d) || booked.contains(d))
        .copied()
        .collect();

    if conflicts.is_empty() {
        AvailabilityResult::Available {
            nights: dates_in_range.len() as u32,
        }
    } else {
        AvailabilityResult::Unavailable { conflicts }
    }
}

pub fn validate_range(blocked: &DateSet, booked: &DateSet, range: &DateRange) -> AvailabilityResult {
    validate_dates(blocked, booked, &range.dates_in_range())
}

/// Validate a raw check-in/check-out pair.
pub fn check_range(
    blocked: &DateSet,
    booked: &DateSet,
    check_in: CalendarDate,
    check_out: CalendarDate,
) -> Result<AvailabilityResult, EngineError> {
    let range = DateRange::new(check_in, check_out)?;
    Ok(validate_range(blocked, booked, &range))
}
