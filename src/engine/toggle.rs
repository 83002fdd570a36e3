use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{AvailabilityPatch, Lodge};

use super::LodgeSnapshot;
use super::dates::{CalendarDate, DateSet, is_past};

/// Where a single day sits in the admin click cycle
/// `Available -> Booked -> Blocked -> Available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayStatus {
    Available,
    Booked,
    Blocked,
}

impl DayStatus {
    pub fn next(self) -> Self {
        match self {
            DayStatus::Available => DayStatus::Booked,
            DayStatus::Booked => DayStatus::Blocked,
            DayStatus::Blocked => DayStatus::Available,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DayStatus::Available => "available",
            DayStatus::Booked => "booked",
            DayStatus::Blocked => "blocked",
        }
    }
}

/// Booked wins over blocked. A day in both sets is corrupt data; it is
/// reported by the caller, not repaired here.
pub fn classify(date: &CalendarDate, blocked: &DateSet, booked: &DateSet) -> DayStatus {
    if booked.contains(date) {
        DayStatus::Booked
    } else if blocked.contains(date) {
        DayStatus::Blocked
    } else {
        DayStatus::Available
    }
}

// ── Authorization ────────────────────────────────────────────────

/// Who is clicking. Passed explicitly into every mutating call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditContext {
    is_admin: bool,
    edit_mode: bool,
}

impl EditContext {
    pub fn guest() -> Self {
        Self::default()
    }

    /// Admin with edit mode still off.
    pub fn admin() -> Self {
        Self {
            is_admin: true,
            edit_mode: false,
        }
    }

    /// Admin with edit mode on.
    pub fn editing() -> Self {
        Self {
            is_admin: true,
            edit_mode: true,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode
    }

    /// No effect for non-admins.
    pub fn set_edit_mode(&mut self, on: bool) {
        if self.is_admin {
            self.edit_mode = on;
        }
    }

    pub fn toggle_edit_mode(&mut self) {
        self.set_edit_mode(!self.edit_mode);
    }

    pub fn authorized(&self) -> bool {
        self.is_admin && self.edit_mode
    }
}

// ── Guards and outcomes ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    Unauthorized,
    Past,
    /// A write for this lodge is still in flight.
    Busy,
}

impl IgnoreReason {
    pub fn label(self) -> &'static str {
        match self {
            IgnoreReason::Unauthorized => "unauthorized",
            IgnoreReason::Past => "past",
            IgnoreReason::Busy => "busy",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ToggleOutcome {
    Applied {
        date: CalendarDate,
        from: DayStatus,
        to: DayStatus,
        /// Confirmed state returned by the repository.
        snapshot: Arc<LodgeSnapshot>,
    },
    Ignored(IgnoreReason),
}

impl ToggleOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ToggleOutcome::Applied { .. })
    }
}

/// Guards in the order they are checked. `None` means the click goes through.
pub fn check_guards(
    ctx: &EditContext,
    date: &CalendarDate,
    today: &CalendarDate,
    busy: bool,
) -> Option<IgnoreReason> {
    if !ctx.authorized() {
        Some(IgnoreReason::Unauthorized)
    } else if is_past(date, today) {
        Some(IgnoreReason::Past)
    } else if busy {
        Some(IgnoreReason::Busy)
    } else {
        None
    }
}

// ── Transition planning ──────────────────────────────────────────

/// The single write one click produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TogglePlan {
    pub date: CalendarDate,
    pub from: DayStatus,
    pub to: DayStatus,
    pub patch: AvailabilityPatch,
}

/// Work out the next state of `date` and both updated lists.
///
/// Operates on the stored strings so malformed entries already in the record
/// are carried through untouched.
pub fn plan_toggle(lodge: &Lodge, date: CalendarDate) -> TogglePlan {
    let (blocked_set, _) = DateSet::parse_lenient(&lodge.blocked_dates);
    let (booked_set, _) = DateSet::parse_lenient(&lodge.booked_dates);
    if blocked_set.contains(&date) && booked_set.contains(&date) {
        tracing::error!(lodge = %lodge.id, %date, "date is both blocked and booked");
    }

    let from = classify(&date, &blocked_set, &booked_set);
    let to = from.next();

    let mut blocked = lodge.blocked_dates.clone();
    let mut booked = lodge.booked_dates.clone();
    match from {
        DayStatus::Available => add_date(&mut booked, date),
        DayStatus::Booked => {
            remove_date(&mut booked, date);
            add_date(&mut blocked, date);
        }
        DayStatus::Blocked => remove_date(&mut blocked, date),
    }

    TogglePlan {
        date,
        from,
        to,
        patch: AvailabilityPatch::both(blocked, booked),
    }
}

fn remove_date(list: &mut Vec<String>, date: CalendarDate) {
    list.retain(|s| CalendarDate::parse(s).map_or(true, |d| d != date));
}

fn add_date(list: &mut Vec<String>, date: CalendarDate) {
    if !list.iter().any(|s| CalendarDate::parse(s).is_ok_and(|d| d == date)) {
        list.push(date.to_iso());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LodgeId;

    fn d(s: &str) -> CalendarDate {
        CalendarDate::parse(s).unwrap()
    }

    fn lodge(blocked: &[&str], booked: &[&str]) -> Lodge {
        let mut l = Lodge::new(LodgeId::from("l1"), "Cedar", "Ridge");
        l.blocked_dates = blocked.iter().map(|s| s.to_string()).collect();
        l.booked_dates = booked.iter().map(|s| s.to_string()).collect();
        l
    }

    #[test]
    fn cycle_order() {
        assert_eq!(DayStatus::Available.next(), DayStatus::Booked);
        assert_eq!(DayStatus::Booked.next(), DayStatus::Blocked);
        assert_eq!(DayStatus::Blocked.next(), DayStatus::Available);
    }

    #[test]
    fn classify_prefers_booked() {
        let both: DateSet = [d("2024-03-02")].into_iter().collect();
        assert_eq!(classify(&d("2024-03-02"), &both, &both), DayStatus::Booked);
        assert_eq!(
            classify(&d("2024-03-02"), &both, &DateSet::new()),
            DayStatus::Blocked
        );
        assert_eq!(
            classify(&d("2024-03-03"), &both, &both),
            DayStatus::Available
        );
    }

    #[test]
    fn three_clicks_walk_the_cycle() {
        let date = d("2024-03-15");
        let mut l = lodge(&[], &[]);

        let plan = plan_toggle(&l, date);
        assert_eq!((plan.from, plan.to), (DayStatus::Available, DayStatus::Booked));
        l.apply_patch(&plan.patch);
        assert_eq!(l.booked_dates, vec!["2024-03-15"]);
        assert!(l.blocked_dates.is_empty());

        let plan = plan_toggle(&l, date);
        assert_eq!((plan.from, plan.to), (DayStatus::Booked, DayStatus::Blocked));
        l.apply_patch(&plan.patch);
        assert!(l.booked_dates.is_empty());
        assert_eq!(l.blocked_dates, vec!["2024-03-15"]);

        let plan = plan_toggle(&l, date);
        assert_eq!((plan.from, plan.to), (DayStatus::Blocked, DayStatus::Available));
        l.apply_patch(&plan.patch);
        assert!(l.booked_dates.is_empty());
        assert!(l.blocked_dates.is_empty());
    }

    #[test]
    fn plan_always_writes_both_sets() {
        let plan = plan_toggle(&lodge(&["2024-03-01"], &[]), d("2024-03-02"));
        assert_eq!(plan.patch.blocked_dates, Some(vec!["2024-03-01".to_string()]));
        assert_eq!(plan.patch.booked_dates, Some(vec!["2024-03-02".to_string()]));
    }

    #[test]
    fn other_dates_and_bad_entries_survive() {
        let l = lodge(&["junk", "2024-03-05"], &["2024-03-02", "2024-03-09"]);
        let plan = plan_toggle(&l, d("2024-03-02"));
        assert_eq!(
            plan.patch.blocked_dates,
            Some(vec!["junk".to_string(), "2024-03-05".into(), "2024-03-02".into()])
        );
        assert_eq!(plan.patch.booked_dates, Some(vec!["2024-03-09".to_string()]));
    }

    #[test]
    fn transitions_keep_sets_disjoint() {
        let date = d("2024-06-01");
        let mut l = lodge(&["2024-06-02"], &["2024-06-03"]);
        for _ in 0..9 {
            let plan = plan_toggle(&l, date);
            l.apply_patch(&plan.patch);
            let (blocked, _) = DateSet::parse_lenient(&l.blocked_dates);
            let (booked, _) = DateSet::parse_lenient(&l.booked_dates);
            assert!(blocked.is_disjoint(&booked));
        }
    }

    #[test]
    fn booked_to_blocked_does_not_duplicate() {
        // Corrupt record: already in both. Booked wins, and blocking it again
        // must not add a second copy.
        let l = lodge(&["2024-03-02"], &["2024-03-02"]);
        let plan = plan_toggle(&l, d("2024-03-02"));
        assert_eq!(plan.from, DayStatus::Booked);
        assert_eq!(plan.patch.blocked_dates, Some(vec!["2024-03-02".to_string()]));
        assert_eq!(plan.patch.booked_dates, Some(vec![]));
    }

    #[test]
    fn edit_context_only_admins_edit() {
        let mut guest = EditContext::guest();
        guest.set_edit_mode(true);
        assert!(!guest.edit_mode());
        assert!(!guest.authorized());

        let mut admin = EditContext::admin();
        assert!(!admin.authorized());
        admin.toggle_edit_mode();
        assert!(admin.authorized());
        admin.toggle_edit_mode();
        assert!(!admin.authorized());

        assert!(EditContext::editing().authorized());
    }

    #[test]
    fn guard_order() {
        let today = d("2024-03-10");
        let yesterday = d("2024-03-09");
        let editing = EditContext::editing();

        assert_eq!(
            check_guards(&EditContext::guest(), &yesterday, &today, true),
            Some(IgnoreReason::Unauthorized)
        );
        assert_eq!(
            check_guards(&editing, &yesterday, &today, true),
            Some(IgnoreReason::Past)
        );
        assert_eq!(
            check_guards(&editing, &today, &today, true),
            Some(IgnoreReason::Busy)
        );
        assert_eq!(check_guards(&editing, &today, &today, false), None);
    }
}
