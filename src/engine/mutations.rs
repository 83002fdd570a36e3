use crate::limits::*;
use crate::model::LodgeId;
use crate::notify::AvailabilityChange;
use crate::observability;

use super::dates::CalendarDate;
use super::toggle::{EditContext, IgnoreReason, ToggleOutcome, check_guards, plan_toggle};
use super::{AvailabilityEngine, EngineError, LodgeSnapshot};

impl AvailabilityEngine {
    /// Admin click on a calendar day, judged against today's local date.
    pub async fn toggle_date(
        &self,
        lodge_id: &LodgeId,
        date: CalendarDate,
        ctx: &EditContext,
    ) -> Result<ToggleOutcome, EngineError> {
        self.toggle_date_at(lodge_id, date, CalendarDate::today(), ctx)
            .await
    }

    /// Cycle `date` one step `Available -> Booked -> Blocked -> Available` and
    /// persist both sets in a single update.
    ///
    /// The lodge is re-read before planning. Ignored clicks (unauthorized,
    /// past day, write already in flight) make no repository call. On a failed write the cached snapshot is left as it
    /// was and `PersistenceFailure` is returned; nothing is retried.
    pub async fn toggle_date_at(
        &self,
        lodge_id: &LodgeId,
        date: CalendarDate,
        today: CalendarDate,
        ctx: &EditContext,
    ) -> Result<ToggleOutcome, EngineError> {
        if let Some(reason) = check_guards(ctx, &date, &today, self.is_busy(lodge_id)) {
            return Ok(self.ignore(lodge_id, date, reason));
        }
        let Some(_write) = self.try_begin_write(lodge_id) else {
            return Ok(self.ignore(lodge_id, date, IgnoreReason::Busy));
        };

        // Plan against the stored record, not a possibly stale cache entry.
        let current = self.load(lodge_id).await?;
        let plan = plan_toggle(&current.lodge, date);

        let before = current.lodge.blocked_dates.len() + current.lodge.booked_dates.len();
        let after = plan.patch.blocked_dates.as_ref().map_or(0, Vec::len)
            + plan.patch.booked_dates.as_ref().map_or(0, Vec::len);
        if after > before && after > MAX_DATES_PER_LODGE {
            return Err(EngineError::LimitExceeded("too many blocked/booked dates on lodge"));
        }

        let confirmed = match self
            .bounded("update", self.repo().update(lodge_id, plan.patch))
            .await
        {
            Ok(lodge) => lodge,
            Err(e) => {
                tracing::warn!(lodge = %lodge_id, %date, "availability update failed: {e}");
                metrics::counter!(observability::PERSISTENCE_FAILURES_TOTAL).increment(1);
                if e.is_not_found() {
                    self.evict(lodge_id);
                }
                return Err(EngineError::from_write(e));
            }
        };

        let snapshot = self.cache(lodge_id, LodgeSnapshot::from_lodge(confirmed));
        let confirmed_status = snapshot.status_of(&date);
        if confirmed_status != plan.to {
            tracing::warn!(
                lodge = %lodge_id,
                %date,
                expected = plan.to.label(),
                confirmed = confirmed_status.label(),
                "repository confirmed a different state than requested"
            );
        }

        self.notify.send(
            lodge_id,
            AvailabilityChange {
                lodge_id: lodge_id.clone(),
                date,
                status: confirmed_status,
                blocked_dates: snapshot.lodge.blocked_dates.clone(),
                booked_dates: snapshot.lodge.booked_dates.clone(),
            },
        );
        metrics::counter!(
            observability::TOGGLES_TOTAL,
            "from" => plan.from.label(),
            "to" => confirmed_status.label()
        )
        .increment(1);
        tracing::info!(
            lodge = %lodge_id,
            %date,
            from = plan.from.label(),
            to = confirmed_status.label(),
            "availability toggled"
        );

        Ok(ToggleOutcome::Applied {
            date,
            from: plan.from,
            to: confirmed_status,
            snapshot,
        })
    }

    fn ignore(&self, lodge_id: &LodgeId, date: CalendarDate, reason: IgnoreReason) -> ToggleOutcome {
        tracing::debug!(lodge = %lodge_id, %date, reason = reason.label(), "toggle ignored");
        metrics::counter!(observability::TOGGLES_IGNORED_TOTAL, "reason" => reason.label())
            .increment(1);
        ToggleOutcome::Ignored(reason)
    }
}
