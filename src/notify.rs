use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::engine::{CalendarDate, DayStatus};
use crate::model::LodgeId;

const CHANNEL_CAPACITY: usize = 256;

/// A confirmed availability write, as other open calendars need to see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityChange {
    pub lodge_id: LodgeId,
    pub date: CalendarDate,
    pub status: DayStatus,
    pub blocked_dates: Vec<String>,
    pub booked_dates: Vec<String>,
}

/// Broadcast hub, one channel per lodge.
pub struct NotifyHub {
    channels: DashMap<LodgeId, broadcast::Sender<AvailabilityChange>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes for a lodge. Creates the channel if needed.
    pub fn subscribe(&self, lodge_id: &LodgeId) -> broadcast::Receiver<AvailabilityChange> {
        let sender = self
            .channels
            .entry(lodge_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, lodge_id: &LodgeId, change: AvailabilityChange) {
        if let Some(sender) = self.channels.get(lodge_id) {
            let _ = sender.send(change);
        }
    }

    /// Remove a channel (e.g. when the lodge is deleted).
    pub fn remove(&self, lodge_id: &LodgeId) {
        self.channels.remove(lodge_id);
    }
}
