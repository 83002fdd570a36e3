use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque lodge identifier, assigned by whichever repository owns the record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LodgeId(String);

impl LodgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for adapters that assign their own (ULID text, so ids sort by creation time).
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for LodgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LodgeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A lodge record as the repository stores it.
///
/// Dates are kept as ISO `YYYY-MM-DD` strings exactly as persisted; the engine
/// parses them on read and serializes on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lodge {
    pub id: LodgeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub max_occupancy: u32,
    #[serde(default)]
    pub bedrooms: u32,
    #[serde(default)]
    pub bathrooms: u32,
    #[serde(default)]
    pub price_per_person_per_night: f64,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub blocked_dates: Vec<String>,
    #[serde(default)]
    pub booked_dates: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Lodge {
    pub fn new(id: LodgeId, name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            location: location.into(),
            description: String::new(),
            images: Vec::new(),
            amenities: Vec::new(),
            max_occupancy: 0,
            bedrooms: 0,
            bathrooms: 0,
            price_per_person_per_night: 0.0,
            is_available: true,
            featured: false,
            blocked_dates: Vec::new(),
            booked_dates: Vec::new(),
        }
    }

    /// Placeholder or half-saved records have no name or no location.
    /// Whitespace counts as a value.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.location.is_empty()
    }

    /// Apply a partial availability update in place.
    pub fn apply_patch(&mut self, patch: &AvailabilityPatch) {
        if let Some(blocked) = &patch.blocked_dates {
            self.blocked_dates = blocked.clone();
        }
        if let Some(booked) = &patch.booked_dates {
            self.booked_dates = booked.clone();
        }
    }

    pub fn summary(&self) -> LodgeSummary {
        LodgeSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            location: self.location.clone(),
            price_per_person_per_night: self.price_per_person_per_night,
        }
    }
}

/// Partial update of a lodge's two date sets. `None` leaves that set unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityPatch {
    pub blocked_dates: Option<Vec<String>>,
    pub booked_dates: Option<Vec<String>>,
}

impl AvailabilityPatch {
    pub fn both(blocked_dates: Vec<String>, booked_dates: Vec<String>) -> Self {
        Self {
            blocked_dates: Some(blocked_dates),
            booked_dates: Some(booked_dates),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocked_dates.is_none() && self.booked_dates.is_none()
    }
}

/// What the presentation layer needs to link to an alternative lodge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodgeSummary {
    pub id: LodgeId,
    pub name: String,
    pub location: String,
    pub price_per_person_per_night: f64,
}

/// Durable log record format. Flat, one variant per mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    LodgeCreated {
        lodge: Lodge,
    },
    AvailabilityUpdated {
        id: LodgeId,
        blocked_dates: Vec<String>,
        booked_dates: Vec<String>,
    },
    LodgeDeleted {
        id: LodgeId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lodge_json_defaults_missing_fields() {
        let json = r#"{"id":"abc","name":"Cedar","location":"North Ridge"}"#;
        let lodge: Lodge = serde_json::from_str(json).unwrap();
        assert_eq!(lodge.id, LodgeId::from("abc"));
        assert!(lodge.blocked_dates.is_empty());
        assert!(lodge.booked_dates.is_empty());
        assert!(lodge.is_available);
        assert!(!lodge.featured);
    }

    #[test]
    fn lodge_json_reads_hosted_field_names() {
        let json = r#"{
            "id": "l1",
            "name": "Bear Den",
            "location": "Lake Road",
            "price_per_person_per_night": 199,
            "max_occupancy": 4,
            "amenities": ["Fireplace", "WiFi"],
            "blocked_dates": ["2024-03-05"],
            "booked_dates": ["2024-03-02", "2024-03-03"]
        }"#;
        let lodge: Lodge = serde_json::from_str(json).unwrap();
        assert_eq!(lodge.price_per_person_per_night, 199.0);
        assert_eq!(lodge.max_occupancy, 4);
        assert_eq!(lodge.amenities, vec!["Fireplace", "WiFi"]);
        assert_eq!(lodge.blocked_dates, vec!["2024-03-05"]);
        assert_eq!(lodge.booked_dates.len(), 2);
    }

    #[test]
    fn completeness_requires_name_and_location() {
        let id = LodgeId::from("x");
        assert!(Lodge::new(id.clone(), "A", "B").is_complete());
        assert!(!Lodge::new(id.clone(), "", "B").is_complete());
        assert!(!Lodge::new(id.clone(), "A", "").is_complete());
        assert!(Lodge::new(id.clone(), " ", "B").is_complete());
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut lodge = Lodge::new(LodgeId::from("x"), "A", "B");
        lodge.blocked_dates = vec!["2024-01-01".into()];
        lodge.booked_dates = vec!["2024-01-02".into()];

        lodge.apply_patch(&AvailabilityPatch {
            blocked_dates: None,
            booked_dates: Some(vec![]),
        });
        assert_eq!(lodge.blocked_dates, vec!["2024-01-01"]);
        assert!(lodge.booked_dates.is_empty());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = LodgeId::generate();
        let b = LodgeId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 26);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let mut lodge = Lodge::new(LodgeId::generate(), "Cedar", "Ridge");
        lodge.booked_dates = vec!["2024-03-02".into()];
        let event = Event::LodgeCreated { lodge };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
