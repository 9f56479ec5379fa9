use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::EntityId;

/// Mutable campaign state. Only the calendar is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calendar: Vec<DayRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One in-game day and whatever happened on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<CalendarEvent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Something scheduled or recorded on the calendar, optionally tied to a
/// faction, a location and a clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_faction_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_location_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_clock_id: Option<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CalendarEvent {
    /// Stable identifier for reporting: the event id when present, else
    /// its position on the calendar.
    pub fn label(&self, day: usize, index: usize) -> EntityId {
        self.id
            .clone()
            .unwrap_or_else(|| EntityId(format!("day[{day}].events[{index}]")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_without_id_gets_positional_label() {
        let ev: CalendarEvent =
            serde_json::from_value(json!({"type": "festival", "description": "Lanterns"})).unwrap();
        assert_eq!(ev.label(4, 1).as_str(), "day[4].events[1]");
        assert_eq!(ev.extra["type"], "festival");
    }
}
