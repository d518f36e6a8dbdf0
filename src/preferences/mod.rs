//! Notification preference model and preference-store boundary.
//!
//! A preference document groups event entries under activation toggles.
//! An event is enabled for a user only when its own entry AND the group
//! holding it are both marked active. Documents are fetched once per
//! authentication attempt through the [`PreferenceStore`] trait.

mod factory;
mod memory_store;
mod redis_store;
mod store;

pub use factory::create_preference_store;
pub use memory_store::MemoryPreferenceStore;
pub use redis_store::RedisPreferenceStore;
pub use store::{PreferenceStore, PreferenceStoreError};

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

/// Raw preference document as stored for one identity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferenceDocument {
    #[serde(default)]
    pub groups: Vec<NotificationGroup>,
}

/// A group of event preferences with its own activation toggle.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationGroup {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub events: Vec<EventPreference>,
}

/// A single event entry inside a group.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPreference {
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub active: bool,
}

/// Extract the set of enabled event names from a raw preference document.
///
/// Pure transformation. An entry contributes its event name only when both
/// the entry and its enclosing group are active. A document with zero
/// active entries yields an empty set; so does a document whose shape is
/// not recognized.
pub fn enabled_events(document: &Value) -> HashSet<String> {
    let document: PreferenceDocument = match serde_json::from_value(document.clone()) {
        Ok(d) => d,
        Err(e) => {
            tracing::debug!(error = %e, "Unrecognized preference document shape");
            return HashSet::new();
        }
    };

    document
        .groups
        .into_iter()
        .filter(|group| group.active)
        .flat_map(|group| group.events)
        .filter(|entry| entry.active && !entry.cmd.is_empty())
        .map(|entry| entry.cmd)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_active_group_and_entries() {
        let doc = json!({
            "groups": [
                {
                    "active": true,
                    "events": [
                        {"cmd": "ping", "active": true},
                        {"cmd": "alert", "active": false},
                    ]
                }
            ]
        });

        let events = enabled_events(&doc);
        assert_eq!(events.len(), 1);
        assert!(events.contains("ping"));
    }

    #[test]
    fn test_inactive_group_contributes_nothing() {
        // Entries marked active inside an inactive group stay disabled
        let doc = json!({
            "groups": [
                {
                    "active": false,
                    "events": [
                        {"cmd": "ping", "active": true},
                        {"cmd": "alert", "active": true},
                    ]
                }
            ]
        });

        assert!(enabled_events(&doc).is_empty());
    }

    #[test]
    fn test_mixed_groups() {
        let doc = json!({
            "groups": [
                {
                    "active": true,
                    "events": [{"cmd": "order.created", "active": true}]
                },
                {
                    "active": false,
                    "events": [{"cmd": "order.deleted", "active": true}]
                },
                {
                    "active": true,
                    "events": [
                        {"cmd": "stock.low", "active": true},
                        {"cmd": "stock.out", "active": false},
                    ]
                }
            ]
        });

        let events = enabled_events(&doc);
        assert_eq!(events.len(), 2);
        assert!(events.contains("order.created"));
        assert!(events.contains("stock.low"));
    }

    #[test]
    fn test_empty_document_yields_empty_set() {
        assert!(enabled_events(&json!({})).is_empty());
        assert!(enabled_events(&json!({"groups": []})).is_empty());
    }

    #[test]
    fn test_unrecognized_shape_yields_empty_set() {
        assert!(enabled_events(&json!("not an object")).is_empty());
        assert!(enabled_events(&json!([1, 2, 3])).is_empty());
        assert!(enabled_events(&json!({"groups": "oops"})).is_empty());
    }

    #[test]
    fn test_duplicate_event_names_collapse() {
        let doc = json!({
            "groups": [
                {"active": true, "events": [{"cmd": "ping", "active": true}]},
                {"active": true, "events": [{"cmd": "ping", "active": true}]}
            ]
        });

        assert_eq!(enabled_events(&doc).len(), 1);
    }

    #[test]
    fn test_entry_without_cmd_is_skipped() {
        let doc = json!({
            "groups": [
                {"active": true, "events": [{"active": true}]}
            ]
        });

        assert!(enabled_events(&doc).is_empty());
    }
}
