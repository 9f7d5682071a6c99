//! Event and Item types
//!
//! An [`Event`] is validated on construction, so every `Event` value in the
//! system is well-formed: non-empty id and name, a name that is not the
//! reserved marker, and an id that cannot break the key encoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Separator between item id and attribute name in encoded keys (ASCII unit separator).
///
/// Item ids may not contain it; attribute names may.
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Reserved attribute name of the per-item last-updated marker key.
pub const LAST_UPDATED_AT: &str = "lastUpdatedAt";

/// An immutable attribute-change fact for one item.
///
/// The timestamp is producer-supplied (typically milliseconds since epoch).
/// Multiple events may target the same `(item_id, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    item_id: String,
    name: String,
    value: String,
    timestamp: u64,
}

impl Event {
    /// Create a validated event.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the id or name is empty, the name is
    /// the reserved marker name, or the id contains [`KEY_SEPARATOR`].
    pub fn new(
        item_id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
        timestamp: u64,
    ) -> Result<Self, ValidationError> {
        let item_id = item_id.into();
        let name = name.into();

        if item_id.is_empty() {
            return Err(ValidationError::EmptyItemId);
        }
        if item_id.contains(KEY_SEPARATOR) {
            return Err(ValidationError::SeparatorInItemId(item_id));
        }
        if name.is_empty() {
            return Err(ValidationError::EmptyAttributeName);
        }
        if name == LAST_UPDATED_AT {
            return Err(ValidationError::ReservedAttributeName(name));
        }

        Ok(Event {
            item_id,
            name,
            value: value.into(),
            timestamp,
        })
    }

    /// Id of the item this event updates.
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// Attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// New attribute value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Producer-supplied timestamp.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Materialized current state of one item.
///
/// Items are never created explicitly: an item "exists" once any event has been
/// applied for its id. An unknown id reads back as an empty item with
/// `last_updated == 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Item id
    pub item_id: String,
    /// Latest applied value per attribute name
    pub attributes: BTreeMap<String, String>,
    /// Timestamp stored in the last-updated marker (0 when absent)
    pub last_updated: u64,
}

impl Item {
    /// An item with no attributes and `last_updated == 0`.
    pub fn empty(item_id: impl Into<String>) -> Self {
        Item {
            item_id: item_id.into(),
            attributes: BTreeMap::new(),
            last_updated: 0,
        }
    }

    /// Value of an attribute, if any event wrote it.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// True when no attribute has ever been written.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_event_valid() {
        let event = Event::new("u42", "email", "a@x.com", 100).unwrap();
        assert_eq!(event.item_id(), "u42");
        assert_eq!(event.name(), "email");
        assert_eq!(event.value(), "a@x.com");
        assert_eq!(event.timestamp(), 100);
    }

    #[test]
    fn test_event_empty_value_allowed() {
        let event = Event::new("u1", "nickname", "", 0).unwrap();
        assert_eq!(event.value(), "");
    }

    #[test]
    fn test_event_rejects_empty_item_id() {
        assert_eq!(
            Event::new("", "name", "Ann", 1),
            Err(ValidationError::EmptyItemId)
        );
    }

    #[test]
    fn test_event_rejects_empty_name() {
        assert_eq!(
            Event::new("u1", "", "Ann", 1),
            Err(ValidationError::EmptyAttributeName)
        );
    }

    #[test]
    fn test_event_rejects_reserved_name() {
        assert!(matches!(
            Event::new("u1", LAST_UPDATED_AT, "5", 1),
            Err(ValidationError::ReservedAttributeName(_))
        ));
    }

    #[test]
    fn test_event_rejects_separator_in_item_id() {
        let id = format!("a{}b", KEY_SEPARATOR);
        assert!(matches!(
            Event::new(id, "name", "x", 1),
            Err(ValidationError::SeparatorInItemId(_))
        ));
    }

    #[test]
    fn test_event_allows_separator_in_name() {
        let name = format!("a{}b", KEY_SEPARATOR);
        assert!(Event::new("u1", name, "x", 1).is_ok());
    }

    #[test]
    fn test_item_empty() {
        let item = Item::empty("nobody");
        assert!(item.is_empty());
        assert_eq!(item.last_updated, 0);
        assert_eq!(item.get("anything"), None);
    }

    #[test]
    fn test_item_serializes_camel_case() {
        let mut item = Item::empty("u1");
        item.attributes.insert("name".into(), "Ann".into());
        item.last_updated = 10;

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["itemId"], "u1");
        assert_eq!(json["lastUpdated"], 10);
        assert_eq!(json["attributes"]["name"], "Ann");
    }

    proptest! {
        #[test]
        fn test_event_accepts_any_plain_id(id in "[a-zA-Z0-9:_-]{1,32}", name in "[a-z]{1,12}", ts: u64) {
            let event = Event::new(id.clone(), name.clone(), "v", ts).unwrap();
            prop_assert_eq!(event.item_id(), id.as_str());
            prop_assert_eq!(event.timestamp(), ts);
        }
    }
}
