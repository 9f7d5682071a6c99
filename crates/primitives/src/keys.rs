//! Key encoding for items
//!
//! ```text
//! attribute key:  <item_id> 0x1F <attribute name>
//! marker key:     <item_id> 0x1F lastUpdatedAt
//! ```
//!
//! Item ids never contain the separator, and every scan prefix ends with
//! it, so the keys of one item are exactly the keys starting with
//! `item_prefix(id)`. `"item1"` and `"item10"` never overlap.

use meghaduta_core::{KEY_SEPARATOR, LAST_UPDATED_AT};

/// Separator between item id and attribute name.
pub const SEPARATOR: char = KEY_SEPARATOR;

/// Scan prefix covering every key of `item_id`.
pub fn item_prefix(item_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(item_id.len() + 1);
    key.extend_from_slice(item_id.as_bytes());
    key.push(SEPARATOR as u8);
    key
}

/// Key holding the value of one attribute.
pub fn attribute_key(item_id: &str, name: &str) -> Vec<u8> {
    let mut key = item_prefix(item_id);
    key.extend_from_slice(name.as_bytes());
    key
}

/// Key holding the item's last-updated marker.
pub fn marker_key(item_id: &str) -> Vec<u8> {
    attribute_key(item_id, LAST_UPDATED_AT)
}

/// The attribute-name part of `key`, if `key` belongs to `item_id`.
pub fn strip_item_prefix<'a>(item_id: &str, key: &'a [u8]) -> Option<&'a [u8]> {
    key.strip_prefix(item_id.as_bytes())?
        .strip_prefix(&[SEPARATOR as u8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_key_layout() {
        assert_eq!(attribute_key("u1", "name"), b"u1\x1fname".to_vec());
        assert_eq!(marker_key("u1"), b"u1\x1flastUpdatedAt".to_vec());
    }

    #[test]
    fn test_prefix_is_exact() {
        let prefix = item_prefix("item1");
        assert!(attribute_key("item1", "a").starts_with(&prefix));
        assert!(!attribute_key("item10", "a").starts_with(&prefix));
    }

    #[test]
    fn test_strip_item_prefix() {
        let key = attribute_key("u1", "email");
        assert_eq!(strip_item_prefix("u1", &key), Some(&b"email"[..]));
        assert_eq!(strip_item_prefix("u", &key), None);
        assert_eq!(strip_item_prefix("u10", &key), None);
    }

    #[test]
    fn test_strip_keeps_leading_name_bytes() {
        // Only the exact prefix is removed, not a set of characters
        let key = attribute_key("ab", "ba");
        assert_eq!(strip_item_prefix("ab", &key), Some(&b"ba"[..]));
    }

    #[test]
    fn test_separator_in_name_survives() {
        let key = attribute_key("u1", "a\u{1f}b");
        assert_eq!(strip_item_prefix("u1", &key), Some(&b"a\x1fb"[..]));
    }
}
