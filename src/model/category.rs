//! Category data model for annotation categories.

use serde::{Deserialize, Serialize};

/// Server-side category identifier.
pub type CategoryId = i64;

fn default_color() -> String {
    "#FF0000".to_string()
}

/// An annotation category as served for one dataset.
///
/// Loaded once per dataset and immutable for the rest of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier for the category
    pub id: CategoryId,
    /// Display name of the category
    pub name: String,
    /// Optional keyboard shortcut (a single character in practice)
    #[serde(default, rename = "shortcut_key")]
    pub shortcut_key: Option<String>,
    /// Display color as a hex string
    #[serde(default = "default_color")]
    pub color: String,
    /// Position in the category list
    #[serde(default)]
    pub sort_order: i32,
}

impl Category {
    /// Create a new category with the given ID and name.
    pub fn new(id: CategoryId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            shortcut_key: None,
            color: default_color(),
            sort_order: 0,
        }
    }

    /// Attach a shortcut character.
    pub fn with_shortcut(mut self, key: char) -> Self {
        self.shortcut_key = Some(key.to_string());
        self
    }

    /// The shortcut as a single character, if one is configured.
    ///
    /// Longer shortcut strings only match on their first character.
    pub fn shortcut(&self) -> Option<char> {
        self.shortcut_key.as_deref().and_then(|s| s.chars().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_server_category() {
        let json = r##"{"id": 3, "dataset_id": 1, "name": "armor", "shortcut_key": "a",
                        "color": "#00FF00", "sort_order": 2, "created_at": "2024-01-01T00:00:00"}"##;
        let cat: Category = serde_json::from_str(json).unwrap();
        assert_eq!(cat.id, 3);
        assert_eq!(cat.shortcut(), Some('a'));
        assert_eq!(cat.color, "#00FF00");
    }

    #[test]
    fn test_missing_optional_fields() {
        let cat: Category = serde_json::from_str(r#"{"id": 1, "name": "car"}"#).unwrap();
        assert_eq!(cat.shortcut(), None);
        assert_eq!(cat.color, "#FF0000");
        assert_eq!(cat.sort_order, 0);
    }
}
