use serde::{Deserialize, Deserializer, Serialize};

use crate::models::category::CategoryType;

/// Query parameters accepted when listing categories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryListQuery {
    /// Narrows to `income` or `expense`; any other value is ignored
    #[serde(rename = "type")]
    pub category_type: Option<String>,
    /// `true`/`1` and `false`/`0`, case-insensitive; anything else is ignored
    #[serde(default, deserialize_with = "deserialize_loose_bool")]
    pub include_inactive: Option<bool>,
}

fn deserialize_loose_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }))
}

/// Storage-level filter for owner-scoped category listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryFilter {
    pub category_type: Option<CategoryType>,
    pub include_inactive: bool,
}

impl CategoryFilter {
    pub fn of_type(category_type: CategoryType) -> Self {
        Self {
            category_type: Some(category_type),
            include_inactive: false,
        }
    }

    /// Build a filter from loosely typed query input. Unknown type strings
    /// mean "no type filter" rather than an error.
    pub fn lenient(category_type: Option<&str>, include_inactive: bool) -> Self {
        Self {
            category_type: category_type.and_then(|t| t.parse().ok()),
            include_inactive,
        }
    }

    #[cfg(test)]
    pub fn matches(&self, category: &crate::models::category::Category) -> bool {
        self.category_type
            .is_none_or(|t| t == category.category_type)
            && (self.include_inactive || category.is_active)
    }
}
