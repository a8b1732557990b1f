use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{FromRow, Type};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::validation::validate_not_blank;

/// Icon assigned to categories created without one
pub const DEFAULT_ICON: &str = "folder";

/// Color assigned to categories created without one
pub const DEFAULT_COLOR: &str = "#6366f1";

/// Whether a category classifies money coming in or going out
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash, Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Income,
    Expense,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryType::Income => "income",
            CategoryType::Expense => "expense",
        }
    }
}

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(CategoryType::Income),
            "expense" => Ok(CategoryType::Expense),
            _ => Err(()),
        }
    }
}

/// Category entity. Each (user, type) pair forms an independent forest linked
/// through `parent_category_id`; children are never stored on the parent.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, PartialEq)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub category_type: CategoryType,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub parent_category_id: Option<Uuid>,
    /// Provisioned by the system; cannot be modified or deleted
    pub is_default: bool,
    pub is_active: bool,
    #[serde(rename = "order")]
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Display fields of a parent category, resolved at read time
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ParentSummary {
    pub id: Uuid,
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
}

/// Category with its parent reference populated
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct CategoryWithParent {
    #[serde(flatten)]
    pub category: Category,
    pub parent_category: Option<ParentSummary>,
}

impl CategoryWithParent {
    /// Populate `category` against the parent it points at, if any
    #[cfg(test)]
    pub fn resolve(category: Category, parent: Option<&Category>) -> Self {
        let parent_category = parent
            .filter(|p| Some(p.id) == category.parent_category_id)
            .map(|p| ParentSummary {
                id: p.id,
                name: p.name.clone(),
                icon: p.icon.clone(),
                color: p.color.clone(),
            });

        Self {
            category,
            parent_category,
        }
    }
}

/// Single category together with its active direct children
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryDetails {
    #[serde(flatten)]
    pub category: CategoryWithParent,
    pub subcategories: Vec<Category>,
}

/// Node of the category forest
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: CategoryWithParent,
    #[schema(no_recursion)]
    pub subcategories: Vec<CategoryNode>,
}

/// Request payload for creating a category
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "name": "Groceries",
    "category_type": "expense",
    "icon": "shopping-cart",
    "color": "#22c55e",
    "parent_category": "550e8400-e29b-41d4-a716-446655440000",
    "order": 1
}))]
pub struct CreateCategoryRequest {
    #[validate(
        length(max = 100, message = "Name must be at most 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,

    pub category_type: CategoryType,

    pub icon: Option<String>,

    pub color: Option<String>,

    /// Parent category ID; empty string is treated as no parent
    pub parent_category: Option<String>,

    pub description: Option<String>,

    #[serde(rename = "order")]
    pub sort_order: Option<i32>,
}

/// Request payload for updating a category. Absent fields are left untouched;
/// `parent_category: null` clears the parent link.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "name": "Supermarket",
    "parent_category": null,
    "is_active": false
}))]
pub struct UpdateCategoryRequest {
    #[validate(
        length(max = 100, message = "Name must be at most 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: Option<String>,

    pub icon: Option<String>,

    pub color: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>)]
    pub parent_category: Option<Option<String>>,

    pub description: Option<String>,

    pub is_active: Option<bool>,

    #[serde(rename = "order")]
    pub sort_order: Option<i32>,
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`)
fn deserialize_present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// One entry of a reorder request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryOrder {
    pub id: String,
    pub order: i32,
}

/// Request payload for reordering categories
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "category_orders": [
        {"id": "550e8400-e29b-41d4-a716-446655440000", "order": 2}
    ]
}))]
pub struct ReorderCategoriesRequest {
    pub category_orders: Vec<CategoryOrder>,
}
