//! In-memory assembly of the category forest.
//!
//! The input is a snapshot already fetched from storage; nothing here touches
//! the database. Each category is emitted at most once and nesting stops at
//! [`MAX_TREE_DEPTH`], so a corrupted parent chain cannot recurse forever.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::category::{CategoryNode, CategoryWithParent};

/// Deepest nesting produced by tree assembly and accepted by ancestor walks
pub const MAX_TREE_DEPTH: usize = 64;

/// Build the forest rooted at categories without a parent.
///
/// Sibling order follows the order of `categories`, so callers pass a snapshot
/// already sorted by `order` then `created_at`.
pub fn build_category_tree(categories: Vec<CategoryWithParent>) -> Vec<CategoryNode> {
    let mut roots = Vec::new();
    let mut children: HashMap<Uuid, Vec<usize>> = HashMap::new();

    for (index, entry) in categories.iter().enumerate() {
        match entry.category.parent_category_id {
            None => roots.push(index),
            Some(parent_id) => children.entry(parent_id).or_default().push(index),
        }
    }

    let mut slots: Vec<Option<CategoryWithParent>> = categories.into_iter().map(Some).collect();

    roots
        .into_iter()
        .filter_map(|index| build_node(index, &children, &mut slots, 1))
        .collect()
}

fn build_node(
    index: usize,
    children: &HashMap<Uuid, Vec<usize>>,
    slots: &mut [Option<CategoryWithParent>],
    depth: usize,
) -> Option<CategoryNode> {
    // Taking the slot marks the category as visited
    let category = slots[index].take()?;

    let subcategories = match children.get(&category.category.id) {
        Some(_) if depth >= MAX_TREE_DEPTH => {
            tracing::warn!(
                category_id = %category.category.id,
                "Category tree exceeds maximum depth, truncating"
            );
            Vec::new()
        }
        Some(child_indexes) => child_indexes
            .iter()
            .filter_map(|&child| build_node(child, children, slots, depth + 1))
            .collect(),
        None => Vec::new(),
    };

    Some(CategoryNode {
        category,
        subcategories,
    })
}
