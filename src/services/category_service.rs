use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::category::{
    Category, CategoryDetails, CategoryNode, CategoryOrder, CategoryType, CategoryWithParent,
    CreateCategoryRequest, DEFAULT_COLOR, DEFAULT_ICON, UpdateCategoryRequest,
};
use crate::models::filters::CategoryFilter;
use crate::repositories::category_repository::{CategoryRepository, RepositoryError};
use crate::services::category_tree::{MAX_TREE_DEPTH, build_category_tree};

/// Category service errors
#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    #[error("Invalid category ID")]
    InvalidId,

    #[error("Type must be either \"income\" or \"expense\"")]
    InvalidType,

    #[error("category_orders must be an array")]
    InvalidReorderPayload,

    #[error("{0}")]
    Validation(String),

    #[error("Category cannot be its own parent")]
    SelfParent,

    #[error("Cannot create circular category reference")]
    CircularReference,

    #[error("Categories cannot be nested more than {} levels deep", MAX_TREE_DEPTH)]
    DepthExceeded,

    #[error("Cannot delete category with subcategories. Delete subcategories first.")]
    HasSubcategories,

    #[error("Category not found")]
    CategoryNotFound,

    #[error("Parent category not found or type mismatch")]
    ParentNotFound,

    #[error("Category with this name already exists for this type")]
    DuplicateName,

    #[error("Default categories cannot be modified or deleted")]
    DefaultCategory,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<RepositoryError> for CategoryError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => CategoryError::CategoryNotFound,
            RepositoryError::ConstraintViolation(_) => CategoryError::DuplicateName,
            RepositoryError::DatabaseError(msg) => CategoryError::DatabaseError(msg),
        }
    }
}

/// Trait defining category service operations. Every operation is scoped to
/// the authenticated owner; IDs arrive unparsed from the request path.
#[async_trait]
pub trait CategoryService: Send + Sync {
    /// Create a category, optionally nested under an existing one of the same type
    async fn create_category(
        &self,
        user_id: Uuid,
        request: CreateCategoryRequest,
    ) -> Result<Category, CategoryError>;

    /// List categories. Unknown type values are ignored; inactive categories
    /// are included only on request.
    async fn list_categories(
        &self,
        user_id: Uuid,
        category_type: Option<&str>,
        include_inactive: bool,
    ) -> Result<Vec<CategoryWithParent>, CategoryError>;

    /// List active categories of a type. Unlike `list_categories`, the type is
    /// mandatory and inactive categories are never included.
    async fn list_categories_by_type(
        &self,
        user_id: Uuid,
        category_type: &str,
    ) -> Result<Vec<CategoryWithParent>, CategoryError>;

    /// Get a category with its active direct children
    async fn get_category(&self, user_id: Uuid, id: &str) -> Result<CategoryDetails, CategoryError>;

    /// Active direct children of a category
    async fn get_subcategories(
        &self,
        user_id: Uuid,
        parent_id: &str,
    ) -> Result<Vec<Category>, CategoryError>;

    /// Active categories arranged as a forest
    async fn get_category_tree(
        &self,
        user_id: Uuid,
        category_type: Option<&str>,
    ) -> Result<Vec<CategoryNode>, CategoryError>;

    /// Apply a partial update. Type and owner never change.
    async fn update_category(
        &self,
        user_id: Uuid,
        id: &str,
        request: UpdateCategoryRequest,
    ) -> Result<Category, CategoryError>;

    /// Permanently delete a category that has no children
    async fn delete_category(&self, user_id: Uuid, id: &str) -> Result<(), CategoryError>;

    /// Soft delete or restore a category
    async fn set_active(
        &self,
        user_id: Uuid,
        id: &str,
        active: bool,
    ) -> Result<Category, CategoryError>;

    /// Batch update of sort keys. Not atomic; entries the owner does not own
    /// are skipped silently.
    async fn reorder_categories(
        &self,
        user_id: Uuid,
        orders: Vec<CategoryOrder>,
    ) -> Result<(), CategoryError>;
}

/// Implementation of CategoryService
pub struct CategoryServiceImpl {
    category_repository: Arc<dyn CategoryRepository>,
}

impl CategoryServiceImpl {
    pub fn new(category_repository: Arc<dyn CategoryRepository>) -> Self {
        Self {
            category_repository,
        }
    }

    fn parse_id(raw: &str) -> Result<Uuid, CategoryError> {
        Uuid::parse_str(raw.trim()).map_err(|_| CategoryError::InvalidId)
    }

    /// Empty or missing parent references mean "no parent"
    fn parse_parent(raw: Option<&str>) -> Result<Option<Uuid>, CategoryError> {
        raw.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse_id)
            .transpose()
    }

    fn normalize_name(name: &str) -> Result<String, CategoryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CategoryError::Validation(
                "name: Name must not be empty".to_string(),
            ));
        }
        Ok(name.to_string())
    }

    async fn find_owned(&self, user_id: Uuid, id: Uuid) -> Result<Category, CategoryError> {
        self.category_repository
            .find_by_id(user_id, id)
            .await?
            .ok_or(CategoryError::CategoryNotFound)
    }

    /// Parent must be owned by the same user and share the category type
    async fn find_parent(
        &self,
        user_id: Uuid,
        parent_id: Uuid,
        category_type: CategoryType,
    ) -> Result<Category, CategoryError> {
        self.category_repository
            .find_by_id(user_id, parent_id)
            .await?
            .filter(|parent| parent.category_type == category_type)
            .ok_or(CategoryError::ParentNotFound)
    }

    /// Depth of `parent` in its forest, a root being depth 1. Fails if
    /// `moving` is among its ancestors or `parent` has no room for a child.
    async fn parent_depth(
        &self,
        user_id: Uuid,
        parent: &Category,
        moving: Option<Uuid>,
    ) -> Result<usize, CategoryError> {
        let mut seen = HashSet::from([parent.id]);
        let mut next = parent.parent_category_id;

        while let Some(ancestor_id) = next {
            // A repeat means the stored chain already loops
            if Some(ancestor_id) == moving || !seen.insert(ancestor_id) {
                return Err(CategoryError::CircularReference);
            }
            if seen.len() >= MAX_TREE_DEPTH {
                warn!(parent_id = %parent.id, "Parent is already at maximum depth");
                return Err(CategoryError::DepthExceeded);
            }
            next = self
                .category_repository
                .find_by_id(user_id, ancestor_id)
                .await?
                .and_then(|ancestor| ancestor.parent_category_id);
        }

        Ok(seen.len())
    }

    /// Number of levels in the subtree rooted at `category`, itself included.
    /// Inactive descendants count since they can be restored in place.
    async fn subtree_height(
        &self,
        user_id: Uuid,
        category: &Category,
    ) -> Result<usize, CategoryError> {
        let filter = CategoryFilter {
            category_type: Some(category.category_type),
            include_inactive: true,
        };
        let snapshot = self.category_repository.find_by_user(user_id, filter).await?;

        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for entry in &snapshot {
            if let Some(parent_id) = entry.category.parent_category_id {
                children
                    .entry(parent_id)
                    .or_default()
                    .push(entry.category.id);
            }
        }

        let mut seen = HashSet::from([category.id]);
        let mut level = vec![category.id];
        let mut height = 0;
        while !level.is_empty() {
            height += 1;
            level = level
                .iter()
                .filter_map(|id| children.get(id))
                .flatten()
                .copied()
                .filter(|id| seen.insert(*id))
                .collect();
        }

        Ok(height)
    }
}

#[async_trait]
impl CategoryService for CategoryServiceImpl {
    #[instrument(skip(self, user_id, request), fields(user_id = %user_id))]
    async fn create_category(
        &self,
        user_id: Uuid,
        request: CreateCategoryRequest,
    ) -> Result<Category, CategoryError> {
        let name = Self::normalize_name(&request.name)?;
        let parent_id = Self::parse_parent(request.parent_category.as_deref())?;

        if let Some(parent_id) = parent_id {
            let parent = self
                .find_parent(user_id, parent_id, request.category_type)
                .await?;
            self.parent_depth(user_id, &parent, None).await?;
        }

        if self
            .category_repository
            .find_by_name(user_id, &name, request.category_type, None)
            .await?
            .is_some()
        {
            warn!(%name, "Rejected duplicate category name");
            return Err(CategoryError::DuplicateName);
        }

        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4(),
            user_id,
            name,
            category_type: request.category_type,
            icon: Some(request.icon.unwrap_or_else(|| DEFAULT_ICON.to_string())),
            color: Some(request.color.unwrap_or_else(|| DEFAULT_COLOR.to_string())),
            description: request.description.map(|d| d.trim().to_string()),
            parent_category_id: parent_id,
            is_default: false,
            is_active: true,
            sort_order: request.sort_order.unwrap_or(0),
            created_at: now,
            updated_at: now,
        };

        // The unique constraint still catches a concurrent insert of the same name
        let category = self.category_repository.create(category).await?;
        info!(category_id = %category.id, "Category created");
        Ok(category)
    }

    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    async fn list_categories(
        &self,
        user_id: Uuid,
        category_type: Option<&str>,
        include_inactive: bool,
    ) -> Result<Vec<CategoryWithParent>, CategoryError> {
        let filter = CategoryFilter::lenient(category_type, include_inactive);
        Ok(self
            .category_repository
            .find_by_user(user_id, filter)
            .await?)
    }

    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    async fn list_categories_by_type(
        &self,
        user_id: Uuid,
        category_type: &str,
    ) -> Result<Vec<CategoryWithParent>, CategoryError> {
        let category_type: CategoryType = category_type
            .parse()
            .map_err(|_| CategoryError::InvalidType)?;

        Ok(self
            .category_repository
            .find_by_user(user_id, CategoryFilter::of_type(category_type))
            .await?)
    }

    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    async fn get_category(&self, user_id: Uuid, id: &str) -> Result<CategoryDetails, CategoryError> {
        let id = Self::parse_id(id)?;

        let category = self
            .category_repository
            .find_with_parent(user_id, id)
            .await?
            .ok_or(CategoryError::CategoryNotFound)?;
        let subcategories = self.category_repository.find_children(user_id, id).await?;

        Ok(CategoryDetails {
            category,
            subcategories,
        })
    }

    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    async fn get_subcategories(
        &self,
        user_id: Uuid,
        parent_id: &str,
    ) -> Result<Vec<Category>, CategoryError> {
        let parent_id = Self::parse_id(parent_id)?;

        self.category_repository
            .find_by_id(user_id, parent_id)
            .await?
            .ok_or(CategoryError::ParentNotFound)?;

        Ok(self
            .category_repository
            .find_children(user_id, parent_id)
            .await?)
    }

    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    async fn get_category_tree(
        &self,
        user_id: Uuid,
        category_type: Option<&str>,
    ) -> Result<Vec<CategoryNode>, CategoryError> {
        let snapshot = self
            .category_repository
            .find_by_user(user_id, CategoryFilter::lenient(category_type, false))
            .await?;

        Ok(build_category_tree(snapshot))
    }

    #[instrument(skip(self, user_id, request), fields(user_id = %user_id))]
    async fn update_category(
        &self,
        user_id: Uuid,
        id: &str,
        request: UpdateCategoryRequest,
    ) -> Result<Category, CategoryError> {
        let id = Self::parse_id(id)?;
        let mut category = self.find_owned(user_id, id).await?;

        if category.is_default {
            warn!(category_id = %id, "Rejected update of default category");
            return Err(CategoryError::DefaultCategory);
        }

        if let Some(parent) = request.parent_category {
            let parent_id = Self::parse_parent(parent.as_deref())?;

            if let Some(parent_id) = parent_id {
                if parent_id == id {
                    return Err(CategoryError::SelfParent);
                }
                let parent = self
                    .find_parent(user_id, parent_id, category.category_type)
                    .await?;
                let depth = self.parent_depth(user_id, &parent, Some(id)).await?;
                if depth + self.subtree_height(user_id, &category).await? > MAX_TREE_DEPTH {
                    warn!(category_id = %id, parent_id = %parent_id, "Rejected move below maximum depth");
                    return Err(CategoryError::DepthExceeded);
                }
            }

            category.parent_category_id = parent_id;
        }

        if let Some(name) = request.name {
            let name = Self::normalize_name(&name)?;
            if name != category.name {
                if self
                    .category_repository
                    .find_by_name(user_id, &name, category.category_type, Some(id))
                    .await?
                    .is_some()
                {
                    return Err(CategoryError::DuplicateName);
                }
                category.name = name;
            }
        }

        if let Some(icon) = request.icon {
            category.icon = Some(icon);
        }
        if let Some(color) = request.color {
            category.color = Some(color);
        }
        if let Some(description) = request.description {
            category.description = Some(description.trim().to_string());
        }
        if let Some(is_active) = request.is_active {
            category.is_active = is_active;
        }
        if let Some(order) = request.sort_order {
            category.sort_order = order;
        }

        let category = self.category_repository.update(category).await?;
        info!(category_id = %category.id, "Category updated");
        Ok(category)
    }

    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    async fn delete_category(&self, user_id: Uuid, id: &str) -> Result<(), CategoryError> {
        let id = Self::parse_id(id)?;
        let category = self.find_owned(user_id, id).await?;

        if category.is_default {
            warn!(category_id = %id, "Rejected delete of default category");
            return Err(CategoryError::DefaultCategory);
        }

        // Inactive children still block deletion; there is no cascade
        if self.category_repository.count_children(user_id, id).await? > 0 {
            return Err(CategoryError::HasSubcategories);
        }

        self.category_repository.delete(user_id, id).await?;
        info!(category_id = %id, "Category deleted");
        Ok(())
    }

    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    async fn set_active(
        &self,
        user_id: Uuid,
        id: &str,
        active: bool,
    ) -> Result<Category, CategoryError> {
        let id = Self::parse_id(id)?;

        let category = self
            .category_repository
            .set_active(user_id, id, active)
            .await?
            .ok_or(CategoryError::CategoryNotFound)?;

        info!(category_id = %id, active, "Category active flag changed");
        Ok(category)
    }

    #[instrument(skip(self, user_id, orders), fields(user_id = %user_id, entries = orders.len()))]
    async fn reorder_categories(
        &self,
        user_id: Uuid,
        orders: Vec<CategoryOrder>,
    ) -> Result<(), CategoryError> {
        // Malformed IDs can never match an owned row, so they are skipped
        // like IDs belonging to someone else.
        let orders: Vec<(Uuid, i32)> = orders
            .into_iter()
            .filter_map(|entry| Self::parse_id(&entry.id).ok().map(|id| (id, entry.order)))
            .collect();

        let updated = self
            .category_repository
            .update_orders(user_id, &orders)
            .await?;

        info!(updated, "Categories reordered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockCategoryRepository;

    fn service() -> (Arc<MockCategoryRepository>, CategoryServiceImpl) {
        let repo = Arc::new(MockCategoryRepository::new());
        (repo.clone(), CategoryServiceImpl::new(repo))
    }

    fn request(name: &str, category_type: CategoryType, parent: Option<Uuid>) -> CreateCategoryRequest {
        CreateCategoryRequest {
            name: name.to_string(),
            category_type,
            icon: None,
            color: None,
            parent_category: parent.map(|p| p.to_string()),
            description: None,
            sort_order: None,
        }
    }

    async fn create(
        service: &CategoryServiceImpl,
        user_id: Uuid,
        name: &str,
        parent: Option<Uuid>,
    ) -> Category {
        service
            .create_category(user_id, request(name, CategoryType::Expense, parent))
            .await
            .unwrap()
    }

    fn set_parent(parent: Option<Uuid>) -> UpdateCategoryRequest {
        UpdateCategoryRequest {
            parent_category: Some(parent.map(|p| p.to_string())),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_category_applies_defaults() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let mut req = request("  Food  ", CategoryType::Expense, None);
        req.parent_category = Some(String::new());
        let category = service.create_category(user_id, req).await.unwrap();

        assert_eq!(category.name, "Food");
        assert_eq!(category.user_id, user_id);
        assert!(category.is_active);
        assert!(!category.is_default);
        assert_eq!(category.sort_order, 0);
        assert_eq!(category.parent_category_id, None);
        assert_eq!(category.icon.as_deref(), Some(DEFAULT_ICON));
        assert_eq!(category.color.as_deref(), Some(DEFAULT_COLOR));
    }

    #[tokio::test]
    async fn test_create_duplicate_name_conflicts_per_type() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        create(&service, user_id, "Other", None).await;

        let result = service
            .create_category(user_id, request("Other", CategoryType::Expense, None))
            .await;
        assert!(matches!(result, Err(CategoryError::DuplicateName)));

        // Same name is fine for the other type and for other users
        assert!(
            service
                .create_category(user_id, request("Other", CategoryType::Income, None))
                .await
                .is_ok()
        );
        assert!(
            service
                .create_category(Uuid::new_v4(), request("Other", CategoryType::Expense, None))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_unique_constraint_reports_duplicate_on_create() {
        let repo = Arc::new(MockCategoryRepository::with_stale_name_lookup());
        let service = CategoryServiceImpl::new(repo.clone());
        let user_id = Uuid::new_v4();

        create(&service, user_id, "Rent", None).await;

        // The lookup misses, so the write itself must be refused
        let result = service
            .create_category(user_id, request("Rent", CategoryType::Expense, None))
            .await;
        assert!(matches!(result, Err(CategoryError::DuplicateName)));

        let all = service.list_categories(user_id, None, true).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_unique_constraint_reports_duplicate_on_update() {
        let repo = Arc::new(MockCategoryRepository::with_stale_name_lookup());
        let service = CategoryServiceImpl::new(repo.clone());
        let user_id = Uuid::new_v4();

        create(&service, user_id, "Rent", None).await;
        let utilities = create(&service, user_id, "Utilities", None).await;

        let result = service
            .update_category(
                user_id,
                &utilities.id.to_string(),
                UpdateCategoryRequest {
                    name: Some("Rent".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(CategoryError::DuplicateName)));
        assert_eq!(repo.get(utilities.id).unwrap().name, "Utilities");
    }

    #[tokio::test]
    async fn test_create_with_parent_requires_same_owner_and_type() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();
        let other_user = Uuid::new_v4();

        let food = create(&service, user_id, "Food", None).await;
        let salary = service
            .create_category(user_id, request("Salary", CategoryType::Income, None))
            .await
            .unwrap();

        let child = create(&service, user_id, "Groceries", Some(food.id)).await;
        assert_eq!(child.parent_category_id, Some(food.id));

        let wrong_type = service
            .create_category(user_id, request("Bonus", CategoryType::Expense, Some(salary.id)))
            .await;
        assert!(matches!(wrong_type, Err(CategoryError::ParentNotFound)));

        let wrong_owner = service
            .create_category(other_user, request("Snacks", CategoryType::Expense, Some(food.id)))
            .await;
        assert!(matches!(wrong_owner, Err(CategoryError::ParentNotFound)));

        let mut malformed = request("Snacks", CategoryType::Expense, None);
        malformed.parent_category = Some("not-a-uuid".to_string());
        assert!(matches!(
            service.create_category(user_id, malformed).await,
            Err(CategoryError::InvalidId)
        ));
    }

    #[tokio::test]
    async fn test_create_blank_name_rejected() {
        let (_, service) = service();
        let result = service
            .create_category(Uuid::new_v4(), request("   ", CategoryType::Expense, None))
            .await;
        assert!(matches!(result, Err(CategoryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_categories_filters_and_sorts() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let food = create(&service, user_id, "Food", None).await;
        let mut later = request("Housing", CategoryType::Expense, None);
        later.sort_order = Some(5);
        service.create_category(user_id, later).await.unwrap();
        let mut first = request("Travel", CategoryType::Expense, None);
        first.sort_order = Some(-1);
        service.create_category(user_id, first).await.unwrap();
        let groceries = create(&service, user_id, "Groceries", Some(food.id)).await;
        service
            .create_category(user_id, request("Salary", CategoryType::Income, None))
            .await
            .unwrap();
        service
            .set_active(user_id, &groceries.id.to_string(), false)
            .await
            .unwrap();
        create(&service, Uuid::new_v4(), "Elsewhere", None).await;

        let expenses = service
            .list_categories(user_id, Some("expense"), false)
            .await
            .unwrap();
        let names: Vec<_> = expenses.iter().map(|c| c.category.name.as_str()).collect();
        assert_eq!(names, vec!["Travel", "Food", "Housing"]);

        let everything = service.list_categories(user_id, None, true).await.unwrap();
        assert_eq!(everything.len(), 5);
        let populated = everything
            .iter()
            .find(|c| c.category.id == groceries.id)
            .unwrap();
        assert_eq!(populated.parent_category.as_ref().unwrap().name, "Food");

        // Unknown type is ignored rather than rejected
        let unfiltered = service
            .list_categories(user_id, Some("savings"), false)
            .await
            .unwrap();
        assert_eq!(unfiltered.len(), 4);
    }

    #[tokio::test]
    async fn test_list_categories_by_type_is_strict_and_active_only() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let food = create(&service, user_id, "Food", None).await;
        create(&service, user_id, "Travel", None).await;
        service
            .set_active(user_id, &food.id.to_string(), false)
            .await
            .unwrap();

        let result = service
            .list_categories_by_type(user_id, "expense")
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].category.name, "Travel");

        assert!(matches!(
            service.list_categories_by_type(user_id, "savings").await,
            Err(CategoryError::InvalidType)
        ));
    }

    #[tokio::test]
    async fn test_get_category_includes_active_subcategories() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let food = create(&service, user_id, "Food", None).await;
        let groceries = create(&service, user_id, "Groceries", Some(food.id)).await;
        let snacks = create(&service, user_id, "Snacks", Some(food.id)).await;
        service
            .set_active(user_id, &snacks.id.to_string(), false)
            .await
            .unwrap();

        let details = service
            .get_category(user_id, &food.id.to_string())
            .await
            .unwrap();
        assert_eq!(details.category.category.id, food.id);
        assert_eq!(details.subcategories.len(), 1);
        assert_eq!(details.subcategories[0].id, groceries.id);

        assert!(matches!(
            service.get_category(user_id, "123").await,
            Err(CategoryError::InvalidId)
        ));
        assert!(matches!(
            service
                .get_category(Uuid::new_v4(), &food.id.to_string())
                .await,
            Err(CategoryError::CategoryNotFound)
        ));
    }

    #[tokio::test]
    async fn test_food_groceries_scenario() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let food = create(&service, user_id, "Food", None).await;
        let groceries = create(&service, user_id, "Groceries", Some(food.id)).await;

        let children = service
            .get_subcategories(user_id, &food.id.to_string())
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, groceries.id);

        assert!(matches!(
            service.delete_category(user_id, &food.id.to_string()).await,
            Err(CategoryError::HasSubcategories)
        ));

        service
            .delete_category(user_id, &groceries.id.to_string())
            .await
            .unwrap();
        service
            .delete_category(user_id, &food.id.to_string())
            .await
            .unwrap();

        assert!(matches!(
            service.get_category(user_id, &food.id.to_string()).await,
            Err(CategoryError::CategoryNotFound)
        ));
    }

    #[tokio::test]
    async fn test_get_subcategories_requires_owned_parent() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();
        let food = create(&service, user_id, "Food", None).await;

        assert!(matches!(
            service
                .get_subcategories(Uuid::new_v4(), &food.id.to_string())
                .await,
            Err(CategoryError::ParentNotFound)
        ));
        assert!(matches!(
            service.get_subcategories(user_id, "nope").await,
            Err(CategoryError::InvalidId)
        ));
    }

    #[tokio::test]
    async fn test_delete_blocked_by_inactive_child() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let food = create(&service, user_id, "Food", None).await;
        let groceries = create(&service, user_id, "Groceries", Some(food.id)).await;
        service
            .set_active(user_id, &groceries.id.to_string(), false)
            .await
            .unwrap();

        assert!(matches!(
            service.delete_category(user_id, &food.id.to_string()).await,
            Err(CategoryError::HasSubcategories)
        ));
    }

    #[tokio::test]
    async fn test_default_category_cannot_be_updated_or_deleted() {
        let (repo, service) = service();
        let user_id = Uuid::new_v4();

        let food = create(&service, user_id, "Food", None).await;
        let mut seeded = food.clone();
        seeded.id = Uuid::new_v4();
        seeded.name = "Uncategorized".to_string();
        seeded.is_default = true;
        repo.insert(seeded.clone());

        let update = UpdateCategoryRequest {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service
                .update_category(user_id, &seeded.id.to_string(), update)
                .await,
            Err(CategoryError::DefaultCategory)
        ));
        assert!(matches!(
            service
                .delete_category(user_id, &seeded.id.to_string())
                .await,
            Err(CategoryError::DefaultCategory)
        ));

        // Toggling the active flag is still allowed
        let toggled = service
            .set_active(user_id, &seeded.id.to_string(), false)
            .await
            .unwrap();
        assert!(!toggled.is_active);
    }

    #[tokio::test]
    async fn test_update_rejects_self_parent() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();
        let food = create(&service, user_id, "Food", None).await;

        let result = service
            .update_category(user_id, &food.id.to_string(), set_parent(Some(food.id)))
            .await;
        assert!(matches!(result, Err(CategoryError::SelfParent)));
    }

    #[tokio::test]
    async fn test_update_rejects_direct_cycle() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let a = create(&service, user_id, "A", None).await;
        let b = create(&service, user_id, "B", Some(a.id)).await;

        let result = service
            .update_category(user_id, &a.id.to_string(), set_parent(Some(b.id)))
            .await;
        assert!(matches!(result, Err(CategoryError::CircularReference)));
    }

    #[tokio::test]
    async fn test_update_rejects_deep_cycle() {
        let (repo, service) = service();
        let user_id = Uuid::new_v4();

        let a = create(&service, user_id, "A", None).await;
        let b = create(&service, user_id, "B", Some(a.id)).await;
        let c = create(&service, user_id, "C", Some(b.id)).await;

        let result = service
            .update_category(user_id, &a.id.to_string(), set_parent(Some(c.id)))
            .await;
        assert!(matches!(result, Err(CategoryError::CircularReference)));
        assert_eq!(repo.get(a.id).unwrap().parent_category_id, None);
    }

    /// Build a single chain `levels` deep and return it root first
    async fn chain(service: &CategoryServiceImpl, user_id: Uuid, levels: usize) -> Vec<Category> {
        let mut nodes: Vec<Category> = Vec::with_capacity(levels);
        for level in 1..=levels {
            let parent = nodes.last().map(|c| c.id);
            nodes.push(create(service, user_id, &format!("Level {}", level), parent).await);
        }
        nodes
    }

    fn tree_depth(node: &CategoryNode) -> usize {
        1 + node.subcategories.iter().map(tree_depth).max().unwrap_or(0)
    }

    fn tree_size(node: &CategoryNode) -> usize {
        1 + node.subcategories.iter().map(tree_size).sum::<usize>()
    }

    #[tokio::test]
    async fn test_create_rejects_nesting_beyond_max_depth() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let nodes = chain(&service, user_id, MAX_TREE_DEPTH).await;
        let deepest = nodes.last().unwrap();

        let result = service
            .create_category(user_id, request("Too deep", CategoryType::Expense, Some(deepest.id)))
            .await;
        assert!(matches!(result, Err(CategoryError::DepthExceeded)));

        // Everything that was accepted is reachable in the tree
        let tree = service.get_category_tree(user_id, None).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree_depth(&tree[0]), MAX_TREE_DEPTH);
        assert_eq!(tree_size(&tree[0]), MAX_TREE_DEPTH);
    }

    #[tokio::test]
    async fn test_update_rejects_move_beyond_max_depth() {
        let (repo, service) = service();
        let user_id = Uuid::new_v4();

        let nodes = chain(&service, user_id, MAX_TREE_DEPTH - 1).await;
        let deepest = nodes[MAX_TREE_DEPTH - 2].clone();
        let loose = create(&service, user_id, "Loose", None).await;
        let branch = create(&service, user_id, "Branch", None).await;
        create(&service, user_id, "Leaf", Some(branch.id)).await;

        // A single category fills the last free level
        service
            .update_category(user_id, &loose.id.to_string(), set_parent(Some(deepest.id)))
            .await
            .unwrap();

        // A two-level subtree does not fit there, nor under the now full chain
        for parent in [deepest.id, loose.id] {
            let result = service
                .update_category(user_id, &branch.id.to_string(), set_parent(Some(parent)))
                .await;
            assert!(matches!(result, Err(CategoryError::DepthExceeded)));
        }
        assert_eq!(repo.get(branch.id).unwrap().parent_category_id, None);

        // One level higher it fits exactly
        let moved = service
            .update_category(
                user_id,
                &branch.id.to_string(),
                set_parent(Some(nodes[MAX_TREE_DEPTH - 3].id)),
            )
            .await
            .unwrap();
        assert_eq!(moved.parent_category_id, Some(nodes[MAX_TREE_DEPTH - 3].id));
    }

    #[tokio::test]
    async fn test_update_parent_must_match_owner_and_type() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let food = create(&service, user_id, "Food", None).await;
        let salary = service
            .create_category(user_id, request("Salary", CategoryType::Income, None))
            .await
            .unwrap();
        let foreign = create(&service, Uuid::new_v4(), "Foreign", None).await;

        for parent in [salary.id, foreign.id] {
            let result = service
                .update_category(user_id, &food.id.to_string(), set_parent(Some(parent)))
                .await;
            assert!(matches!(result, Err(CategoryError::ParentNotFound)));
        }
    }

    #[tokio::test]
    async fn test_update_moves_and_clears_parent() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let food = create(&service, user_id, "Food", None).await;
        let groceries = create(&service, user_id, "Groceries", None).await;

        let moved = service
            .update_category(user_id, &groceries.id.to_string(), set_parent(Some(food.id)))
            .await
            .unwrap();
        assert_eq!(moved.parent_category_id, Some(food.id));

        let cleared = service
            .update_category(user_id, &groceries.id.to_string(), set_parent(None))
            .await
            .unwrap();
        assert_eq!(cleared.parent_category_id, None);

        // Absent parent leaves the link untouched
        service
            .update_category(user_id, &groceries.id.to_string(), set_parent(Some(food.id)))
            .await
            .unwrap();
        let renamed = service
            .update_category(
                user_id,
                &groceries.id.to_string(),
                UpdateCategoryRequest {
                    name: Some("Supermarket".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.parent_category_id, Some(food.id));
        assert_eq!(renamed.name, "Supermarket");
    }

    #[tokio::test]
    async fn test_update_name_conflict_and_same_name() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let food = create(&service, user_id, "Food", None).await;
        create(&service, user_id, "Travel", None).await;

        let conflict = service
            .update_category(
                user_id,
                &food.id.to_string(),
                UpdateCategoryRequest {
                    name: Some("Travel".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(conflict, Err(CategoryError::DuplicateName)));

        let unchanged = service
            .update_category(
                user_id,
                &food.id.to_string(),
                UpdateCategoryRequest {
                    name: Some("Food".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(unchanged.is_ok());
    }

    #[tokio::test]
    async fn test_update_applies_only_provided_fields() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let mut req = request("Food", CategoryType::Expense, None);
        req.description = Some("Meals".to_string());
        req.sort_order = Some(4);
        let food = service.create_category(user_id, req).await.unwrap();

        let updated = service
            .update_category(
                user_id,
                &food.id.to_string(),
                UpdateCategoryRequest {
                    is_active: Some(false),
                    color: Some("#000000".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!updated.is_active);
        assert_eq!(updated.color.as_deref(), Some("#000000"));
        assert_eq!(updated.description.as_deref(), Some("Meals"));
        assert_eq!(updated.sort_order, 4);
        assert_eq!(updated.icon.as_deref(), Some(DEFAULT_ICON));
        assert_eq!(updated.category_type, CategoryType::Expense);
        assert_eq!(updated.user_id, user_id);
    }

    #[tokio::test]
    async fn test_update_errors() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        assert!(matches!(
            service
                .update_category(user_id, "bad", UpdateCategoryRequest::default())
                .await,
            Err(CategoryError::InvalidId)
        ));
        assert!(matches!(
            service
                .update_category(
                    user_id,
                    &Uuid::new_v4().to_string(),
                    UpdateCategoryRequest::default()
                )
                .await,
            Err(CategoryError::CategoryNotFound)
        ));
    }

    #[tokio::test]
    async fn test_set_active_round_trip() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();
        let food = create(&service, user_id, "Food", None).await;

        let inactive = service
            .set_active(user_id, &food.id.to_string(), false)
            .await
            .unwrap();
        assert!(!inactive.is_active);
        let active = service
            .set_active(user_id, &food.id.to_string(), true)
            .await
            .unwrap();
        assert!(active.is_active);

        assert!(matches!(
            service
                .set_active(Uuid::new_v4(), &food.id.to_string(), false)
                .await,
            Err(CategoryError::CategoryNotFound)
        ));
    }

    #[tokio::test]
    async fn test_reorder_skips_foreign_and_malformed_ids() {
        let (repo, service) = service();
        let user_id = Uuid::new_v4();

        let a = create(&service, user_id, "A", None).await;
        let foreign = create(&service, Uuid::new_v4(), "Foreign", None).await;

        service
            .reorder_categories(
                user_id,
                vec![
                    CategoryOrder {
                        id: a.id.to_string(),
                        order: 2,
                    },
                    CategoryOrder {
                        id: foreign.id.to_string(),
                        order: 5,
                    },
                    CategoryOrder {
                        id: "not-owned-id".to_string(),
                        order: 7,
                    },
                ],
            )
            .await
            .unwrap();

        assert_eq!(repo.get(a.id).unwrap().sort_order, 2);
        assert_eq!(repo.get(foreign.id).unwrap().sort_order, 0);
    }

    #[tokio::test]
    async fn test_category_tree_matches_active_forest() {
        let (_, service) = service();
        let user_id = Uuid::new_v4();

        let food = create(&service, user_id, "Food", None).await;
        let groceries = create(&service, user_id, "Groceries", Some(food.id)).await;
        create(&service, user_id, "Produce", Some(groceries.id)).await;
        let hidden = create(&service, user_id, "Hidden", Some(food.id)).await;
        service
            .set_active(user_id, &hidden.id.to_string(), false)
            .await
            .unwrap();
        service
            .create_category(user_id, request("Salary", CategoryType::Income, None))
            .await
            .unwrap();

        let tree = service.get_category_tree(user_id, None).await.unwrap();
        let roots: Vec<_> = tree.iter().map(|n| n.category.category.name.as_str()).collect();
        assert_eq!(roots, vec!["Food", "Salary"]);
        assert_eq!(tree[0].subcategories.len(), 1);
        assert_eq!(tree[0].subcategories[0].category.category.name, "Groceries");
        assert_eq!(
            tree[0].subcategories[0].subcategories[0].category.category.name,
            "Produce"
        );

        let expense_tree = service
            .get_category_tree(user_id, Some("expense"))
            .await
            .unwrap();
        assert_eq!(expense_tree.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_maps_to_database_error() {
        let repo = Arc::new(MockCategoryRepository::with_failure());
        let service = CategoryServiceImpl::new(repo);

        let result = service.list_categories(Uuid::new_v4(), None, false).await;
        assert!(matches!(result, Err(CategoryError::DatabaseError(_))));
    }
}
