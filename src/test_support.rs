//! In-memory repositories shared by unit tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::category::{Category, CategoryType, CategoryWithParent};
use crate::models::filters::CategoryFilter;
use crate::models::user::{CreateUserRequest, User};
use crate::repositories::category_repository::{CategoryRepository, RepositoryError};
use crate::repositories::user_repository::{self, UserRepository};

/// Mock CategoryRepository keeping rows in insertion order
pub struct MockCategoryRepository {
    categories: Mutex<Vec<Category>>,
    should_fail: bool,
    stale_name_lookup: bool,
}

impl MockCategoryRepository {
    pub fn new() -> Self {
        Self {
            categories: Mutex::new(Vec::new()),
            should_fail: false,
            stale_name_lookup: false,
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    /// Name lookups always miss, as if a concurrent insert landed between the
    /// lookup and the write. Only the unique constraint is left to object.
    pub fn with_stale_name_lookup() -> Self {
        Self {
            stale_name_lookup: true,
            ..Self::new()
        }
    }

    /// Insert a row directly, bypassing service validation
    pub fn insert(&self, category: Category) {
        self.categories.lock().unwrap().push(category);
    }

    pub fn get(&self, id: Uuid) -> Option<Category> {
        self.categories
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.should_fail {
            return Err(RepositoryError::DatabaseError(
                "Database connection failed".to_string(),
            ));
        }
        Ok(())
    }

    fn populate(categories: &[Category], category: &Category) -> CategoryWithParent {
        let parent = category
            .parent_category_id
            .and_then(|pid| categories.iter().find(|c| c.id == pid));
        CategoryWithParent::resolve(category.clone(), parent)
    }

    fn sorted(mut categories: Vec<Category>) -> Vec<Category> {
        categories.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(a.created_at.cmp(&b.created_at))
        });
        categories
    }
}

#[async_trait]
impl CategoryRepository for MockCategoryRepository {
    async fn create(&self, category: Category) -> Result<Category, RepositoryError> {
        self.check()?;
        let mut categories = self.categories.lock().unwrap();

        if categories.iter().any(|c| {
            c.user_id == category.user_id
                && c.name == category.name
                && c.category_type == category.category_type
        }) {
            return Err(RepositoryError::ConstraintViolation(
                "Category with this name already exists for this type".to_string(),
            ));
        }

        // Spread creation times so ordering ties are deterministic
        let mut category = category;
        category.created_at = Utc::now() + Duration::milliseconds(categories.len() as i64);
        categories.push(category.clone());
        Ok(category)
    }

    async fn find_by_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Category>, RepositoryError> {
        self.check()?;
        let categories = self.categories.lock().unwrap();
        Ok(categories
            .iter()
            .find(|c| c.id == id && c.user_id == user_id)
            .cloned())
    }

    async fn find_with_parent(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CategoryWithParent>, RepositoryError> {
        self.check()?;
        let categories = self.categories.lock().unwrap();
        Ok(categories
            .iter()
            .find(|c| c.id == id && c.user_id == user_id)
            .map(|c| Self::populate(&categories, c)))
    }

    async fn find_by_name(
        &self,
        user_id: Uuid,
        name: &str,
        category_type: CategoryType,
        exclude_id: Option<Uuid>,
    ) -> Result<Option<Category>, RepositoryError> {
        self.check()?;
        if self.stale_name_lookup {
            return Ok(None);
        }
        let categories = self.categories.lock().unwrap();
        Ok(categories
            .iter()
            .find(|c| {
                c.user_id == user_id
                    && c.name == name
                    && c.category_type == category_type
                    && Some(c.id) != exclude_id
            })
            .cloned())
    }

    async fn find_by_user(
        &self,
        user_id: Uuid,
        filter: CategoryFilter,
    ) -> Result<Vec<CategoryWithParent>, RepositoryError> {
        self.check()?;
        let categories = self.categories.lock().unwrap();
        let matching = categories
            .iter()
            .filter(|c| c.user_id == user_id && filter.matches(c))
            .cloned()
            .collect();
        Ok(Self::sorted(matching)
            .iter()
            .map(|c| Self::populate(&categories, c))
            .collect())
    }

    async fn find_children(
        &self,
        user_id: Uuid,
        parent_id: Uuid,
    ) -> Result<Vec<Category>, RepositoryError> {
        self.check()?;
        let categories = self.categories.lock().unwrap();
        Ok(Self::sorted(
            categories
                .iter()
                .filter(|c| {
                    c.user_id == user_id && c.parent_category_id == Some(parent_id) && c.is_active
                })
                .cloned()
                .collect(),
        ))
    }

    async fn count_children(&self, user_id: Uuid, parent_id: Uuid) -> Result<i64, RepositoryError> {
        self.check()?;
        let categories = self.categories.lock().unwrap();
        Ok(categories
            .iter()
            .filter(|c| c.user_id == user_id && c.parent_category_id == Some(parent_id))
            .count() as i64)
    }

    async fn update(&self, category: Category) -> Result<Category, RepositoryError> {
        self.check()?;
        let mut categories = self.categories.lock().unwrap();

        if categories.iter().any(|c| {
            c.id != category.id
                && c.user_id == category.user_id
                && c.name == category.name
                && c.category_type == category.category_type
        }) {
            return Err(RepositoryError::ConstraintViolation(
                "Category with this name already exists for this type".to_string(),
            ));
        }

        let existing = categories
            .iter_mut()
            .find(|c| c.id == category.id && c.user_id == category.user_id)
            .ok_or(RepositoryError::NotFound)?;
        existing.name = category.name;
        existing.icon = category.icon;
        existing.color = category.color;
        existing.description = category.description;
        existing.parent_category_id = category.parent_category_id;
        existing.is_active = category.is_active;
        existing.sort_order = category.sort_order;
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn set_active(
        &self,
        user_id: Uuid,
        id: Uuid,
        active: bool,
    ) -> Result<Option<Category>, RepositoryError> {
        self.check()?;
        let mut categories = self.categories.lock().unwrap();
        Ok(categories
            .iter_mut()
            .find(|c| c.id == id && c.user_id == user_id)
            .map(|c| {
                c.is_active = active;
                c.updated_at = Utc::now();
                c.clone()
            }))
    }

    async fn update_orders(
        &self,
        user_id: Uuid,
        orders: &[(Uuid, i32)],
    ) -> Result<u64, RepositoryError> {
        self.check()?;
        let mut categories = self.categories.lock().unwrap();
        let mut updated = 0;
        for (id, order) in orders {
            if let Some(c) = categories
                .iter_mut()
                .find(|c| c.id == *id && c.user_id == user_id)
            {
                c.sort_order = *order;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), RepositoryError> {
        self.check()?;
        let mut categories = self.categories.lock().unwrap();
        let before = categories.len();
        categories.retain(|c| !(c.id == id && c.user_id == user_id));
        if categories.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Mock UserRepository
pub struct MockUserRepository {
    users: Mutex<Vec<User>>,
}

impl MockUserRepository {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(Vec::new()),
        }
    }

    /// Pending verification token for `email`, standing in for the mailbox
    pub fn verification_token(&self, email: &str) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .and_then(|u| u.verification_token.clone())
    }

    pub fn deactivate(&self, id: Uuid) {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            user.is_active = false;
        }
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn create(
        &self,
        user: CreateUserRequest,
        password_hash: String,
        verification_token: String,
    ) -> Result<User, user_repository::RepositoryError> {
        let mut users = self.users.lock().unwrap();

        if users.iter().any(|u| u.email == user.email) {
            return Err(user_repository::RepositoryError::ConstraintViolation(
                "Email already exists".to_string(),
            ));
        }

        let new_user = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash,
            default_currency: user.default_currency.unwrap_or_else(|| "USD".to_string()),
            is_active: true,
            is_verified: false,
            verification_token: Some(verification_token),
            created_at: Utc::now(),
        };

        users.push(new_user.clone());
        Ok(new_user)
    }

    async fn find_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, user_repository::RepositoryError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, user_repository::RepositoryError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn verify(&self, token: &str) -> Result<Option<User>, user_repository::RepositoryError> {
        let mut users = self.users.lock().unwrap();
        Ok(users
            .iter_mut()
            .find(|u| u.verification_token.as_deref() == Some(token))
            .map(|u| {
                u.is_verified = true;
                u.verification_token = None;
                u.clone()
            }))
    }
}
