use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::category::{Category, CategoryType, CategoryWithParent, ParentSummary};
use crate::models::filters::CategoryFilter;

/// Repository errors for database operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Resource not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                RepositoryError::ConstraintViolation(
                    "Category with this name already exists for this type".to_string(),
                )
            }
            e => RepositoryError::DatabaseError(e.to_string()),
        }
    }
}

/// Trait defining category repository operations. Every lookup and write is
/// scoped to the owning user.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Insert a new category
    async fn create(&self, category: Category) -> Result<Category, RepositoryError>;

    /// Find a category by ID
    async fn find_by_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Category>, RepositoryError>;

    /// Find a category by ID with its parent populated
    async fn find_with_parent(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CategoryWithParent>, RepositoryError>;

    /// Find a category by exact name within a type, optionally ignoring one ID
    async fn find_by_name(
        &self,
        user_id: Uuid,
        name: &str,
        category_type: CategoryType,
        exclude_id: Option<Uuid>,
    ) -> Result<Option<Category>, RepositoryError>;

    /// List categories with parents populated, sorted by order then creation time
    async fn find_by_user(
        &self,
        user_id: Uuid,
        filter: CategoryFilter,
    ) -> Result<Vec<CategoryWithParent>, RepositoryError>;

    /// Active direct children of a category, sorted by order then creation time
    async fn find_children(
        &self,
        user_id: Uuid,
        parent_id: Uuid,
    ) -> Result<Vec<Category>, RepositoryError>;

    /// Number of direct children regardless of their active flag
    async fn count_children(&self, user_id: Uuid, parent_id: Uuid) -> Result<i64, RepositoryError>;

    /// Persist the mutable fields of an existing category
    async fn update(&self, category: Category) -> Result<Category, RepositoryError>;

    /// Flip the active flag, returning the updated record if it exists
    async fn set_active(
        &self,
        user_id: Uuid,
        id: Uuid,
        active: bool,
    ) -> Result<Option<Category>, RepositoryError>;

    /// Apply each order as an independent write. Entries that match no owned
    /// category are skipped. Returns the number of rows updated.
    async fn update_orders(
        &self,
        user_id: Uuid,
        orders: &[(Uuid, i32)],
    ) -> Result<u64, RepositoryError>;

    /// Permanently remove a category
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), RepositoryError>;
}

/// Category row joined with the display fields of its parent
#[derive(Debug, FromRow)]
struct CategoryWithParentRow {
    #[sqlx(flatten)]
    category: Category,
    parent_name: Option<String>,
    parent_icon: Option<String>,
    parent_color: Option<String>,
}

impl From<CategoryWithParentRow> for CategoryWithParent {
    fn from(row: CategoryWithParentRow) -> Self {
        let parent_category = match (row.category.parent_category_id, row.parent_name) {
            (Some(id), Some(name)) => Some(ParentSummary {
                id,
                name,
                icon: row.parent_icon,
                color: row.parent_color,
            }),
            _ => None,
        };

        CategoryWithParent {
            category: row.category,
            parent_category,
        }
    }
}

const SELECT_WITH_PARENT: &str = r#"
    SELECT
        c.id,
        c.user_id,
        c.name,
        c.category_type,
        c.icon,
        c.color,
        c.description,
        c.parent_category_id,
        c.is_default,
        c.is_active,
        c.sort_order,
        c.created_at,
        c.updated_at,
        p.name AS parent_name,
        p.icon AS parent_icon,
        p.color AS parent_color
    FROM categories c
    LEFT JOIN categories p ON p.id = c.parent_category_id
"#;

/// PostgreSQL implementation of CategoryRepository
pub struct PostgresCategoryRepository {
    pool: PgPool,
}

impl PostgresCategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for PostgresCategoryRepository {
    async fn create(&self, category: Category) -> Result<Category, RepositoryError> {
        let created = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (
                id, user_id, name, category_type, icon, color, description,
                parent_category_id, is_default, is_active, sort_order, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(category.id)
        .bind(category.user_id)
        .bind(&category.name)
        .bind(category.category_type)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(&category.description)
        .bind(category.parent_category_id)
        .bind(category.is_default)
        .bind(category.is_active)
        .bind(category.sort_order)
        .bind(category.created_at)
        .bind(category.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn find_by_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    async fn find_with_parent(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CategoryWithParent>, RepositoryError> {
        let query = format!("{SELECT_WITH_PARENT} WHERE c.id = $1 AND c.user_id = $2");
        let row = sqlx::query_as::<_, CategoryWithParentRow>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn find_by_name(
        &self,
        user_id: Uuid,
        name: &str,
        category_type: CategoryType,
        exclude_id: Option<Uuid>,
    ) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE user_id = $1
                AND name = $2
                AND category_type = $3
                AND ($4::uuid IS NULL OR id <> $4)
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(category_type)
        .bind(exclude_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    async fn find_by_user(
        &self,
        user_id: Uuid,
        filter: CategoryFilter,
    ) -> Result<Vec<CategoryWithParent>, RepositoryError> {
        let query = format!(
            "{SELECT_WITH_PARENT}
            WHERE c.user_id = $1
                AND ($2::varchar IS NULL OR c.category_type = $2)
                AND ($3 OR c.is_active)
            ORDER BY c.sort_order ASC, c.created_at ASC"
        );
        let rows = sqlx::query_as::<_, CategoryWithParentRow>(&query)
            .bind(user_id)
            .bind(filter.category_type)
            .bind(filter.include_inactive)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_children(
        &self,
        user_id: Uuid,
        parent_id: Uuid,
    ) -> Result<Vec<Category>, RepositoryError> {
        let children = sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE parent_category_id = $1 AND user_id = $2 AND is_active
            ORDER BY sort_order ASC, created_at ASC
            "#,
        )
        .bind(parent_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(children)
    }

    async fn count_children(&self, user_id: Uuid, parent_id: Uuid) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM categories WHERE parent_category_id = $1 AND user_id = $2",
        )
        .bind(parent_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn update(&self, category: Category) -> Result<Category, RepositoryError> {
        // user_id and category_type are part of the filter, never the SET list
        let updated = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
            SET name = $3,
                icon = $4,
                color = $5,
                description = $6,
                parent_category_id = $7,
                is_active = $8,
                sort_order = $9,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(category.id)
        .bind(category.user_id)
        .bind(&category.name)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(&category.description)
        .bind(category.parent_category_id)
        .bind(category.is_active)
        .bind(category.sort_order)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or(RepositoryError::NotFound)
    }

    async fn set_active(
        &self,
        user_id: Uuid,
        id: Uuid,
        active: bool,
    ) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
            SET is_active = $3, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    async fn update_orders(
        &self,
        user_id: Uuid,
        orders: &[(Uuid, i32)],
    ) -> Result<u64, RepositoryError> {
        let mut updated = 0;

        // Independent statements, not a transaction: a failure part way
        // through leaves earlier entries applied.
        for (id, order) in orders {
            let result = sqlx::query(
                r#"
                UPDATE categories
                SET sort_order = $3, updated_at = NOW()
                WHERE id = $1 AND user_id = $2
                "#,
            )
            .bind(id)
            .bind(user_id)
            .bind(order)
            .execute(&self.pool)
            .await?;

            updated += result.rows_affected();
        }

        Ok(updated)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}
