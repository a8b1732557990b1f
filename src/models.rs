pub mod auth;
pub mod category;
pub mod filters;
pub mod user;

pub use auth::{AuthToken, LoginRequest, VerifyEmailRequest};
pub use category::{
    Category, CategoryDetails, CategoryNode, CategoryOrder, CategoryType, CategoryWithParent,
    CreateCategoryRequest, ParentSummary, ReorderCategoriesRequest, UpdateCategoryRequest,
};
pub use filters::{CategoryFilter, CategoryListQuery};
pub use user::{CreateUserRequest, User};
