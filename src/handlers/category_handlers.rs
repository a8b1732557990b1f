use axum::{
    Json,
    extract::{
        Extension, Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;
use validator::Validate;

use crate::handlers::response::{ApiResponse, ErrorResponse, bad_request, validation_message};
use crate::middleware::auth_middleware::AuthenticatedUser;
use crate::models::category::{
    Category, CategoryDetails, CategoryNode, CategoryWithParent, CreateCategoryRequest,
    ReorderCategoriesRequest, UpdateCategoryRequest,
};
use crate::models::filters::CategoryListQuery;
use crate::services::category_service::{CategoryError, CategoryService};

/// Convert CategoryError to HTTP response
impl IntoResponse for CategoryError {
    fn into_response(self) -> Response {
        let status = match self {
            CategoryError::InvalidId
            | CategoryError::InvalidType
            | CategoryError::InvalidReorderPayload
            | CategoryError::Validation(_)
            | CategoryError::SelfParent
            | CategoryError::CircularReference
            | CategoryError::DepthExceeded
            | CategoryError::HasSubcategories => StatusCode::BAD_REQUEST,
            CategoryError::CategoryNotFound | CategoryError::ParentNotFound => {
                StatusCode::NOT_FOUND
            }
            CategoryError::DuplicateName => StatusCode::CONFLICT,
            CategoryError::DefaultCategory => StatusCode::FORBIDDEN,
            CategoryError::DatabaseError(ref msg) => {
                error!(error = %msg, "Category storage failure");
                let body = ErrorResponse::internal("Error processing category request", msg);
                return body.into_response_with(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        ErrorResponse::new(self.to_string()).into_response_with(status)
    }
}

fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    let Json(request) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;
    request
        .validate()
        .map_err(|errors| bad_request(validation_message(&errors)))?;
    Ok(request)
}

/// Handler for creating a category
///
/// Creates a category owned by the authenticated user, optionally nested under
/// a parent of the same type. The created category is returned in `data`.
#[utoipa::path(
    post,
    path = "/api/add_categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Validation error, malformed parent ID, or nesting too deep", body = ErrorResponse),
        (status = 404, description = "Parent category not found or type mismatch", body = ErrorResponse),
        (status = 409, description = "Name already used for this type", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "categories"
)]
pub async fn create_category_handler(
    State(category_service): State<Arc<dyn CategoryService>>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    payload: Result<Json<CreateCategoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>), Response> {
    let request = validated(payload)?;

    let category = category_service
        .create_category(auth_user.user_id, request)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(category).with_message("Category created successfully")),
    ))
}

/// Handler for listing categories
///
/// Lists the user's categories sorted by `order` then creation time. `type`
/// narrows to income or expense (other values are ignored); inactive
/// categories are included only when `includeInactive` is `true` or `1`;
/// unrecognised flag values are ignored.
#[utoipa::path(
    get,
    path = "/api/allCategories",
    params(
        ("type" = Option<String>, Query, description = "income or expense"),
        ("includeInactive" = Option<bool>, Query, description = "Include soft-deleted categories")
    ),
    responses(
        (status = 200, description = "Categories with parents populated", body = Vec<CategoryWithParent>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "categories"
)]
pub async fn list_categories_handler(
    State(category_service): State<Arc<dyn CategoryService>>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    query: Result<Query<CategoryListQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<CategoryWithParent>>>, Response> {
    let Query(query) = query.map_err(|rejection| bad_request(rejection.body_text()))?;

    let categories = category_service
        .list_categories(
            auth_user.user_id,
            query.category_type.as_deref(),
            query.include_inactive.unwrap_or(false),
        )
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(ApiResponse::list(categories)))
}

/// Handler for listing active categories of one type
#[utoipa::path(
    get,
    path = "/api/categories/{type}",
    params(
        ("type" = String, Path, description = "income or expense")
    ),
    responses(
        (status = 200, description = "Active categories of the type", body = Vec<CategoryWithParent>),
        (status = 400, description = "Unknown type", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "categories"
)]
pub async fn list_categories_by_type_handler(
    State(category_service): State<Arc<dyn CategoryService>>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(category_type): Path<String>,
) -> Result<Json<ApiResponse<Vec<CategoryWithParent>>>, Response> {
    let categories = category_service
        .list_categories_by_type(auth_user.user_id, &category_type)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(ApiResponse::list(categories)))
}

/// Handler for fetching a single category with its subcategories
#[utoipa::path(
    get,
    path = "/api/category/{id}",
    params(
        ("id" = String, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "Category with active subcategories", body = CategoryDetails),
        (status = 400, description = "Malformed ID", body = ErrorResponse),
        (status = 404, description = "Category not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "categories"
)]
pub async fn get_category_handler(
    State(category_service): State<Arc<dyn CategoryService>>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<CategoryDetails>>, Response> {
    let details = category_service
        .get_category(auth_user.user_id, &id)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(ApiResponse::data(details)))
}

/// Handler for listing the active children of a category
#[utoipa::path(
    get,
    path = "/api/categories/{id}/subcategories",
    params(
        ("id" = String, Path, description = "Parent category ID")
    ),
    responses(
        (status = 200, description = "Active direct children", body = Vec<Category>),
        (status = 400, description = "Malformed ID", body = ErrorResponse),
        (status = 404, description = "Parent category not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "categories"
)]
pub async fn get_subcategories_handler(
    State(category_service): State<Arc<dyn CategoryService>>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(parent_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Category>>>, Response> {
    let subcategories = category_service
        .get_subcategories(auth_user.user_id, &parent_id)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(ApiResponse::list(subcategories)))
}

/// Handler for the category tree
///
/// Returns active categories as a forest; `count` is the number of nodes in
/// the forest, not the number of roots.
#[utoipa::path(
    get,
    path = "/api/categoryTree",
    params(
        ("type" = Option<String>, Query, description = "income or expense")
    ),
    responses(
        (status = 200, description = "Category forest", body = Vec<CategoryNode>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "categories"
)]
pub async fn get_category_tree_handler(
    State(category_service): State<Arc<dyn CategoryService>>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    query: Result<Query<CategoryListQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<CategoryNode>>>, Response> {
    let Query(query) = query.map_err(|rejection| bad_request(rejection.body_text()))?;

    let tree = category_service
        .get_category_tree(auth_user.user_id, query.category_type.as_deref())
        .await
        .map_err(IntoResponse::into_response)?;

    let count = tree.iter().map(count_nodes).sum();
    Ok(Json(ApiResponse {
        count: Some(count),
        ..ApiResponse::data(tree)
    }))
}

fn count_nodes(node: &CategoryNode) -> usize {
    1 + node.subcategories.iter().map(count_nodes).sum::<usize>()
}

/// Handler for updating a category
///
/// Applies only the fields present in the body. `parent_category: null`
/// detaches the category from its parent.
#[utoipa::path(
    put,
    path = "/api/categories/{id}",
    params(
        ("id" = String, Path, description = "Category ID")
    ),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = Category),
        (status = 400, description = "Malformed ID, self parent, circular reference, or nesting too deep", body = ErrorResponse),
        (status = 403, description = "Default categories cannot be modified", body = ErrorResponse),
        (status = 404, description = "Category or parent not found", body = ErrorResponse),
        (status = 409, description = "Name already used for this type", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "categories"
)]
pub async fn update_category_handler(
    State(category_service): State<Arc<dyn CategoryService>>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateCategoryRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Category>>, Response> {
    let request = validated(payload)?;

    let category = category_service
        .update_category(auth_user.user_id, &id, request)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(
        ApiResponse::data(category).with_message("Category updated successfully"),
    ))
}

/// Handler for restoring a soft-deleted category
#[utoipa::path(
    put,
    path = "/api/activateCategory/{id}",
    params(
        ("id" = String, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "Category activated", body = Category),
        (status = 400, description = "Malformed ID", body = ErrorResponse),
        (status = 404, description = "Category not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "categories"
)]
pub async fn activate_category_handler(
    State(category_service): State<Arc<dyn CategoryService>>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Category>>, Response> {
    let category = category_service
        .set_active(auth_user.user_id, &id, true)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(
        ApiResponse::data(category).with_message("Category activated successfully"),
    ))
}

/// Handler for soft-deleting a category
#[utoipa::path(
    put,
    path = "/api/inactivateCategory/{id}",
    params(
        ("id" = String, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "Category deactivated", body = Category),
        (status = 400, description = "Malformed ID", body = ErrorResponse),
        (status = 404, description = "Category not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "categories"
)]
pub async fn inactivate_category_handler(
    State(category_service): State<Arc<dyn CategoryService>>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Category>>, Response> {
    let category = category_service
        .set_active(auth_user.user_id, &id, false)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(
        ApiResponse::data(category).with_message("Category deactivated successfully"),
    ))
}

/// Handler for deleting a category
///
/// Permanently removes a category. Categories with subcategories (active or
/// not) must be emptied first.
#[utoipa::path(
    delete,
    path = "/api/categories/{id}",
    params(
        ("id" = String, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "Category deleted", body = ErrorResponse),
        (status = 400, description = "Malformed ID or category has subcategories", body = ErrorResponse),
        (status = 403, description = "Default categories cannot be deleted", body = ErrorResponse),
        (status = 404, description = "Category not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "categories"
)]
pub async fn delete_category_handler(
    State(category_service): State<Arc<dyn CategoryService>>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, Response> {
    category_service
        .delete_category(auth_user.user_id, &id)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(ApiResponse::message("Category deleted successfully")))
}

/// Handler for reordering categories
///
/// Each entry is applied independently; IDs the user does not own are skipped.
#[utoipa::path(
    put,
    path = "/api/reorderCategories",
    request_body = ReorderCategoriesRequest,
    responses(
        (status = 200, description = "Orders applied", body = ErrorResponse),
        (status = 400, description = "category_orders is not an array", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "categories"
)]
pub async fn reorder_categories_handler(
    State(category_service): State<Arc<dyn CategoryService>>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    payload: Result<Json<ReorderCategoriesRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, Response> {
    let Json(request) =
        payload.map_err(|_| CategoryError::InvalidReorderPayload.into_response())?;

    category_service
        .reorder_categories(auth_user.user_id, request.category_orders)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(ApiResponse::message("Categories reordered successfully")))
}
