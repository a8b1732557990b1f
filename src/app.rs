use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::auth_handlers::{login_handler, register_handler, verify_email_handler};
use crate::handlers::category_handlers::{
    activate_category_handler, create_category_handler, delete_category_handler,
    get_category_handler, get_category_tree_handler, get_subcategories_handler,
    inactivate_category_handler, list_categories_by_type_handler, list_categories_handler,
    reorder_categories_handler, update_category_handler,
};
use crate::handlers::response::ErrorResponse;
use crate::middleware::auth_middleware::{auth_middleware, require_verified};
use crate::models::auth::{AuthToken, LoginRequest, VerifyEmailRequest};
use crate::models::category::{
    Category, CategoryDetails, CategoryNode, CategoryOrder, CategoryType, CategoryWithParent,
    CreateCategoryRequest, ParentSummary, ReorderCategoriesRequest, UpdateCategoryRequest,
};
use crate::models::user::{CreateUserRequest, User};
use crate::services::auth_service::AuthService;
use crate::services::category_service::CategoryService;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::auth_handlers::register_handler,
        crate::handlers::auth_handlers::login_handler,
        crate::handlers::auth_handlers::verify_email_handler,
        crate::handlers::category_handlers::create_category_handler,
        crate::handlers::category_handlers::list_categories_handler,
        crate::handlers::category_handlers::list_categories_by_type_handler,
        crate::handlers::category_handlers::get_category_handler,
        crate::handlers::category_handlers::get_subcategories_handler,
        crate::handlers::category_handlers::get_category_tree_handler,
        crate::handlers::category_handlers::update_category_handler,
        crate::handlers::category_handlers::activate_category_handler,
        crate::handlers::category_handlers::inactivate_category_handler,
        crate::handlers::category_handlers::delete_category_handler,
        crate::handlers::category_handlers::reorder_categories_handler,
    ),
    components(
        schemas(
            User, CreateUserRequest, LoginRequest, AuthToken, VerifyEmailRequest, ErrorResponse,
            Category, CategoryType, CategoryWithParent, ParentSummary, CategoryDetails,
            CategoryNode, CreateCategoryRequest, UpdateCategoryRequest, CategoryOrder,
            ReorderCategoriesRequest
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication endpoints"),
        (name = "categories", description = "Hierarchical income and expense categories")
    ),
    info(
        title = "Finance Tracker API",
        version = "0.1.0",
        description = "REST API for personal finance tracking",
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by category paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Services shared by the HTTP layer
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<dyn AuthService>,
    pub category_service: Arc<dyn CategoryService>,
}

/// Build the full application router
pub fn create_router(state: AppState) -> Router {
    let AppState {
        auth_service,
        category_service,
    } = state;

    // Layers run bottom-up: the token is checked before the account status
    let category_routes = Router::new()
        .route("/api/add_categories", post(create_category_handler))
        .route("/api/allCategories", get(list_categories_handler))
        .route(
            "/api/categories/{id}",
            get(list_categories_by_type_handler)
                .put(update_category_handler)
                .delete(delete_category_handler),
        )
        .route(
            "/api/categories/{id}/subcategories",
            get(get_subcategories_handler),
        )
        .route("/api/category/{id}", get(get_category_handler))
        .route("/api/categoryTree", get(get_category_tree_handler))
        .route("/api/activateCategory/{id}", put(activate_category_handler))
        .route(
            "/api/inactivateCategory/{id}",
            put(inactivate_category_handler),
        )
        .route("/api/reorderCategories", put(reorder_categories_handler))
        .route_layer(middleware::from_fn_with_state(
            auth_service.clone(),
            require_verified,
        ))
        .route_layer(middleware::from_fn_with_state(
            auth_service.clone(),
            auth_middleware,
        ))
        .with_state(category_service);

    let auth_routes = Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/verify", post(verify_email_handler))
        .with_state(auth_service);

    Router::new()
        .route("/health", get(health_check))
        .merge(auth_routes)
        .merge(category_routes)
        .merge(SwaggerUi::new("/api/docs").url("/api/docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
