use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use finance_tracker::app::{AppState, create_router};
use finance_tracker::config::Config;
use finance_tracker::repositories::category_repository::PostgresCategoryRepository;
use finance_tracker::repositories::user_repository::PostgresUserRepository;
use finance_tracker::services::auth_service::{AuthService, AuthServiceImpl};
use finance_tracker::services::category_service::{CategoryService, CategoryServiceImpl};

const DEFAULT_LOG_FILTER: &str = "finance_tracker=info,tower_http=info";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Connected to database");

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    // Initialize repositories
    let user_repository = Arc::new(PostgresUserRepository::new(pool.clone()));
    let category_repository = Arc::new(PostgresCategoryRepository::new(pool));

    // Initialize services
    let auth_service: Arc<dyn AuthService> =
        Arc::new(AuthServiceImpl::new(user_repository, config.jwt_secret.clone()));
    let category_service: Arc<dyn CategoryService> =
        Arc::new(CategoryServiceImpl::new(category_repository));

    let app = create_router(AppState {
        auth_service,
        category_service,
    });

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "Server running");
    info!("API docs: http://{}/api/docs", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
