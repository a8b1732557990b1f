pub mod category_repository;
pub mod user_repository;
