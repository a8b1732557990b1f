pub mod auth_handlers;
pub mod category_handlers;
pub mod response;
