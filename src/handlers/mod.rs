pub mod account_handlers;
pub mod feed_handlers;
pub mod health_handlers;
pub mod post_handlers;
