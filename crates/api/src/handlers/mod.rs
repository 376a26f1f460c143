pub mod connections;
pub mod webhooks;
