pub mod request_id;
pub mod security_headers;
pub mod user_context;
