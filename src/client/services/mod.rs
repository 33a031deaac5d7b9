pub mod api_client;
pub mod auth_service;
pub mod realtime_client;
pub mod realtime_message;
pub mod service_api;
