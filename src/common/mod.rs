pub mod error;
pub mod job_status;
pub mod models;
