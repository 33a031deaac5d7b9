pub mod alert;
pub mod job_card;
pub mod stepper;
