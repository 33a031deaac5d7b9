use crate::common::job_status::STEPPER_LABELS;
use crate::common::models::JobStatus;

/// Happy-path progress, e.g. `Pending > [Accepted] > In Progress > Completed`.
/// Cancelled and declined jobs show their status instead.
pub fn view(status: JobStatus) -> String {
    match status.stepper_index() {
        Some(current) => STEPPER_LABELS
            .iter()
            .enumerate()
            .map(|(i, label)| if i == current { format!("[{}]", label) } else { label.to_string() })
            .collect::<Vec<_>>()
            .join(" > "),
        None => format!("-- {} --", status.label()),
    }
}

pub fn status_chip(status: JobStatus) -> String {
    format!("<{}>", status.label())
}
