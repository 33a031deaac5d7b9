use crate::client::controllers::customer_dashboard::CustomerDashboard;
use crate::client::controllers::provider_board::ProviderBoard;
use crate::client::models::app_state::Dashboard;
use crate::client::views::widgets::{alert, job_card};

pub fn view(dashboard: &Dashboard) -> String {
    match dashboard {
        Dashboard::Customer(d) => customer(d),
        Dashboard::Provider(b) => provider(b),
    }
}

fn customer(d: &CustomerDashboard) -> String {
    let mut out = format!("== My requests, {}{} ==\n", d.user().display_name(), alert::loading(&d.ui));
    out.push_str(&alert::view(&d.ui));
    if !d.is_loaded() {
        return out;
    }
    out.push_str(&job_card::list("Active", d.active(), "No active requests. Try /new <service> <lat> <lon>."));
    out.push_str(&job_card::list("History", d.history(), "Nothing here yet."));
    if !d.categories().is_empty() {
        out.push_str("Services\n");
        for category in d.categories() {
            let names: Vec<String> = category.services.iter().map(|s| format!("{} {}", s.id, s.name)).collect();
            out.push_str(&format!("  {}: {}\n", category.name, names.join(", ")));
        }
    }
    out
}

fn provider(b: &ProviderBoard) -> String {
    let state = if b.is_online() { "ONLINE" } else { "OFFLINE" };
    let mut out = format!("== Job board, {} [{}]{} ==\n", b.user().display_name(), state, alert::loading(&b.ui));
    if !b.is_verified() {
        out.push_str("Your account is awaiting verification.\n");
    }
    out.push_str(&alert::view(&b.ui));
    out.push_str(&job_card::list("My jobs", b.active_jobs(), "No active jobs."));
    out.push_str(&job_card::list("Job history", b.job_history(), "Nothing here yet."));
    if b.is_online() {
        out.push_str("Available requests\n");
        if b.available().is_empty() {
            out.push_str("  No requests nearby right now.\n");
        }
        for job in b.available().iter() {
            out.push_str(&format!("  {}\n", job_card::available(job)));
        }
    } else {
        out.push_str("Go /online to see available requests.\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::controllers::fixtures::{customer, job};
    use crate::client::models::messages::{ApiReply, Message};
    use crate::common::models::JobStatus;

    #[test]
    fn customer_dashboard_splits_active_and_history() {
        let mut d = CustomerDashboard::new(customer(1));
        d.mount();
        d.update(Message::Api(ApiReply::MyRequests(Ok(vec![job(5, JobStatus::Pending), job(9, JobStatus::Completed)]))));
        let text = view(&Dashboard::Customer(d));
        let active = text.find("Active").unwrap();
        let history = text.find("History").unwrap();
        let pending = text.find("#5").unwrap();
        let done = text.find("#9").unwrap();
        assert!(active < pending && pending < history && history < done);
    }
}
