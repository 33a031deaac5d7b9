use crate::client::controllers::job_detail::JobDetail;
use crate::client::views::widgets::{alert, job_card, stepper};

pub fn view(detail: &JobDetail) -> String {
    let mut out = format!("== Job #{}{} ==\n", detail.job_id(), alert::loading(&detail.ui));
    out.push_str(&alert::view(&detail.ui));
    let Some(job) = detail.job() else {
        return out;
    };
    out.push_str(&format!("{}\n{}\n", job_card::view(job), stepper::view(job.status)));
    out.push_str(&format!("Customer: {}\n", job.customer.display_name()));
    if let Some(provider) = &job.provider {
        let rating = detail
            .provider_reviews()
            .and_then(|r| r.average_rating)
            .map(|r| format!(" ({:.1}/5)", r))
            .unwrap_or_default();
        out.push_str(&format!("Provider: {}{}\n", provider.display_name(), rating));
    }
    if let Some(sample) = detail.location() {
        out.push_str(&format!(
            "Provider at ({:.5}, {:.5}), {}\n",
            sample.latitude,
            sample.longitude,
            sample.received_at.format("%H:%M:%S")
        ));
    }
    if let Some(review) = &job.review {
        out.push_str(&format!("Reviewed: {}/5 {}\n", review.rating, review.comment.as_deref().unwrap_or("")));
    }

    let actions: Vec<&str> = detail.actions().into_iter().map(|a| a.label()).collect();
    if !actions.is_empty() {
        out.push_str(&format!("Actions: {}\n", actions.join(" | ")));
    }

    out.push_str("-- Chat --\n");
    for message in detail.messages().iter() {
        let who = if message.sender.id == detail.viewer().id { "You".to_string() } else { message.sender.display_name() };
        out.push_str(&format!("[{}] {}: {}\n", message.created_at.format("%H:%M"), who, message.text));
    }
    if !detail.draft().is_empty() {
        out.push_str(&format!("(draft) {}\n", detail.draft()));
    }
    out
}
