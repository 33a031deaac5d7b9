use crate::client::views::widgets::stepper::status_chip;
use crate::common::models::{AvailableRequest, ServiceRequest};

fn price(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("KES {:.2}", v),
        None => "price on request".to_string(),
    }
}

pub fn view(job: &ServiceRequest) -> String {
    let who = job.provider.as_ref().map(|p| p.display_name()).unwrap_or_else(|| "awaiting provider".to_string());
    format!(
        "#{} {} {} | {} | {} | {}",
        job.id,
        job.service.name,
        status_chip(job.status),
        who,
        price(job.amount_due()),
        job.created_at.format("%Y-%m-%d %H:%M")
    )
}

pub fn available(job: &AvailableRequest) -> String {
    format!(
        "#{} {} for {} at ({:.4}, {:.4}) | {}",
        job.id,
        job.service.name,
        job.customer_name,
        job.request_latitude,
        job.request_longitude,
        price(job.service.base_price)
    )
}

pub fn list<'a>(title: &str, jobs: impl IntoIterator<Item = &'a ServiceRequest>, empty: &str) -> String {
    let mut out = format!("{}\n", title);
    let mut any = false;
    for job in jobs {
        out.push_str(&format!("  {}\n", view(job)));
        any = true;
    }
    if !any {
        out.push_str(&format!("  {}\n", empty));
    }
    out
}
