use crate::client::models::ui_state::{AlertLevel, UiState};

pub fn view(ui: &UiState) -> String {
    let mut out = String::new();
    for alert in ui.alerts() {
        let tag = match alert.level {
            AlertLevel::Info => "INFO",
            AlertLevel::Success => "OK",
            AlertLevel::Error => "ERROR",
        };
        out.push_str(&format!("[{}#{}] {}\n", tag, alert.id, alert.text));
    }
    out
}

pub fn loading(ui: &UiState) -> &'static str {
    if ui.any_loading() { " (loading...)" } else { "" }
}
