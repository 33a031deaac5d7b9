pub mod dashboard;
pub mod job_detail;
pub mod services;
pub mod widgets;

use crate::client::models::app_state::{App, Route, Screen};
use crate::client::views::widgets::alert;

/// Full-screen text rendering of whatever the app currently shows.
pub fn view(app: &App) -> String {
    match (app.route(), app.screen()) {
        (Route::CheckingSession, _) => "Checking saved session...\n".to_string(),
        (_, Screen::Dashboard(d)) => dashboard::view(d),
        (_, Screen::JobDetail(j)) => job_detail::view(j),
        (_, Screen::Services(s)) => services::view(s),
        (_, Screen::Blank) => {
            let mut out = format!("== QuickAssist{} ==\n", alert::loading(&app.ui));
            out.push_str(&alert::view(&app.ui));
            out.push_str("Log in with /login <email> <password> or create an account with /register.\n");
            out
        }
    }
}
