pub mod customer_dashboard;
pub mod job_detail;
pub mod optimistic;
pub mod provider_board;
pub mod record_list;
pub mod service_catalog;

use log::warn;

use crate::client::models::ui_state::UiState;
use crate::client::runtime::{ApiCall, Command};
use crate::common::error::ClientError;

/// Marks `call` in flight and turns it into a command.
pub(crate) fn request(ui: &mut UiState, call: ApiCall) -> Command {
    ui.start(call.key());
    Command::call(call)
}

/// Like [`request`], but while the same fetch is already out it only marks
/// the key stale, and the controller repeats the fetch when that reply lands.
pub(crate) fn refetch(ui: &mut UiState, call: ApiCall) -> Command {
    let key = call.key();
    if ui.is_loading(&key) {
        ui.mark_stale(key);
        return Command::none();
    }
    request(ui, call)
}

/// Logs a failed push subscription. Only a rejected session is surfaced,
/// and that is handled above the controllers.
pub(crate) fn subscription_failed(channel: &str, error: &ClientError) {
    if !error.is_unauthorized() {
        warn!("Live updates unavailable on {}: {}", channel, error);
    }
}
