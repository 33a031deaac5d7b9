use std::collections::{HashMap, HashSet};

use crate::common::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: u64,
    pub level: AlertLevel,
    pub text: String,
}

/// Oldest alerts are dropped past this many.
pub const MAX_ALERTS: usize = 5;

/// Per-screen loading and alert state. Loading is tracked per operation so
/// one slow call does not block unrelated buttons.
#[derive(Debug, Clone, Default)]
pub struct UiState {
    in_flight: HashMap<String, usize>,
    stale: HashSet<String>,
    alerts: Vec<Alert>,
    next_alert: u64,
}

impl UiState {
    pub fn start(&mut self, key: impl Into<String>) {
        *self.in_flight.entry(key.into()).or_insert(0) += 1;
    }

    /// Settles one call under `key`; the key stays loading until every call has.
    pub fn finish(&mut self, key: &str) {
        if let Some(count) = self.in_flight.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(key);
            }
        }
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn any_loading(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// The fetch under `key` has to run again once the one in flight lands.
    pub fn mark_stale(&mut self, key: impl Into<String>) {
        self.stale.insert(key.into());
    }

    /// True once, after the last in-flight call under a stale `key` finished.
    pub fn take_stale(&mut self, key: &str) -> bool {
        !self.is_loading(key) && self.stale.remove(key)
    }

    /// A repeat of a showing alert moves it to the end under its old id.
    pub fn push(&mut self, level: AlertLevel, text: impl Into<String>) -> u64 {
        let text = text.into();
        let id = match self.alerts.iter().position(|a| a.level == level && a.text == text) {
            Some(at) => self.alerts.remove(at).id,
            None => {
                self.next_alert += 1;
                self.next_alert
            }
        };
        self.alerts.push(Alert { id, level, text });
        if self.alerts.len() > MAX_ALERTS {
            let excess = self.alerts.len() - MAX_ALERTS;
            self.alerts.drain(..excess);
        }
        id
    }

    pub fn info(&mut self, text: impl Into<String>) -> u64 {
        self.push(AlertLevel::Info, text)
    }

    pub fn success(&mut self, text: impl Into<String>) -> u64 {
        self.push(AlertLevel::Success, text)
    }

    pub fn error(&mut self, error: &ClientError) -> u64 {
        self.push(AlertLevel::Error, error.user_message())
    }

    pub fn dismiss(&mut self, id: u64) {
        self.alerts.retain(|a| a.id != id);
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn last_alert(&self) -> Option<&Alert> {
        self.alerts.last()
    }

    pub fn clear_alerts(&mut self) {
        self.alerts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_is_keyed_per_operation() {
        let mut ui = UiState::default();
        ui.start("accept:12");
        ui.start("available_requests");
        ui.finish("available_requests");
        assert!(ui.is_loading("accept:12"));
        assert!(!ui.is_loading("available_requests"));
        assert!(ui.any_loading());
    }

    #[test]
    fn alerts_dismiss_by_id() {
        let mut ui = UiState::default();
        let first = ui.info("one");
        ui.error(&ClientError::Conflict("Failed to accept job. It may have been taken.".into()));
        ui.dismiss(first);
        assert_eq!(ui.alerts().len(), 1);
        assert_eq!(ui.last_alert().map(|a| a.level), Some(AlertLevel::Error));
    }

    #[test]
    fn same_key_twice_stays_loading_until_both_finish() {
        let mut ui = UiState::default();
        ui.start("chat_messages:4");
        ui.start("chat_messages:4");
        ui.finish("chat_messages:4");
        assert!(ui.is_loading("chat_messages:4"));
        ui.finish("chat_messages:4");
        assert!(!ui.is_loading("chat_messages:4"));
        assert!(!ui.any_loading());
    }

    #[test]
    fn stale_flag_fires_once_after_the_fetch_lands() {
        let mut ui = UiState::default();
        ui.start("my_requests");
        ui.mark_stale("my_requests");
        assert!(!ui.take_stale("my_requests"), "still in flight");
        ui.finish("my_requests");
        assert!(ui.take_stale("my_requests"));
        assert!(!ui.take_stale("my_requests"));
    }

    #[test]
    fn repeated_alerts_collapse_and_the_list_is_capped() {
        let mut ui = UiState::default();
        let poll = ClientError::Transient("Could not search for new jobs.".into());
        let first = ui.error(&poll);
        ui.info("other");
        assert_eq!(ui.error(&poll), first);
        assert_eq!(ui.alerts().len(), 2);
        assert_eq!(ui.last_alert().map(|a| a.id), Some(first));

        for i in 0..10 {
            ui.info(format!("notice {}", i));
        }
        assert_eq!(ui.alerts().len(), MAX_ALERTS);
        assert_eq!(ui.last_alert().map(|a| a.text.as_str()), Some("notice 9"));
    }
}
