use log::{debug, info};

use crate::client::controllers::record_list::RecordList;
use crate::client::controllers::{refetch, request, subscription_failed};
use crate::client::models::messages::{ApiReply, Message};
use crate::client::models::ui_state::{AlertLevel, UiState};
use crate::client::runtime::{ApiCall, Command, Effect};
use crate::client::services::realtime_message::{user_channel, RealtimeEvent};
use crate::common::models::{Coordinates, NewServiceRequest, ServiceCategory, ServiceRequest, User};

/// The customer's own requests, kept current from the user channel.
#[derive(Debug, Clone)]
pub struct CustomerDashboard {
    user: User,
    requests: RecordList<ServiceRequest>,
    categories: Vec<ServiceCategory>,
    loaded: bool,
    pub ui: UiState,
}

impl CustomerDashboard {
    pub fn new(user: User) -> Self {
        Self { user, requests: RecordList::new(), categories: Vec::new(), loaded: false, ui: UiState::default() }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn channel(&self) -> String {
        user_channel(self.user.id)
    }

    pub fn requests(&self) -> &RecordList<ServiceRequest> {
        &self.requests
    }

    pub fn active(&self) -> Vec<&ServiceRequest> {
        self.requests.active()
    }

    pub fn history(&self) -> Vec<&ServiceRequest> {
        self.requests.history()
    }

    pub fn categories(&self) -> &[ServiceCategory] {
        &self.categories
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn mount(&mut self) -> Command {
        Command::batch([
            request(&mut self.ui, ApiCall::MyRequests),
            request(&mut self.ui, ApiCall::ServiceCategories),
            Command::single(Effect::Subscribe(self.channel())),
        ])
    }

    fn refetch(&mut self) -> Command {
        refetch(&mut self.ui, ApiCall::MyRequests)
    }

    pub fn update(&mut self, message: Message) -> Command {
        match message {
            Message::Refresh => self.refetch(),
            Message::CreateRequest { service, latitude, longitude } => {
                let at = match Coordinates::validate(latitude, longitude) {
                    Ok(at) => at,
                    Err(problem) => {
                        self.ui.push(AlertLevel::Error, problem);
                        return Command::none();
                    }
                };
                if !self.categories.is_empty() && !self.categories.iter().any(|c| c.services.iter().any(|s| s.id == service)) {
                    self.ui.push(AlertLevel::Error, format!("Unknown service {}.", service));
                    return Command::none();
                }
                request(
                    &mut self.ui,
                    ApiCall::CreateRequest(NewServiceRequest {
                        service,
                        request_latitude: at.latitude,
                        request_longitude: at.longitude,
                    }),
                )
            }
            Message::Api(reply) => self.on_reply(reply),
            Message::Realtime { channel, event } if channel == self.channel() => self.on_event(event),
            Message::SubscriptionFailed { channel, error } => {
                subscription_failed(&channel, &error);
                Command::none()
            }
            _ => Command::none(),
        }
    }

    fn on_reply(&mut self, reply: ApiReply) -> Command {
        let key = reply.key();
        self.ui.finish(&key);
        let repeat = self.ui.take_stale(&key);
        let command = self.apply_reply(reply);
        if repeat && key == ApiCall::MyRequests.key() {
            debug!("Requests changed while loading, fetching again");
            return Command::batch([command, self.refetch()]);
        }
        command
    }

    fn apply_reply(&mut self, reply: ApiReply) -> Command {
        match reply {
            ApiReply::MyRequests(Ok(list)) => {
                debug!("Loaded {} requests", list.len());
                self.requests.replace_all(list);
                self.loaded = true;
                Command::none()
            }
            ApiReply::ServiceCategories(Ok(categories)) => {
                self.categories = categories;
                Command::none()
            }
            ApiReply::RequestCreated(Ok(())) => {
                info!("Service request created");
                self.ui.success("Your request has been sent! We are finding a provider for you.");
                self.refetch()
            }
            ApiReply::MyRequests(Err(e)) | ApiReply::RequestCreated(Err(e)) | ApiReply::ServiceCategories(Err(e)) => {
                self.ui.error(&e);
                Command::none()
            }
            _ => Command::none(),
        }
    }

    fn on_event(&mut self, event: RealtimeEvent) -> Command {
        match event {
            RealtimeEvent::RequestAccepted(job) => {
                let id = job.id;
                if self.requests.replace_by_id(*job) {
                    self.ui.info(format!("Request #{} was accepted by a provider.", id));
                    Command::none()
                } else {
                    // not in our snapshot yet
                    self.refetch()
                }
            }
            RealtimeEvent::StatusUpdate(_) => self.refetch(),
            other => {
                debug!("Ignoring '{}' on dashboard", other.name());
                Command::none()
            }
        }
    }
}
