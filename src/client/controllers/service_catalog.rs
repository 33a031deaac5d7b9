use log::info;

use crate::client::controllers::record_list::RecordList;
use crate::client::controllers::request;
use crate::client::models::messages::{ApiReply, Message};
use crate::client::models::ui_state::{AlertLevel, UiState};
use crate::client::runtime::{ApiCall, Command};
use crate::common::models::{Service, ServiceCategory, ServiceId, User};

/// The provider's offered services against the full catalogue.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    user: User,
    categories: RecordList<ServiceCategory>,
    offered: RecordList<Service>,
    pub ui: UiState,
}

impl ServiceCatalog {
    pub fn new(user: User) -> Self {
        Self { user, categories: RecordList::new(), offered: RecordList::new(), ui: UiState::default() }
    }

    pub fn categories(&self) -> &RecordList<ServiceCategory> {
        &self.categories
    }

    pub fn offered(&self) -> &RecordList<Service> {
        &self.offered
    }

    pub fn is_offered(&self, service: ServiceId) -> bool {
        self.offered.contains(service)
    }

    pub fn can_edit(&self) -> bool {
        self.user.is_verified_provider()
    }

    pub fn mount(&mut self) -> Command {
        Command::batch([
            request(&mut self.ui, ApiCall::ServiceCategories),
            request(&mut self.ui, ApiCall::MyServices),
        ])
    }

    pub fn update(&mut self, message: Message) -> Command {
        match message {
            Message::Refresh => self.mount(),
            Message::ToggleService(id) => {
                if !self.can_edit() {
                    self.ui.push(AlertLevel::Error, "Only verified providers can change the services they offer.");
                    return Command::none();
                }
                let call = if self.is_offered(id) { ApiCall::RemoveService(id) } else { ApiCall::AddService(id) };
                if self.ui.is_loading(&call.key()) {
                    return Command::none();
                }
                request(&mut self.ui, call)
            }
            Message::Api(reply) => self.on_reply(reply),
            _ => Command::none(),
        }
    }

    fn on_reply(&mut self, reply: ApiReply) -> Command {
        self.ui.finish(&reply.key());
        match reply {
            ApiReply::ServiceCategories(Ok(categories)) => {
                self.categories.replace_all(categories);
                Command::none()
            }
            ApiReply::MyServices(Ok(services)) => {
                self.offered.replace_all(services);
                Command::none()
            }
            ApiReply::ServiceAdded(id, Ok(())) | ApiReply::ServiceRemoved(id, Ok(())) => {
                info!("Service {} toggled", id);
                request(&mut self.ui, ApiCall::MyServices)
            }
            ApiReply::ServiceCategories(Err(e))
            | ApiReply::MyServices(Err(e))
            | ApiReply::ServiceAdded(_, Err(e))
            | ApiReply::ServiceRemoved(_, Err(e)) => {
                self.ui.error(&e);
                Command::none()
            }
            _ => Command::none(),
        }
    }
}
