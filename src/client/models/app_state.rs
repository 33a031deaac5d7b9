use log::{debug, info, warn};
use std::time::Duration;

use crate::client::controllers::customer_dashboard::CustomerDashboard;
use crate::client::controllers::job_detail::JobDetail;
use crate::client::controllers::provider_board::ProviderBoard;
use crate::client::controllers::service_catalog::ServiceCatalog;
use crate::client::models::messages::Message;
use crate::client::models::ui_state::{AlertLevel, UiState};
use crate::client::runtime::{Command, Delivery, Effect, MountId, Runtime, SESSION_MOUNT};
use crate::common::models::{JobId, Role, User};

pub const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    CheckingSession,
    Login,
    Dashboard,
    JobDetail(JobId),
    Services,
}

/// Chosen once from the signed-in user's role.
#[derive(Debug, Clone)]
pub enum Dashboard {
    Customer(CustomerDashboard),
    Provider(ProviderBoard),
}

impl Dashboard {
    pub fn for_user(user: &User, poll_every: Duration) -> Self {
        match user.role {
            Role::Customer => Dashboard::Customer(CustomerDashboard::new(user.clone())),
            Role::Provider => Dashboard::Provider(ProviderBoard::new(user.clone(), poll_every)),
        }
    }

    pub fn mount(&mut self) -> Command {
        match self {
            Dashboard::Customer(d) => d.mount(),
            Dashboard::Provider(b) => b.mount(),
        }
    }

    pub fn update(&mut self, message: Message) -> Command {
        match self {
            Dashboard::Customer(d) => d.update(message),
            Dashboard::Provider(b) => b.update(message),
        }
    }

    pub fn ui(&self) -> &UiState {
        match self {
            Dashboard::Customer(d) => &d.ui,
            Dashboard::Provider(b) => &b.ui,
        }
    }

    fn ui_mut(&mut self) -> &mut UiState {
        match self {
            Dashboard::Customer(d) => &mut d.ui,
            Dashboard::Provider(b) => &mut b.ui,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Screen {
    Blank,
    Dashboard(Dashboard),
    JobDetail(JobDetail),
    Services(ServiceCatalog),
}

impl Screen {
    fn mount(&mut self) -> Command {
        match self {
            Screen::Blank => Command::none(),
            Screen::Dashboard(d) => d.mount(),
            Screen::JobDetail(j) => j.mount(),
            Screen::Services(s) => s.mount(),
        }
    }

    fn update(&mut self, message: Message) -> Command {
        match self {
            Screen::Blank => Command::none(),
            Screen::Dashboard(d) => d.update(message),
            Screen::JobDetail(j) => j.update(message),
            Screen::Services(s) => s.update(message),
        }
    }

    pub fn ui(&self) -> Option<&UiState> {
        match self {
            Screen::Blank => None,
            Screen::Dashboard(d) => Some(d.ui()),
            Screen::JobDetail(j) => Some(&j.ui),
            Screen::Services(s) => Some(&s.ui),
        }
    }

    fn ui_mut(&mut self) -> Option<&mut UiState> {
        match self {
            Screen::Blank => None,
            Screen::Dashboard(d) => Some(d.ui_mut()),
            Screen::JobDetail(j) => Some(&mut j.ui),
            Screen::Services(s) => Some(&mut s.ui),
        }
    }
}

/// Top-level state: who is signed in, which screen is up, and the runtime
/// that carries out whatever the screen asks for.
pub struct App {
    runtime: Runtime,
    user: Option<User>,
    route: Route,
    screen: Screen,
    mount: Option<MountId>,
    poll_every: Duration,
    pub ui: UiState,
}

impl App {
    pub fn new(runtime: Runtime, poll_every: Duration) -> Self {
        Self {
            runtime,
            user: None,
            route: Route::default(),
            screen: Screen::Blank,
            mount: None,
            poll_every,
            ui: UiState::default(),
        }
    }

    /// Kicks off session restore. The route leaves `CheckingSession` once it answers.
    pub fn start(&mut self) {
        self.runtime.execute(SESSION_MOUNT, Command::single(Effect::Restore));
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn current_mount(&self) -> Option<MountId> {
        self.mount
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Alerts of the current screen, or the app-level ones on the login route.
    pub fn alerts(&self) -> &UiState {
        self.screen.ui().unwrap_or(&self.ui)
    }

    pub fn dismiss_alert(&mut self, id: u64) {
        self.ui.dismiss(id);
        if let Some(ui) = self.screen.ui_mut() {
            ui.dismiss(id);
        }
    }

    pub async fn next_delivery(&mut self) -> Option<Delivery> {
        self.runtime.next().await
    }

    /// Applies results until nothing arrives for `idle`. Returns how many were applied.
    pub async fn pump(&mut self, idle: Duration) -> usize {
        let mut applied = 0;
        while let Ok(Some(delivery)) = tokio::time::timeout(idle, self.runtime.next()).await {
            self.deliver(delivery);
            applied += 1;
        }
        applied
    }

    pub fn deliver(&mut self, delivery: Delivery) {
        if delivery.mount == SESSION_MOUNT || Some(delivery.mount) == self.mount {
            self.update(delivery.message);
        } else {
            debug!("Dropping message for stale mount {}", delivery.mount);
        }
    }

    pub fn update(&mut self, message: Message) {
        if message.is_session_rejection() && self.user.is_some() {
            warn!("Session rejected by the server, logging out");
            self.logout();
            self.ui.push(AlertLevel::Error, SESSION_EXPIRED);
            return;
        }
        match message {
            Message::LoginSubmitted { email, password } => {
                self.ui.clear_alerts();
                self.ui.start("login");
                self.runtime.execute(SESSION_MOUNT, Command::single(Effect::Login { email, password }));
            }
            Message::RegisterSubmitted(form) => {
                self.ui.clear_alerts();
                self.ui.start("register");
                self.runtime.execute(SESSION_MOUNT, Command::single(Effect::Register(form)));
            }
            Message::LoggedIn(result) | Message::Registered(result) => {
                self.ui.finish("login");
                self.ui.finish("register");
                match result {
                    Ok(user) => self.signed_in(user),
                    Err(e) => {
                        self.ui.error(&e);
                    }
                }
            }
            Message::SessionRestored(Some(user)) => self.signed_in(user),
            Message::SessionRestored(None) => self.navigate(Route::Login),
            Message::LogoutPressed => self.logout(),
            Message::LoggedOut => debug!("Server-side logout finished"),
            Message::OpenDashboard => self.navigate(Route::Dashboard),
            Message::OpenJob(id) => self.navigate(Route::JobDetail(id)),
            Message::OpenServices => self.navigate(Route::Services),
            Message::DismissAlert(id) => self.dismiss_alert(id),
            other => self.forward(other),
        }
    }

    fn forward(&mut self, message: Message) {
        let Some(mount) = self.mount else {
            debug!("No screen mounted for {:?}", message);
            return;
        };
        let command = self.screen.update(message);
        self.runtime.execute(mount, command);
    }

    fn signed_in(&mut self, user: User) {
        info!("Signed in as {} ({:?})", user.display_name(), user.role);
        self.user = Some(user);
        self.ui.clear_alerts();
        self.navigate(Route::Dashboard);
    }

    fn logout(&mut self) {
        self.user = None;
        self.navigate(Route::Login);
        self.runtime.execute(SESSION_MOUNT, Command::single(Effect::Logout));
    }

    fn navigate(&mut self, route: Route) {
        let user = self.user.clone();
        let screen = match (user, route) {
            (None, Route::Login) | (None, Route::CheckingSession) => Screen::Blank,
            (None, _) => {
                self.ui.push(AlertLevel::Info, "Please log in first.");
                return self.navigate(Route::Login);
            }
            (Some(_), Route::Login) | (Some(_), Route::CheckingSession) => return self.navigate(Route::Dashboard),
            (Some(user), Route::Dashboard) => Screen::Dashboard(Dashboard::for_user(&user, self.poll_every)),
            (Some(user), Route::JobDetail(id)) => Screen::JobDetail(JobDetail::new(id, user)),
            (Some(user), Route::Services) if user.is_provider() => Screen::Services(ServiceCatalog::new(user)),
            (Some(_), Route::Services) => {
                if let Some(ui) = self.screen.ui_mut() {
                    ui.push(AlertLevel::Error, "Only providers manage a service catalogue.");
                }
                return;
            }
        };

        if let Some(old) = self.mount.take() {
            self.runtime.teardown(old);
        }
        self.route = route;
        self.screen = screen;
        if matches!(self.screen, Screen::Blank) {
            return;
        }
        let mount = self.runtime.mount();
        self.mount = Some(mount);
        let command = self.screen.mount();
        self.runtime.execute(mount, command);
    }
}
