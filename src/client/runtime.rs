use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::client::models::messages::{ApiReply, Message};
use crate::client::services::auth_service::AuthSession;
use crate::client::services::realtime_client::{ChannelAuthorizer, RealtimeClient, RealtimeConfig, Subscription};
use crate::client::services::service_api::QuickAssistApi;
use crate::common::error::{ClientError, Result};
use crate::common::models::{Coordinates, JobId, JobStatus, NewServiceRequest, RegisterForm, ServiceId, UserId};

/// One backend call a controller wants made.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    MyRequests,
    AvailableRequests,
    RequestDetails(JobId),
    ChatMessages(JobId),
    CreateRequest(NewServiceRequest),
    Accept(JobId),
    Decline(JobId),
    UpdateStatus(JobId, JobStatus),
    SendChat { job: JobId, text: String },
    CreateReview { job: JobId, rating: u8, comment: Option<String> },
    InitiatePayment { job: JobId, phone_number: String, amount: f64 },
    LogCash(JobId),
    ServiceCategories,
    MyServices,
    AddService(ServiceId),
    RemoveService(ServiceId),
    ProviderReviews(UserId),
    UpdateLocation(JobId, Coordinates),
}

impl ApiCall {
    pub fn key(&self) -> String {
        match self {
            ApiCall::MyRequests => "my_requests".to_string(),
            ApiCall::AvailableRequests => "available_requests".to_string(),
            ApiCall::RequestDetails(id) => format!("request_details:{}", id),
            ApiCall::ChatMessages(id) => format!("chat_messages:{}", id),
            ApiCall::CreateRequest(_) => "create_request".to_string(),
            ApiCall::Accept(id) => format!("accept:{}", id),
            ApiCall::Decline(id) => format!("decline:{}", id),
            ApiCall::UpdateStatus(id, _) => format!("update_status:{}", id),
            ApiCall::SendChat { job, .. } => format!("send_chat:{}", job),
            ApiCall::CreateReview { job, .. } => format!("review:{}", job),
            ApiCall::InitiatePayment { job, .. } | ApiCall::LogCash(job) => format!("payment:{}", job),
            ApiCall::ServiceCategories => "service_categories".to_string(),
            ApiCall::MyServices => "my_services".to_string(),
            ApiCall::AddService(id) | ApiCall::RemoveService(id) => format!("toggle_service:{}", id),
            ApiCall::ProviderReviews(id) => format!("provider_reviews:{}", id),
            ApiCall::UpdateLocation(id, _) => format!("location:{}", id),
        }
    }

    pub async fn perform(self, api: &dyn QuickAssistApi) -> ApiReply {
        match self {
            ApiCall::MyRequests => ApiReply::MyRequests(api.my_requests().await),
            ApiCall::AvailableRequests => ApiReply::AvailableRequests(api.available_requests().await),
            ApiCall::RequestDetails(id) => ApiReply::RequestDetails(id, api.request_details(id).await),
            ApiCall::ChatMessages(id) => ApiReply::ChatMessages(id, api.chat_messages(id).await),
            ApiCall::CreateRequest(request) => ApiReply::RequestCreated(api.create_request(&request).await),
            ApiCall::Accept(id) => ApiReply::Accepted(id, api.accept_request(id).await),
            ApiCall::Decline(id) => ApiReply::Declined(id, api.decline_request(id).await),
            ApiCall::UpdateStatus(id, status) => ApiReply::StatusUpdated(id, api.update_status(id, status).await),
            ApiCall::SendChat { job, text } => {
                let result = api.send_chat_message(job, &text).await;
                ApiReply::ChatSent { job, text, result }
            }
            ApiCall::CreateReview { job, rating, comment } => {
                ApiReply::ReviewCreated(job, api.create_review(job, rating, comment.as_deref()).await)
            }
            ApiCall::InitiatePayment { job, phone_number, amount } => {
                ApiReply::PaymentInitiated(job, api.initiate_payment(job, &phone_number, amount).await)
            }
            ApiCall::LogCash(job) => ApiReply::CashLogged(job, api.log_cash_payment(job).await),
            ApiCall::ServiceCategories => ApiReply::ServiceCategories(api.service_categories().await),
            ApiCall::MyServices => ApiReply::MyServices(api.my_services().await),
            ApiCall::AddService(id) => ApiReply::ServiceAdded(id, api.add_service(id).await),
            ApiCall::RemoveService(id) => ApiReply::ServiceRemoved(id, api.remove_service(id).await),
            ApiCall::ProviderReviews(id) => ApiReply::ProviderReviews(id, api.provider_reviews(id).await),
            ApiCall::UpdateLocation(id, at) => ApiReply::LocationShared(id, api.update_location(id, at).await),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Call(ApiCall),
    Subscribe(String),
    Unsubscribe(String),
    StartPolling(Duration),
    StopPolling,
    Login { email: String, password: String },
    Register(RegisterForm),
    Logout,
    Restore,
}

/// A batch of effects, returned by every controller transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    effects: Vec<Effect>,
}

impl Command {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn single(effect: Effect) -> Self {
        Self { effects: vec![effect] }
    }

    pub fn call(call: ApiCall) -> Self {
        Self::single(Effect::Call(call))
    }

    pub fn batch(commands: impl IntoIterator<Item = Command>) -> Self {
        Self { effects: commands.into_iter().flat_map(|c| c.effects).collect() }
    }

    pub fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn calls(&self) -> Vec<&ApiCall> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::Call(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn has_call(&self, call: &ApiCall) -> bool {
        self.calls().into_iter().any(|c| c == call)
    }

    pub fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}

pub type MountId = u64;

/// Mount the session effects run under. It is never torn down.
pub const SESSION_MOUNT: MountId = 0;

#[derive(Debug, Clone)]
pub struct Delivery {
    pub mount: MountId,
    pub message: Message,
}

enum Inbound {
    Deliver(Delivery),
    Subscribed { mount: MountId, subscription: Subscription },
}

#[derive(Default)]
struct MountResources {
    subscriptions: Vec<Subscription>,
    poller: Option<JoinHandle<()>>,
}

impl Drop for MountResources {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

/// Lazily opened, shared connection to the pub/sub service.
#[derive(Clone)]
pub struct RealtimeHub {
    config: Option<RealtimeConfig>,
    authorizer: Arc<dyn ChannelAuthorizer>,
    client: Arc<Mutex<Option<RealtimeClient>>>,
}

impl RealtimeHub {
    pub fn new(config: Option<RealtimeConfig>, authorizer: Arc<dyn ChannelAuthorizer>) -> Self {
        Self { config, authorizer, client: Arc::new(Mutex::new(None)) }
    }

    /// A hub around an already open client.
    pub fn with_client(client: RealtimeClient, authorizer: Arc<dyn ChannelAuthorizer>) -> Self {
        Self { config: None, authorizer, client: Arc::new(Mutex::new(Some(client))) }
    }

    pub async fn client(&self) -> Result<RealtimeClient> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref().filter(|c| c.is_connected()) {
            return Ok(client.clone());
        }
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ClientError::Realtime("realtime updates disabled (no app key configured)".to_string()))?;
        let client = RealtimeClient::connect(config, self.authorizer.clone()).await?;
        *guard = Some(client.clone());
        Ok(client)
    }

    pub async fn disconnect(&self) {
        if let Some(client) = self.client.lock().await.take() {
            client.close();
        }
    }
}

/// Executes effects on spawned tasks and hands results back in arrival order,
/// dropping anything addressed to a mount that no longer exists.
pub struct Runtime {
    api: Arc<dyn QuickAssistApi>,
    session: AuthSession,
    realtime: RealtimeHub,
    tx: mpsc::UnboundedSender<Inbound>,
    rx: mpsc::UnboundedReceiver<Inbound>,
    live: HashMap<MountId, MountResources>,
    next_mount: MountId,
}

impl Runtime {
    pub fn new(api: Arc<dyn QuickAssistApi>, session: AuthSession, realtime: RealtimeHub) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut live = HashMap::new();
        live.insert(SESSION_MOUNT, MountResources::default());
        Self { api, session, realtime, tx, rx, live, next_mount: SESSION_MOUNT }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn mount(&mut self) -> MountId {
        self.next_mount += 1;
        self.live.insert(self.next_mount, MountResources::default());
        debug!("Mounted {}", self.next_mount);
        self.next_mount
    }

    /// Releases the mount's subscriptions and poller.
    pub fn teardown(&mut self, mount: MountId) {
        if mount == SESSION_MOUNT {
            return;
        }
        if let Some(resources) = self.live.remove(&mount) {
            debug!("Tearing down mount {} ({} subscriptions)", mount, resources.subscriptions.len());
        }
    }

    pub fn is_live(&self, mount: MountId) -> bool {
        self.live.contains_key(&mount)
    }

    pub fn is_polling(&self, mount: MountId) -> bool {
        self.live.get(&mount).map(|r| r.poller.is_some()).unwrap_or(false)
    }

    pub fn subscribed_channels(&self, mount: MountId) -> Vec<String> {
        self.live
            .get(&mount)
            .map(|r| r.subscriptions.iter().map(|s| s.channel().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn execute(&mut self, mount: MountId, command: Command) {
        if !self.is_live(mount) {
            debug!("Ignoring command for unmounted {}", mount);
            return;
        }
        for effect in command.into_effects() {
            self.run(mount, effect);
        }
    }

    fn deliver(&self, mount: MountId, message: Message) {
        let _ = self.tx.send(Inbound::Deliver(Delivery { mount, message }));
    }

    fn spawn_reply<F>(&self, mount: MountId, task: F)
    where
        F: std::future::Future<Output = Message> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let message = task.await;
            let _ = tx.send(Inbound::Deliver(Delivery { mount, message }));
        });
    }

    fn run(&mut self, mount: MountId, effect: Effect) {
        match effect {
            Effect::Call(call) => {
                let api = self.api.clone();
                debug!("Mount {} -> {}", mount, call.key());
                self.spawn_reply(mount, async move { Message::Api(call.perform(api.as_ref()).await) });
            }
            Effect::Subscribe(channel) => self.subscribe(mount, channel),
            Effect::Unsubscribe(channel) => {
                if let Some(resources) = self.live.get_mut(&mount) {
                    resources.subscriptions.retain(|s| s.channel() != channel);
                }
            }
            Effect::StartPolling(every) => self.start_polling(mount, every),
            Effect::StopPolling => {
                if let Some(poller) = self.live.get_mut(&mount).and_then(|r| r.poller.take()) {
                    poller.abort();
                    debug!("Stopped polling for mount {}", mount);
                }
            }
            Effect::Login { email, password } => {
                let session = self.session.clone();
                self.spawn_reply(mount, async move { Message::LoggedIn(session.login(&email, &password).await) });
            }
            Effect::Register(form) => {
                let session = self.session.clone();
                self.spawn_reply(mount, async move { Message::Registered(session.register(&form).await) });
            }
            Effect::Logout => {
                let session = self.session.clone();
                let realtime = self.realtime.clone();
                self.spawn_reply(mount, async move {
                    session.logout().await;
                    realtime.disconnect().await;
                    Message::LoggedOut
                });
            }
            Effect::Restore => {
                let session = self.session.clone();
                self.spawn_reply(mount, async move { Message::SessionRestored(session.restore().await) });
            }
        }
    }

    fn subscribe(&mut self, mount: MountId, channel: String) {
        let realtime = self.realtime.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result: Result<Subscription> = async {
                let client = realtime.client().await?;
                client.subscribe(&channel).await
            }
            .await;
            match result {
                Ok(mut subscription) => {
                    let forward = tx.clone();
                    let name = channel.clone();
                    subscription.bind_all(move |event| {
                        let message = Message::Realtime { channel: name.clone(), event: event.clone() };
                        let _ = forward.send(Inbound::Deliver(Delivery { mount, message }));
                    });
                    let _ = tx.send(Inbound::Subscribed { mount, subscription });
                }
                Err(error) => {
                    warn!("Could not subscribe to {}: {}", channel, error);
                    let _ = tx.send(Inbound::Deliver(Delivery { mount, message: Message::SubscriptionFailed { channel, error } }));
                }
            }
        });
    }

    fn start_polling(&mut self, mount: MountId, every: Duration) {
        let tx = self.tx.clone();
        let poller = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(Inbound::Deliver(Delivery { mount, message: Message::PollTick })).is_err() {
                    break;
                }
            }
        });
        match self.live.get_mut(&mount) {
            Some(resources) => {
                if let Some(previous) = resources.poller.replace(poller) {
                    previous.abort();
                }
                debug!("Polling every {:?} for mount {}", every, mount);
            }
            None => poller.abort(),
        }
    }

    /// Waits for the next result addressed to a live mount.
    pub async fn next(&mut self) -> Option<Delivery> {
        loop {
            match self.rx.recv().await? {
                Inbound::Deliver(delivery) if self.live.contains_key(&delivery.mount) => return Some(delivery),
                Inbound::Deliver(delivery) => debug!("Dropping result for torn-down mount {}", delivery.mount),
                Inbound::Subscribed { mount, subscription } => match self.live.get_mut(&mount) {
                    Some(resources) => resources.subscriptions.push(subscription),
                    // dropping the handle leaves the channel
                    None => debug!("Mount {} gone before {} was joined", mount, subscription.channel()),
                },
            }
        }
    }

    /// Posts a message to a mount as if a task had produced it.
    pub fn post(&self, mount: MountId, message: Message) {
        self.deliver(mount, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err<T>() -> Result<T> {
        Err(ClientError::Transient("x".into()))
    }

    #[test]
    fn call_and_reply_keys_line_up() {
        let pairs = vec![
            (ApiCall::Accept(12), ApiReply::Accepted(12, err())),
            (ApiCall::Decline(12), ApiReply::Declined(12, err())),
            (ApiCall::AvailableRequests, ApiReply::AvailableRequests(err())),
            (ApiCall::SendChat { job: 3, text: "hi".into() }, ApiReply::ChatSent { job: 3, text: "hi".into(), result: err() }),
            (ApiCall::LogCash(4), ApiReply::CashLogged(4, err())),
            (ApiCall::RemoveService(8), ApiReply::ServiceRemoved(8, err())),
        ];
        for (call, reply) in pairs {
            assert_eq!(call.key(), reply.key());
        }
    }

    #[test]
    fn batch_flattens_in_order() {
        let cmd = Command::batch([
            Command::call(ApiCall::MyRequests),
            Command::none(),
            Command::single(Effect::Subscribe("private-user-1".into())),
        ]);
        assert_eq!(cmd.effects().len(), 2);
        assert!(cmd.has_call(&ApiCall::MyRequests));
        assert_eq!(cmd.effects()[1], Effect::Subscribe("private-user-1".into()));
    }
}
