use crate::client::services::realtime_message::RealtimeEvent;
use crate::common::error::{ClientError, Result};
use crate::common::models::{
    ActionReceipt, AvailableRequest, ChatMessage, Coordinates, JobId, ProviderReviews, RegisterForm, Service,
    ServiceCategory, ServiceId, ServiceRequest, User, UserId,
};

#[derive(Debug, Clone)]
pub enum Message {
    // Session
    LoginSubmitted { email: String, password: String },
    RegisterSubmitted(RegisterForm),
    LogoutPressed,
    LoggedIn(Result<User>),
    Registered(Result<User>),
    SessionRestored(Option<User>),
    LoggedOut,

    // Navigation
    OpenDashboard,
    OpenJob(JobId),
    OpenServices,

    // Shared list actions
    Refresh,
    DismissAlert(u64),

    // Customer dashboard
    CreateRequest { service: ServiceId, latitude: f64, longitude: f64 },

    // Provider board
    SetOnline(bool),
    AcceptJob(JobId),
    DeclineJob(JobId),
    AdvanceJob(JobId),
    PollTick,

    // Job detail
    DraftChanged(String),
    SendChat,
    CancelJob,
    SubmitReview { rating: u8, comment: Option<String> },
    PayMpesa { phone_number: String },
    PayCash,
    ShareLocation { latitude: f64, longitude: f64 },

    // Service catalogue
    ToggleService(ServiceId),

    // Results coming back from the runtime
    Api(ApiReply),
    Realtime { channel: String, event: RealtimeEvent },
    SubscriptionFailed { channel: String, error: ClientError },
}

/// The outcome of one backend call, tagged with what it was about.
#[derive(Debug, Clone)]
pub enum ApiReply {
    MyRequests(Result<Vec<ServiceRequest>>),
    AvailableRequests(Result<Vec<AvailableRequest>>),
    RequestDetails(JobId, Result<ServiceRequest>),
    ChatMessages(JobId, Result<Vec<ChatMessage>>),
    RequestCreated(Result<()>),
    Accepted(JobId, Result<ServiceRequest>),
    Declined(JobId, Result<()>),
    StatusUpdated(JobId, Result<ServiceRequest>),
    /// Carries the sent text so it can be put back into the draft on failure.
    ChatSent { job: JobId, text: String, result: Result<ChatMessage> },
    ReviewCreated(JobId, Result<()>),
    PaymentInitiated(JobId, Result<ActionReceipt>),
    CashLogged(JobId, Result<ActionReceipt>),
    ServiceCategories(Result<Vec<ServiceCategory>>),
    MyServices(Result<Vec<Service>>),
    ServiceAdded(ServiceId, Result<()>),
    ServiceRemoved(ServiceId, Result<()>),
    ProviderReviews(UserId, Result<ProviderReviews>),
    LocationShared(JobId, Result<Coordinates>),
}

impl ApiReply {
    /// In-flight key of the call this answers; matches [`ApiCall::key`](crate::client::runtime::ApiCall::key).
    pub fn key(&self) -> String {
        match self {
            ApiReply::MyRequests(_) => "my_requests".to_string(),
            ApiReply::AvailableRequests(_) => "available_requests".to_string(),
            ApiReply::RequestDetails(id, _) => format!("request_details:{}", id),
            ApiReply::ChatMessages(id, _) => format!("chat_messages:{}", id),
            ApiReply::RequestCreated(_) => "create_request".to_string(),
            ApiReply::Accepted(id, _) => format!("accept:{}", id),
            ApiReply::Declined(id, _) => format!("decline:{}", id),
            ApiReply::StatusUpdated(id, _) => format!("update_status:{}", id),
            ApiReply::ChatSent { job, .. } => format!("send_chat:{}", job),
            ApiReply::ReviewCreated(id, _) => format!("review:{}", id),
            ApiReply::PaymentInitiated(id, _) => format!("payment:{}", id),
            ApiReply::CashLogged(id, _) => format!("payment:{}", id),
            ApiReply::ServiceCategories(_) => "service_categories".to_string(),
            ApiReply::MyServices(_) => "my_services".to_string(),
            ApiReply::ServiceAdded(id, _) | ApiReply::ServiceRemoved(id, _) => format!("toggle_service:{}", id),
            ApiReply::ProviderReviews(id, _) => format!("provider_reviews:{}", id),
            ApiReply::LocationShared(id, _) => format!("location:{}", id),
        }
    }

    pub fn error(&self) -> Option<&ClientError> {
        match self {
            ApiReply::MyRequests(r) => r.as_ref().err(),
            ApiReply::AvailableRequests(r) => r.as_ref().err(),
            ApiReply::RequestDetails(_, r) | ApiReply::Accepted(_, r) | ApiReply::StatusUpdated(_, r) => r.as_ref().err(),
            ApiReply::ChatMessages(_, r) => r.as_ref().err(),
            ApiReply::RequestCreated(r) => r.as_ref().err(),
            ApiReply::Declined(_, r)
            | ApiReply::ReviewCreated(_, r)
            | ApiReply::ServiceAdded(_, r)
            | ApiReply::ServiceRemoved(_, r) => r.as_ref().err(),
            ApiReply::ChatSent { result, .. } => result.as_ref().err(),
            ApiReply::PaymentInitiated(_, r) | ApiReply::CashLogged(_, r) => r.as_ref().err(),
            ApiReply::ServiceCategories(r) => r.as_ref().err(),
            ApiReply::MyServices(r) => r.as_ref().err(),
            ApiReply::ProviderReviews(_, r) => r.as_ref().err(),
            ApiReply::LocationShared(_, r) => r.as_ref().err(),
        }
    }
}

impl Message {
    /// True for any backend rejection of the current session.
    pub fn is_session_rejection(&self) -> bool {
        match self {
            Message::Api(reply) => reply.error().map(ClientError::is_unauthorized).unwrap_or(false),
            Message::SubscriptionFailed { error, .. } => error.is_unauthorized(),
            _ => false,
        }
    }
}
