use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use crate::client::services::api_client::RestGateway;
use crate::client::services::realtime_message::ChannelGrant;
use crate::common::error::Result;
use crate::common::models::{
    ActionReceipt, AuthResponse, AvailableRequest, ChatMessage, Coordinates, JobId, JobStatus, NewServiceRequest,
    ProviderReviews, RegisterForm, Service, ServiceCategory, ServiceId, ServiceRequest, TokenPair, User, UserId,
};

/// One method per backend operation. Every call is a single round trip; the
/// result or the rejection goes straight back to the caller.
#[async_trait]
pub trait QuickAssistApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse>;
    async fn register(&self, form: &RegisterForm) -> Result<AuthResponse>;
    async fn profile(&self) -> Result<User>;
    /// Blacklists the refresh token. Takes the pair explicitly because the
    /// local session is already gone by the time this runs.
    async fn logout(&self, tokens: &TokenPair) -> Result<()>;

    async fn service_categories(&self) -> Result<Vec<ServiceCategory>>;
    async fn create_request(&self, request: &NewServiceRequest) -> Result<()>;
    async fn my_requests(&self) -> Result<Vec<ServiceRequest>>;
    async fn available_requests(&self) -> Result<Vec<AvailableRequest>>;
    async fn request_details(&self, job: JobId) -> Result<ServiceRequest>;
    async fn accept_request(&self, job: JobId) -> Result<ServiceRequest>;
    async fn decline_request(&self, job: JobId) -> Result<()>;
    async fn update_status(&self, job: JobId, status: JobStatus) -> Result<ServiceRequest>;

    async fn chat_messages(&self, job: JobId) -> Result<Vec<ChatMessage>>;
    async fn send_chat_message(&self, job: JobId, text: &str) -> Result<ChatMessage>;
    async fn authorize_channel(&self, socket_id: &str, channel_name: &str) -> Result<ChannelGrant>;

    async fn create_review(&self, job: JobId, rating: u8, comment: Option<&str>) -> Result<()>;
    async fn provider_reviews(&self, provider: UserId) -> Result<ProviderReviews>;

    async fn initiate_payment(&self, job: JobId, phone_number: &str, amount: f64) -> Result<ActionReceipt>;
    async fn log_cash_payment(&self, job: JobId) -> Result<ActionReceipt>;

    async fn my_services(&self) -> Result<Vec<Service>>;
    async fn add_service(&self, service: ServiceId) -> Result<()>;
    async fn remove_service(&self, service: ServiceId) -> Result<()>;

    async fn update_location(&self, job: JobId, at: Coordinates) -> Result<Coordinates>;
}

#[async_trait]
impl QuickAssistApi for RestGateway {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.post("auth/login/", &json!({ "email": email, "password": password }), "Invalid Credentials").await
    }

    async fn register(&self, form: &RegisterForm) -> Result<AuthResponse> {
        self.post("auth/register/", form, "Registration Failed").await
    }

    async fn profile(&self) -> Result<User> {
        self.get("auth/profile/", "Failed to fetch user profile").await
    }

    async fn logout(&self, tokens: &TokenPair) -> Result<()> {
        let builder = self
            .request_with_token(Method::POST, "auth/logout/", &tokens.access)?
            .json(&json!({ "refresh": tokens.refresh }));
        self.send_empty(builder, "Logout failed").await
    }

    async fn service_categories(&self) -> Result<Vec<ServiceCategory>> {
        self.get("services/categories/", "Failed to load service categories.").await
    }

    async fn create_request(&self, request: &NewServiceRequest) -> Result<()> {
        let builder = self.request(Method::POST, "services/requests/").await?.json(request);
        self.send_empty(builder, "Failed to create the service request.").await
    }

    async fn my_requests(&self) -> Result<Vec<ServiceRequest>> {
        self.get("services/requests/", "Failed to fetch your requests. Please try again later.").await
    }

    async fn available_requests(&self) -> Result<Vec<AvailableRequest>> {
        self.get("services/matching/available-requests/", "Could not search for new jobs.").await
    }

    async fn request_details(&self, job: JobId) -> Result<ServiceRequest> {
        self.get(
            &format!("services/requests/{}/", job),
            "Could not load job details. It may not exist or you may not have permission.",
        )
        .await
    }

    async fn accept_request(&self, job: JobId) -> Result<ServiceRequest> {
        self.post(&format!("services/requests/{}/accept/", job), &json!({}), "Failed to accept job. It may have been taken.")
            .await
    }

    async fn decline_request(&self, job: JobId) -> Result<()> {
        let builder = self.request(Method::POST, &format!("services/requests/{}/decline/", job)).await?;
        self.send_empty(builder, "Action failed. The job may no longer be available.").await
    }

    async fn update_status(&self, job: JobId, status: JobStatus) -> Result<ServiceRequest> {
        self.post(
            &format!("services/requests/{}/update_status/", job),
            &json!({ "status": status }),
            "Failed to update the job status.",
        )
        .await
    }

    async fn chat_messages(&self, job: JobId) -> Result<Vec<ChatMessage>> {
        self.get(&format!("communications/requests/{}/chat/", job), "Failed to load messages.").await
    }

    async fn send_chat_message(&self, job: JobId, text: &str) -> Result<ChatMessage> {
        self.post(&format!("communications/requests/{}/chat/", job), &json!({ "text": text }), "Failed to send message.")
            .await
    }

    async fn authorize_channel(&self, socket_id: &str, channel_name: &str) -> Result<ChannelGrant> {
        self.post(
            "communications/pusher/auth/",
            &json!({ "socket_id": socket_id, "channel_name": channel_name }),
            "You are not authorized to access this channel.",
        )
        .await
    }

    async fn create_review(&self, job: JobId, rating: u8, comment: Option<&str>) -> Result<()> {
        let builder = self
            .request(Method::POST, &format!("reviews/create/{}/", job))
            .await?
            .json(&json!({ "rating": rating, "comment": comment.unwrap_or("") }));
        self.send_empty(builder, "You have already reviewed this job.").await
    }

    async fn provider_reviews(&self, provider: UserId) -> Result<ProviderReviews> {
        self.get(&format!("reviews/provider/{}/", provider), "Failed to load reviews.").await
    }

    async fn initiate_payment(&self, job: JobId, phone_number: &str, amount: f64) -> Result<ActionReceipt> {
        self.post(
            &format!("services/requests/{}/initiate_payment/", job),
            &json!({ "phone_number": phone_number, "amount": amount }),
            "Failed to initiate M-Pesa payment.",
        )
        .await
    }

    async fn log_cash_payment(&self, job: JobId) -> Result<ActionReceipt> {
        self.post(&format!("payments/log_cash/{}/", job), &json!({}), "Failed to record cash payment.").await
    }

    async fn my_services(&self) -> Result<Vec<Service>> {
        self.get("auth/provider/services/", "Failed to load your services.").await
    }

    async fn add_service(&self, service: ServiceId) -> Result<()> {
        let builder = self
            .request(Method::POST, "auth/provider/services/")
            .await?
            .json(&json!({ "service_id": service }));
        self.send_empty(builder, "Failed to add the service.").await
    }

    async fn remove_service(&self, service: ServiceId) -> Result<()> {
        let builder = self
            .request(Method::DELETE, "auth/provider/services/")
            .await?
            .json(&json!({ "service_id": service }));
        self.send_empty(builder, "Failed to remove the service.").await
    }

    async fn update_location(&self, job: JobId, at: Coordinates) -> Result<Coordinates> {
        let builder = self
            .request(Method::PUT, &format!("tracking/requests/{}/location/", job))
            .await?
            .json(&json!({ "latitude": at.latitude, "longitude": at.longitude }));
        self.send_json(builder, "You are not assigned to this active service request.").await
    }
}
