use log::{debug, info};
use regex::Regex;
use std::sync::OnceLock;

use crate::client::controllers::record_list::RecordList;
use crate::client::controllers::{refetch, request, subscription_failed};
use crate::client::models::messages::{ApiReply, Message};
use crate::client::models::ui_state::{AlertLevel, UiState};
use crate::client::runtime::{ApiCall, Command, Effect};
use crate::client::services::realtime_message::{request_channel, RealtimeEvent};
use crate::common::error::ClientError;
use crate::common::job_status::ProviderStep;
use crate::common::models::{
    ChatMessage, Coordinates, JobId, JobStatus, LocationSample, ProviderReviews, ServiceRequest, User,
};

const MPESA_PHONE: &str = r"^254\d{9}$";

fn valid_mpesa_phone(phone: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(MPESA_PHONE).ok())
        .as_ref()
        .map(|re| re.is_match(phone))
        .unwrap_or(false)
}

/// What the viewer may do with the job right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Advance(ProviderStep),
    ShareLocation,
    Cancel,
    Pay,
    Review,
}

impl JobAction {
    pub fn label(self) -> &'static str {
        match self {
            JobAction::Advance(step) => step.label(),
            JobAction::ShareLocation => "Share Location",
            JobAction::Cancel => "Cancel Request",
            JobAction::Pay => "Make Payment",
            JobAction::Review => "Leave a Review",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobDetail {
    job_id: JobId,
    viewer: User,
    job: Option<ServiceRequest>,
    messages: RecordList<ChatMessage>,
    draft: String,
    location: Option<LocationSample>,
    provider_reviews: Option<ProviderReviews>,
    pub ui: UiState,
}

impl JobDetail {
    pub fn new(job_id: JobId, viewer: User) -> Self {
        Self {
            job_id,
            viewer,
            job: None,
            messages: RecordList::new(),
            draft: String::new(),
            location: None,
            provider_reviews: None,
            ui: UiState::default(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn job(&self) -> Option<&ServiceRequest> {
        self.job.as_ref()
    }

    pub fn viewer(&self) -> &User {
        &self.viewer
    }

    pub fn messages(&self) -> &RecordList<ChatMessage> {
        &self.messages
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn location(&self) -> Option<&LocationSample> {
        self.location.as_ref()
    }

    pub fn provider_reviews(&self) -> Option<&ProviderReviews> {
        self.provider_reviews.as_ref()
    }

    pub fn channel(&self) -> String {
        request_channel(self.job_id)
    }

    fn is_customer(&self) -> bool {
        self.job.as_ref().map(|j| j.is_customer(&self.viewer)).unwrap_or(false)
    }

    fn is_assigned_provider(&self) -> bool {
        self.job.as_ref().map(|j| j.is_assigned_to(&self.viewer)).unwrap_or(false)
    }

    fn status(&self) -> Option<JobStatus> {
        self.job.as_ref().map(|j| j.status)
    }

    pub fn next_step(&self) -> Option<ProviderStep> {
        if self.is_assigned_provider() {
            self.status().and_then(JobStatus::next_provider_step)
        } else {
            None
        }
    }

    pub fn can_pay(&self) -> bool {
        self.is_customer() && self.status() == Some(JobStatus::Completed)
    }

    pub fn can_review(&self) -> bool {
        self.can_pay() && self.job.as_ref().map(|j| j.review.is_none()).unwrap_or(false)
    }

    pub fn can_cancel(&self) -> bool {
        self.is_customer() && self.status().map(JobStatus::customer_can_cancel).unwrap_or(false)
    }

    pub fn can_share_location(&self) -> bool {
        self.is_assigned_provider() && matches!(self.status(), Some(JobStatus::Accepted | JobStatus::InProgress))
    }

    pub fn actions(&self) -> Vec<JobAction> {
        let mut actions = Vec::new();
        if let Some(step) = self.next_step() {
            actions.push(JobAction::Advance(step));
        }
        if self.can_share_location() {
            actions.push(JobAction::ShareLocation);
        }
        if self.can_cancel() {
            actions.push(JobAction::Cancel);
        }
        if self.can_pay() {
            actions.push(JobAction::Pay);
        }
        if self.can_review() {
            actions.push(JobAction::Review);
        }
        actions
    }

    pub fn mount(&mut self) -> Command {
        Command::batch([
            request(&mut self.ui, ApiCall::RequestDetails(self.job_id)),
            request(&mut self.ui, ApiCall::ChatMessages(self.job_id)),
            Command::single(Effect::Subscribe(self.channel())),
        ])
    }

    fn refetch(&mut self) -> Command {
        refetch(&mut self.ui, ApiCall::RequestDetails(self.job_id))
    }

    fn refetch_chat(&mut self) -> Command {
        refetch(&mut self.ui, ApiCall::ChatMessages(self.job_id))
    }

    fn refuse(&mut self, text: impl Into<String>) -> Command {
        self.ui.push(AlertLevel::Error, text);
        Command::none()
    }

    pub fn update(&mut self, message: Message) -> Command {
        match message {
            Message::Refresh => Command::batch([self.refetch(), self.refetch_chat()]),
            Message::DraftChanged(text) => {
                self.draft = text;
                Command::none()
            }
            Message::SendChat => self.send_chat(),
            Message::AdvanceJob(id) if id == self.job_id => match self.next_step() {
                Some(step) => request(&mut self.ui, ApiCall::UpdateStatus(self.job_id, step.target())),
                None => self.refuse("There is no further action for this job."),
            },
            Message::CancelJob => {
                if !self.can_cancel() {
                    return self.refuse("This request can no longer be cancelled.");
                }
                request(&mut self.ui, ApiCall::UpdateStatus(self.job_id, JobStatus::Cancelled))
            }
            Message::SubmitReview { rating, comment } => self.submit_review(rating, comment),
            Message::PayMpesa { phone_number } => self.pay_mpesa(phone_number),
            Message::PayCash => {
                if !self.can_pay() {
                    return self.refuse("Payment is only possible once the job is completed.");
                }
                request(&mut self.ui, ApiCall::LogCash(self.job_id))
            }
            Message::ShareLocation { latitude, longitude } => {
                if !self.can_share_location() {
                    return self.refuse("Only the assigned provider can share a location while the job is active.");
                }
                match Coordinates::validate(latitude, longitude) {
                    Ok(at) => request(&mut self.ui, ApiCall::UpdateLocation(self.job_id, at)),
                    Err(problem) => self.refuse(problem),
                }
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

    fn send_chat(&mut self) -> Command {
        let text = self.draft.trim().to_string();
        if text.is_empty() {
            return Command::none();
        }
        self.draft.clear();
        request(&mut self.ui, ApiCall::SendChat { job: self.job_id, text })
    }

    fn submit_review(&mut self, rating: u8, comment: Option<String>) -> Command {
        if !self.can_review() {
            return self.refuse("You can only review a completed job once.");
        }
        if !(1..=5).contains(&rating) {
            return self.refuse("Please select a rating from 1 to 5 stars.");
        }
        let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        request(&mut self.ui, ApiCall::CreateReview { job: self.job_id, rating, comment })
    }

    fn pay_mpesa(&mut self, phone_number: String) -> Command {
        if !self.can_pay() {
            return self.refuse("Payment is only possible once the job is completed.");
        }
        let phone_number = phone_number.trim().to_string();
        if !valid_mpesa_phone(&phone_number) {
            return self.refuse("Please enter a valid phone number in the format 254XXXXXXXXX.");
        }
        let amount = match self.job.as_ref().and_then(ServiceRequest::amount_due) {
            Some(amount) if amount > 0.0 => amount,
            _ => return self.refuse("This job has no price to pay."),
        };
        request(&mut self.ui, ApiCall::InitiatePayment { job: self.job_id, phone_number, amount })
    }

    fn on_reply(&mut self, reply: ApiReply) -> Command {
        let key = reply.key();
        self.ui.finish(&key);
        let repeat = self.ui.take_stale(&key);
        let command = self.apply_reply(reply);
        if !repeat {
            return command;
        }
        let again = if key == ApiCall::RequestDetails(self.job_id).key() {
            self.refetch()
        } else if key == ApiCall::ChatMessages(self.job_id).key() {
            self.refetch_chat()
        } else {
            Command::none()
        };
        Command::batch([command, again])
    }

    fn apply_reply(&mut self, reply: ApiReply) -> Command {
        match reply {
            ApiReply::RequestDetails(id, Ok(job)) if id == self.job_id => self.set_job(job),
            ApiReply::ChatMessages(id, Ok(list)) if id == self.job_id => {
                self.merge_history(list);
                Command::none()
            }
            ApiReply::ChatSent { job, result: Ok(message), .. } if job == self.job_id => {
                self.messages.append_unique(message);
                Command::none()
            }
            ApiReply::ChatSent { job, text, result: Err(e) } if job == self.job_id => {
                if self.draft.is_empty() {
                    self.draft = text;
                }
                self.ui.error(&e);
                Command::none()
            }
            ApiReply::StatusUpdated(id, Ok(job)) if id == self.job_id => {
                info!("Job {} is now {}", id, job.status);
                self.ui.success(format!("Job status updated to {}.", job.status));
                self.set_job(job)
            }
            ApiReply::ReviewCreated(id, Ok(())) if id == self.job_id => {
                self.ui.success("Thank you for your review!");
                self.refetch()
            }
            ApiReply::PaymentInitiated(id, Ok(receipt)) if id == self.job_id => {
                self.ui.success(
                    receipt.message.unwrap_or_else(|| "Payment initiated. Please check your phone to complete the payment.".to_string()),
                );
                self.refetch()
            }
            ApiReply::CashLogged(id, Ok(receipt)) if id == self.job_id => {
                self.ui.success(receipt.message.unwrap_or_else(|| "Cash payment recorded.".to_string()));
                self.refetch()
            }
            ApiReply::LocationShared(id, Ok(at)) if id == self.job_id => {
                self.location = Some(LocationSample::new(Some(self.viewer.id), at));
                Command::none()
            }
            ApiReply::ProviderReviews(_, Ok(reviews)) => {
                self.provider_reviews = Some(reviews);
                Command::none()
            }
            ApiReply::ProviderReviews(_, Err(e)) => {
                debug!("Provider reviews unavailable: {}", e);
                Command::none()
            }
            ApiReply::RequestDetails(_, Err(e)) | ApiReply::ChatMessages(_, Err(e)) => {
                self.ui.error(&e);
                Command::none()
            }
            other => match other.error().cloned() {
                Some(e) => self.on_failure(e),
                None => Command::none(),
            },
        }
    }

    fn on_failure(&mut self, error: ClientError) -> Command {
        self.ui.error(&error);
        match error {
            // already reviewed, already moved on: show the server's record
            ClientError::Conflict(_) | ClientError::Validation { .. } if self.job.is_some() => self.refetch(),
            _ => Command::none(),
        }
    }

    fn set_job(&mut self, job: ServiceRequest) -> Command {
        let provider = job.provider.as_ref().map(|p| p.id);
        let had_provider = self.job.as_ref().and_then(|j| j.provider.as_ref()).map(|p| p.id);
        self.job = Some(job);
        match provider {
            Some(id) if had_provider != Some(id) || self.provider_reviews.is_none() => {
                let call = ApiCall::ProviderReviews(id);
                if self.ui.is_loading(&call.key()) {
                    Command::none()
                } else {
                    request(&mut self.ui, call)
                }
            }
            _ => Command::none(),
        }
    }

    /// Takes the fetched history as the base and keeps anything pushed before
    /// it arrived.
    fn merge_history(&mut self, fetched: Vec<ChatMessage>) {
        let pushed: Vec<ChatMessage> = self.messages.iter().cloned().collect();
        self.messages.replace_all(fetched);
        for message in pushed {
            self.messages.append_unique(message);
        }
        self.messages.sort_by_key(|m| (m.created_at, m.id));
    }

    fn on_event(&mut self, event: RealtimeEvent) -> Command {
        match event {
            RealtimeEvent::NewMessage(message) => {
                if !self.messages.append_unique(*message) {
                    debug!("Duplicate chat message ignored");
                }
                Command::none()
            }
            RealtimeEvent::ProviderLocation(at) => {
                let provider = self.job.as_ref().and_then(|j| j.provider.as_ref()).map(|p| p.id);
                self.location = Some(LocationSample::new(provider, at));
                Command::none()
            }
            RealtimeEvent::StatusUpdate(_) | RealtimeEvent::RequestAccepted(_) => self.refetch(),
            RealtimeEvent::Other { event, .. } => {
                debug!("Ignoring '{}' on job {}", event, self.job_id);
                Command::none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::controllers::fixtures::{chat, customer, job, provider};
    use crate::common::models::{ActionReceipt, Review};
    use serde_json::json;

    fn detail(viewer: User, job: ServiceRequest) -> JobDetail {
        let mut d = JobDetail::new(job.id, viewer);
        d.mount();
        d.update(Message::Api(ApiReply::RequestDetails(job.id, Ok(job))));
        d
    }

    fn event(d: &JobDetail, event: RealtimeEvent) -> Message {
        Message::Realtime { channel: d.channel(), event }
    }

    #[test]
    fn mount_fetches_job_chat_and_subscribes() {
        let mut d = JobDetail::new(30, customer(1));
        let cmd = d.mount();
        assert!(cmd.has_call(&ApiCall::RequestDetails(30)));
        assert!(cmd.has_call(&ApiCall::ChatMessages(30)));
        assert!(cmd.effects().contains(&Effect::Subscribe("private-request-30".into())));
    }

    #[test]
    fn provider_next_action_follows_status() {
        let assigned = provider(2, true);
        assert_eq!(detail(assigned.clone(), job(1, JobStatus::Accepted)).next_step(), Some(ProviderStep::Start));
        assert_eq!(detail(assigned.clone(), job(1, JobStatus::InProgress)).next_step(), Some(ProviderStep::Complete));
        for status in [JobStatus::Pending, JobStatus::Completed, JobStatus::Cancelled, JobStatus::Declined] {
            assert_eq!(detail(assigned.clone(), job(1, status)).next_step(), None);
        }
        // the customer never gets provider steps
        assert_eq!(detail(customer(1), job(1, JobStatus::Accepted)).next_step(), None);
    }

    #[test]
    fn pay_and_review_only_when_completed() {
        for status in [JobStatus::Pending, JobStatus::Accepted, JobStatus::InProgress, JobStatus::Cancelled] {
            let d = detail(customer(1), job(1, status));
            assert!(!d.can_pay());
            assert!(!d.can_review());
        }
        let d = detail(customer(1), job(1, JobStatus::Completed));
        assert_eq!(d.actions(), vec![JobAction::Pay, JobAction::Review]);
    }

    #[test]
    fn review_disabled_once_reviewed() {
        let mut reviewed = job(1, JobStatus::Completed);
        reviewed.review = Some(Review { id: Some(1), rating: 5, comment: None, customer_name: None, created_at: None });
        let mut d = detail(customer(1), reviewed);
        assert!(d.can_pay());
        assert!(!d.can_review());
        assert!(d.update(Message::SubmitReview { rating: 4, comment: None }).is_empty());
    }

    #[test]
    fn review_rating_must_be_one_to_five() {
        let mut d = detail(customer(1), job(1, JobStatus::Completed));
        assert!(d.update(Message::SubmitReview { rating: 0, comment: None }).is_empty());
        assert!(d.update(Message::SubmitReview { rating: 6, comment: None }).is_empty());
        let cmd = d.update(Message::SubmitReview { rating: 5, comment: Some("  great  ".into()) });
        assert!(cmd.has_call(&ApiCall::CreateReview { job: 1, rating: 5, comment: Some("great".into()) }));
        let after = d.update(Message::Api(ApiReply::ReviewCreated(1, Ok(()))));
        assert!(after.has_call(&ApiCall::RequestDetails(1)));
    }

    #[test]
    fn conflict_on_review_refetches() {
        let mut d = detail(customer(1), job(1, JobStatus::Completed));
        d.update(Message::SubmitReview { rating: 5, comment: None });
        let cmd = d.update(Message::Api(ApiReply::ReviewCreated(
            1,
            Err(ClientError::Conflict("You have already reviewed this job.".into())),
        )));
        assert!(cmd.has_call(&ApiCall::RequestDetails(1)));
        assert_eq!(d.ui.last_alert().unwrap().text, "You have already reviewed this job.");
    }

    #[test]
    fn mpesa_checks_phone_and_uses_final_price() {
        let mut completed = job(1, JobStatus::Completed);
        completed.final_price = Some(2000.0);
        let mut d = detail(customer(1), completed);
        assert!(d.update(Message::PayMpesa { phone_number: "0712345678".into() }).is_empty());
        assert!(d.update(Message::PayMpesa { phone_number: "2547123456789".into() }).is_empty());
        let cmd = d.update(Message::PayMpesa { phone_number: " 254712345678 ".into() });
        assert!(cmd.has_call(&ApiCall::InitiatePayment { job: 1, phone_number: "254712345678".into(), amount: 2000.0 }));

        let after = d.update(Message::Api(ApiReply::PaymentInitiated(1, Ok(ActionReceipt { message: None }))));
        assert!(after.has_call(&ApiCall::RequestDetails(1)));
        assert!(d.ui.last_alert().unwrap().text.contains("check your phone"));
    }

    #[test]
    fn mpesa_falls_back_to_base_price() {
        let mut d = detail(customer(1), job(1, JobStatus::Completed));
        let cmd = d.update(Message::PayMpesa { phone_number: "254712345678".into() });
        assert!(cmd.has_call(&ApiCall::InitiatePayment { job: 1, phone_number: "254712345678".into(), amount: 1500.0 }));
    }

    #[test]
    fn cash_payment_only_when_completed() {
        let mut d = detail(customer(1), job(1, JobStatus::InProgress));
        assert!(d.update(Message::PayCash).is_empty());
        let mut d = detail(customer(1), job(1, JobStatus::Completed));
        assert!(d.update(Message::PayCash).has_call(&ApiCall::LogCash(1)));
    }

    #[test]
    fn chat_send_trims_ignores_empty_and_restores_on_failure() {
        let mut d = detail(customer(1), job(1, JobStatus::Accepted));
        d.update(Message::DraftChanged("   ".into()));
        assert!(d.update(Message::SendChat).is_empty());

        d.update(Message::DraftChanged("  on my way? ".into()));
        let cmd = d.update(Message::SendChat);
        assert!(cmd.has_call(&ApiCall::SendChat { job: 1, text: "on my way?".into() }));
        assert_eq!(d.draft(), "");

        d.update(Message::Api(ApiReply::ChatSent {
            job: 1,
            text: "on my way?".into(),
            result: Err(ClientError::Transient("Failed to send message.".into())),
        }));
        assert_eq!(d.draft(), "on my way?");
    }

    #[test]
    fn pushed_messages_dedup_by_id() {
        let mut d = detail(customer(1), job(1, JobStatus::Accepted));
        let msg = chat(5, provider(2, true), "arriving");
        d.update(Message::Api(ApiReply::ChatSent { job: 1, text: "arriving".into(), result: Ok(msg.clone()) }));
        d.update(event(&d, RealtimeEvent::NewMessage(Box::new(msg.clone()))));
        assert_eq!(d.messages().len(), 1);

        // history arriving after a push keeps both, in creation order
        let early = chat(2, customer(1), "hello");
        d.update(Message::Api(ApiReply::ChatMessages(1, Ok(vec![early]))));
        let ids: Vec<_> = d.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 5]);
    }

    #[test]
    fn location_keeps_only_latest_sample() {
        let mut d = detail(customer(1), job(1, JobStatus::InProgress));
        d.update(event(&d, RealtimeEvent::ProviderLocation(Coordinates { latitude: -1.0, longitude: 36.0 })));
        d.update(event(&d, RealtimeEvent::ProviderLocation(Coordinates { latitude: -1.5, longitude: 36.5 })));
        let sample = d.location().unwrap();
        assert_eq!((sample.latitude, sample.longitude), (-1.5, 36.5));
        assert_eq!(sample.provider_id, Some(2));
    }

    #[test]
    fn status_event_refetches_once() {
        let mut d = detail(customer(1), job(1, JobStatus::Accepted));
        d.update(Message::Api(ApiReply::ProviderReviews(2, Ok(ProviderReviews { average_rating: None, reviews: vec![] }))));
        let cmd = d.update(event(&d, RealtimeEvent::StatusUpdate(json!({"status": "IN_PROGRESS"}))));
        assert!(cmd.has_call(&ApiCall::RequestDetails(1)));
        assert!(d.update(event(&d, RealtimeEvent::StatusUpdate(json!({})))).is_empty());

        // the second notice is honoured once the first fetch lands
        let cmd = d.update(Message::Api(ApiReply::RequestDetails(1, Ok(job(1, JobStatus::InProgress)))));
        assert!(cmd.has_call(&ApiCall::RequestDetails(1)));
        let cmd = d.update(Message::Api(ApiReply::RequestDetails(1, Ok(job(1, JobStatus::Completed)))));
        assert!(!cmd.has_call(&ApiCall::RequestDetails(1)));
        assert_eq!(d.job().map(|j| j.status), Some(JobStatus::Completed));
    }

    #[test]
    fn refresh_does_not_stack_chat_fetches() {
        let mut d = JobDetail::new(1, customer(1));
        d.mount();
        let cmd = d.update(Message::Refresh);
        assert!(!cmd.has_call(&ApiCall::ChatMessages(1)));
        d.update(Message::Api(ApiReply::ChatMessages(1, Ok(vec![]))));
        assert!(d.ui.is_loading("chat_messages:1"), "the repeat is still out");
    }

    #[test]
    fn customer_can_cancel_until_work_starts() {
        let mut d = detail(customer(1), job(1, JobStatus::Accepted));
        assert!(d.update(Message::CancelJob).has_call(&ApiCall::UpdateStatus(1, JobStatus::Cancelled)));
        let mut d = detail(customer(1), job(1, JobStatus::InProgress));
        assert!(d.update(Message::CancelJob).is_empty());
    }

    #[test]
    fn assigned_provider_shares_validated_location() {
        let mut d = detail(provider(2, true), job(1, JobStatus::InProgress));
        assert!(d.update(Message::ShareLocation { latitude: 100.0, longitude: 0.0 }).is_empty());
        let cmd = d.update(Message::ShareLocation { latitude: -1.2345678, longitude: 36.1 });
        assert!(cmd.has_call(&ApiCall::UpdateLocation(1, Coordinates { latitude: -1.234568, longitude: 36.1 })));
        let mut outsider = detail(provider(9, true), job(1, JobStatus::InProgress));
        assert!(outsider.update(Message::ShareLocation { latitude: 0.0, longitude: 0.0 }).is_empty());
    }

    #[test]
    fn loaded_job_fetches_provider_reviews() {
        let mut d = JobDetail::new(1, customer(1));
        d.mount();
        let cmd = d.update(Message::Api(ApiReply::RequestDetails(1, Ok(job(1, JobStatus::Accepted)))));
        assert!(cmd.has_call(&ApiCall::ProviderReviews(2)));
    }
}
