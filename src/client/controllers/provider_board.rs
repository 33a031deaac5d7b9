use log::{debug, info};
use std::time::Duration;

use crate::client::controllers::optimistic::{OptimisticOp, OptimisticRemovals};
use crate::client::controllers::record_list::RecordList;
use crate::client::controllers::{refetch, request, subscription_failed};
use crate::client::models::messages::{ApiReply, Message};
use crate::client::models::ui_state::{AlertLevel, UiState};
use crate::client::runtime::{ApiCall, Command, Effect};
use crate::client::services::realtime_message::{user_channel, RealtimeEvent};
use crate::common::error::ClientError;
use crate::common::models::{AvailableRequest, JobId, ServiceRequest, User};

pub const UNVERIFIED_MESSAGE: &str =
    "Your account is pending verification. You can go online once an administrator approves your profile.";

/// A provider's assigned jobs plus, while online, the feed of open jobs.
#[derive(Debug, Clone)]
pub struct ProviderBoard {
    user: User,
    my_jobs: RecordList<ServiceRequest>,
    available: RecordList<AvailableRequest>,
    removals: OptimisticRemovals<AvailableRequest>,
    online: bool,
    poll_every: Duration,
    pub ui: UiState,
}

impl ProviderBoard {
    pub fn new(user: User, poll_every: Duration) -> Self {
        Self {
            user,
            my_jobs: RecordList::new(),
            available: RecordList::new(),
            removals: OptimisticRemovals::default(),
            online: false,
            poll_every,
            ui: UiState::default(),
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn is_verified(&self) -> bool {
        self.user.is_verified_provider()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn channel(&self) -> String {
        user_channel(self.user.id)
    }

    pub fn my_jobs(&self) -> &RecordList<ServiceRequest> {
        &self.my_jobs
    }

    pub fn active_jobs(&self) -> Vec<&ServiceRequest> {
        self.my_jobs.active()
    }

    pub fn job_history(&self) -> Vec<&ServiceRequest> {
        self.my_jobs.history()
    }

    pub fn available(&self) -> &RecordList<AvailableRequest> {
        &self.available
    }

    pub fn is_pending(&self, job: JobId) -> bool {
        self.removals.is_pending(job)
    }

    pub fn mount(&mut self) -> Command {
        Command::batch([
            request(&mut self.ui, ApiCall::MyRequests),
            Command::single(Effect::Subscribe(self.channel())),
        ])
    }

    fn refetch_jobs(&mut self) -> Command {
        refetch(&mut self.ui, ApiCall::MyRequests)
    }

    fn refetch_feed(&mut self) -> Command {
        if !self.online {
            return Command::none();
        }
        refetch(&mut self.ui, ApiCall::AvailableRequests)
    }

    fn go_online(&mut self) -> Command {
        if !self.is_verified() {
            self.ui.push(AlertLevel::Error, UNVERIFIED_MESSAGE);
            return Command::none();
        }
        if self.online {
            return Command::none();
        }
        info!("Provider {} is online", self.user.id);
        self.online = true;
        Command::batch([self.refetch_feed(), Command::single(Effect::StartPolling(self.poll_every))])
    }

    fn go_offline(&mut self) -> Command {
        if !self.online {
            return Command::none();
        }
        info!("Provider {} is offline", self.user.id);
        self.online = false;
        self.available.clear();
        self.removals.clear();
        Command::single(Effect::StopPolling)
    }

    pub fn update(&mut self, message: Message) -> Command {
        match message {
            Message::Refresh => Command::batch([self.refetch_jobs(), self.refetch_feed()]),
            Message::SetOnline(true) => self.go_online(),
            Message::SetOnline(false) => self.go_offline(),
            Message::PollTick => self.refetch_feed(),
            Message::AcceptJob(id) => self.tentative(id, OptimisticOp::Accept),
            Message::DeclineJob(id) => self.tentative(id, OptimisticOp::Decline),
            Message::AdvanceJob(id) => self.advance(id),
            Message::Api(reply) => self.on_reply(reply),
            Message::Realtime { channel, event } if channel == self.channel() => self.on_event(event),
            Message::SubscriptionFailed { channel, error } => {
                subscription_failed(&channel, &error);
                Command::none()
            }
            _ => Command::none(),
        }
    }

    fn tentative(&mut self, id: JobId, op: OptimisticOp) -> Command {
        if !self.removals.apply(&mut self.available, id, op) {
            debug!("Job {} is not in the feed or already being handled", id);
            return Command::none();
        }
        let call = match op {
            OptimisticOp::Accept => ApiCall::Accept(id),
            OptimisticOp::Decline => ApiCall::Decline(id),
        };
        request(&mut self.ui, call)
    }

    fn advance(&mut self, id: JobId) -> Command {
        let step = match self.my_jobs.get(id) {
            Some(job) => job.status.next_provider_step(),
            None => {
                self.ui.push(AlertLevel::Error, format!("Job #{} is not one of your jobs.", id));
                return Command::none();
            }
        };
        match step {
            Some(step) => request(&mut self.ui, ApiCall::UpdateStatus(id, step.target())),
            None => {
                self.ui.info(format!("Job #{} has no further action.", id));
                Command::none()
            }
        }
    }

    fn on_reply(&mut self, reply: ApiReply) -> Command {
        let key = reply.key();
        self.ui.finish(&key);
        let repeat = self.ui.take_stale(&key);
        let command = self.apply_reply(reply);
        if !repeat {
            return command;
        }
        let again = if key == ApiCall::MyRequests.key() {
            self.refetch_jobs()
        } else if key == ApiCall::AvailableRequests.key() {
            self.refetch_feed()
        } else {
            Command::none()
        };
        Command::batch([command, again])
    }

    fn apply_reply(&mut self, reply: ApiReply) -> Command {
        match reply {
            ApiReply::MyRequests(Ok(jobs)) => {
                self.my_jobs.replace_all(jobs);
                Command::none()
            }
            ApiReply::AvailableRequests(Ok(feed)) => {
                // a late reply after going offline must not refill the list
                if self.online {
                    self.removals.apply_snapshot(&mut self.available, feed);
                }
                Command::none()
            }
            ApiReply::AvailableRequests(Err(ClientError::Validation { message, .. })) => {
                // the backend refuses the feed until a location is set
                self.ui.push(AlertLevel::Error, message);
                self.go_offline()
            }
            ApiReply::Accepted(id, Ok(job)) => {
                self.removals.confirm(id);
                self.my_jobs.upsert(job);
                self.ui.success("Job Accepted!");
                self.refetch_jobs()
            }
            ApiReply::Declined(id, Ok(())) => {
                self.removals.confirm(id);
                Command::none()
            }
            ApiReply::Accepted(id, Err(e)) | ApiReply::Declined(id, Err(e)) => {
                self.removals.reject(id);
                self.ui.error(&e);
                self.refetch_feed()
            }
            ApiReply::StatusUpdated(_, Ok(job)) => {
                self.ui.success(format!("Job status updated to {}.", job.status));
                self.my_jobs.upsert(job);
                Command::none()
            }
            ApiReply::StatusUpdated(_, Err(e)) => {
                self.ui.error(&e);
                self.refetch_jobs()
            }
            ApiReply::MyRequests(Err(e)) | ApiReply::AvailableRequests(Err(e)) => {
                self.ui.error(&e);
                Command::none()
            }
            _ => Command::none(),
        }
    }

    fn on_event(&mut self, event: RealtimeEvent) -> Command {
        match event {
            RealtimeEvent::RequestAccepted(job) => {
                if self.my_jobs.replace_by_id(*job) {
                    Command::none()
                } else {
                    self.refetch_jobs()
                }
            }
            RealtimeEvent::StatusUpdate(_) => self.refetch_jobs(),
            other => {
                debug!("Ignoring '{}' on job board", other.name());
                Command::none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::controllers::fixtures::{available, job, provider};
    use crate::common::models::JobStatus;

    fn board(verified: bool) -> ProviderBoard {
        let mut board = ProviderBoard::new(provider(2, verified), Duration::from_secs(20));
        board.mount();
        board
    }

    fn online_with_feed(ids: &[JobId]) -> ProviderBoard {
        let mut b = board(true);
        b.update(Message::SetOnline(true));
        b.update(Message::Api(ApiReply::AvailableRequests(Ok(ids.iter().map(|id| available(*id)).collect()))));
        b
    }

    #[test]
    fn unverified_cannot_go_online() {
        let mut b = board(false);
        let cmd = b.update(Message::SetOnline(true));
        assert!(cmd.is_empty());
        assert!(!b.is_online());
        assert_eq!(b.ui.last_alert().map(|a| a.text.as_str()), Some(UNVERIFIED_MESSAGE));
    }

    #[test]
    fn online_fetches_and_polls_offline_clears_and_stops() {
        let mut b = board(true);
        let cmd = b.update(Message::SetOnline(true));
        assert!(cmd.has_call(&ApiCall::AvailableRequests));
        assert!(cmd.effects().contains(&Effect::StartPolling(Duration::from_secs(20))));

        b.update(Message::Api(ApiReply::AvailableRequests(Ok(vec![available(1), available(2)]))));
        assert_eq!(b.available().len(), 2);

        let cmd = b.update(Message::SetOnline(false));
        assert_eq!(cmd.effects(), &[Effect::StopPolling]);
        assert!(b.available().is_empty());
        assert!(b.update(Message::PollTick).is_empty());
    }

    #[test]
    fn late_feed_after_offline_is_ignored() {
        let mut b = board(true);
        b.update(Message::SetOnline(true));
        b.update(Message::SetOnline(false));
        b.update(Message::Api(ApiReply::AvailableRequests(Ok(vec![available(3)]))));
        assert!(b.available().is_empty());
    }

    #[test]
    fn feed_validation_error_turns_provider_offline() {
        let mut b = board(true);
        b.update(Message::SetOnline(true));
        let cmd = b.update(Message::Api(ApiReply::AvailableRequests(Err(ClientError::validation(
            "Provider location is not set. Please update your location to find jobs.",
        )))));
        assert!(!b.is_online());
        assert_eq!(cmd.effects(), &[Effect::StopPolling]);
        assert!(b.ui.last_alert().unwrap().text.contains("location"));
    }

    #[test]
    fn transient_feed_error_keeps_list_and_state() {
        let mut b = online_with_feed(&[4]);
        b.update(Message::PollTick);
        b.update(Message::Api(ApiReply::AvailableRequests(Err(ClientError::Transient("Could not search for new jobs.".into())))));
        assert!(b.is_online());
        assert!(b.available().contains(4));
    }

    #[test]
    fn optimistic_accept_removes_then_confirms_and_refetches() {
        let mut b = online_with_feed(&[11, 12, 13]);
        b.update(Message::Api(ApiReply::MyRequests(Ok(vec![]))));
        let cmd = b.update(Message::AcceptJob(12));
        assert!(cmd.has_call(&ApiCall::Accept(12)));
        assert!(!b.available().contains(12));
        assert!(b.is_pending(12));

        let cmd = b.update(Message::Api(ApiReply::Accepted(12, Ok(job(12, JobStatus::Accepted)))));
        assert!(cmd.has_call(&ApiCall::MyRequests));
        assert!(!b.is_pending(12));
        assert!(b.my_jobs().contains(12));
    }

    #[test]
    fn accept_confirmed_during_jobs_fetch_fetches_again() {
        let mut b = online_with_feed(&[12]);
        b.update(Message::AcceptJob(12));
        // the mount's fetch predates the accept
        let cmd = b.update(Message::Api(ApiReply::Accepted(12, Ok(job(12, JobStatus::Accepted)))));
        assert!(!cmd.has_call(&ApiCall::MyRequests));
        let cmd = b.update(Message::Api(ApiReply::MyRequests(Ok(vec![]))));
        assert!(cmd.has_call(&ApiCall::MyRequests));
        let cmd = b.update(Message::Api(ApiReply::MyRequests(Ok(vec![job(12, JobStatus::Accepted)]))));
        assert!(cmd.is_empty());
        assert!(b.my_jobs().contains(12));
    }

    #[test]
    fn failed_accept_reconciles_without_duplicates() {
        let mut b = online_with_feed(&[12, 13]);
        b.update(Message::AcceptJob(12));
        let cmd = b.update(Message::Api(ApiReply::Accepted(
            12,
            Err(ClientError::Conflict("Failed to accept job. It may have been taken.".into())),
        )));
        assert!(cmd.has_call(&ApiCall::AvailableRequests));
        assert!(!b.available().contains(12), "no local rollback");

        b.update(Message::Api(ApiReply::AvailableRequests(Ok(vec![available(12), available(12), available(13)]))));
        assert_eq!(b.available().iter().filter(|r| r.id == 12).count(), 1);
    }

    #[test]
    fn double_accept_sends_one_call() {
        let mut b = online_with_feed(&[12]);
        assert!(!b.update(Message::AcceptJob(12)).is_empty());
        assert!(b.update(Message::AcceptJob(12)).is_empty());
    }

    #[test]
    fn decline_is_optimistic_too() {
        let mut b = online_with_feed(&[20]);
        let cmd = b.update(Message::DeclineJob(20));
        assert!(cmd.has_call(&ApiCall::Decline(20)));
        b.update(Message::Api(ApiReply::Declined(20, Ok(()))));
        assert!(b.available().is_empty());
        assert!(!b.is_pending(20));
    }

    #[test]
    fn advance_requests_exactly_the_next_step() {
        let mut b = board(true);
        b.update(Message::Api(ApiReply::MyRequests(Ok(vec![
            job(1, JobStatus::Accepted),
            job(2, JobStatus::InProgress),
            job(3, JobStatus::Completed),
        ]))));
        assert!(b.update(Message::AdvanceJob(1)).has_call(&ApiCall::UpdateStatus(1, JobStatus::InProgress)));
        assert!(b.update(Message::AdvanceJob(2)).has_call(&ApiCall::UpdateStatus(2, JobStatus::Completed)));
        assert!(b.update(Message::AdvanceJob(3)).is_empty());
        assert!(b.update(Message::AdvanceJob(99)).is_empty());
    }

    #[test]
    fn status_reply_replaces_job() {
        let mut b = board(true);
        b.update(Message::Api(ApiReply::MyRequests(Ok(vec![job(1, JobStatus::Accepted)]))));
        b.update(Message::Api(ApiReply::StatusUpdated(1, Ok(job(1, JobStatus::InProgress)))));
        assert_eq!(b.my_jobs().get(1).map(|j| j.status), Some(JobStatus::InProgress));
        assert_eq!(b.active_jobs().len(), 1);
    }
}
