use std::fmt::Debug;
use std::hash::Hash;

use crate::common::models::{AvailableRequest, ChatMessage, JobId, Service, ServiceCategory, ServiceId, ServiceRequest};

/// Records that carry their own identity.
pub trait Keyed {
    type Key: Copy + Eq + Hash + Debug;

    fn key(&self) -> Self::Key;
}

impl Keyed for ServiceRequest {
    type Key = JobId;
    fn key(&self) -> JobId {
        self.id
    }
}

impl Keyed for AvailableRequest {
    type Key = JobId;
    fn key(&self) -> JobId {
        self.id
    }
}

impl Keyed for ChatMessage {
    type Key = i64;
    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for Service {
    type Key = ServiceId;
    fn key(&self) -> ServiceId {
        self.id
    }
}

impl Keyed for ServiceCategory {
    type Key = i64;
    fn key(&self) -> i64 {
        self.id
    }
}

/// The one list a controller treats as truth. Keeps insertion order and never
/// holds two records with the same key.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordList<T: Keyed> {
    items: Vec<T>,
}

impl<T: Keyed> Default for RecordList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Keyed> RecordList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        let mut list = Self::new();
        list.replace_all(items);
        list
    }

    /// Swaps in a fresh snapshot. A key repeated in `items` keeps its first
    /// position and its last value.
    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items.clear();
        for item in items {
            self.upsert(item);
        }
    }

    /// Overwrites the record with the same key in place. Returns false (and
    /// changes nothing) when the key is unknown.
    pub fn replace_by_id(&mut self, item: T) -> bool {
        match self.position(item.key()) {
            Some(index) => {
                self.items[index] = item;
                true
            }
            None => false,
        }
    }

    /// Replaces in place or appends. Returns true when the record was new.
    pub fn upsert(&mut self, item: T) -> bool {
        match self.position(item.key()) {
            Some(index) => {
                self.items[index] = item;
                false
            }
            None => {
                self.items.push(item);
                true
            }
        }
    }

    /// Appends only if the key is not present yet.
    pub fn append_unique(&mut self, item: T) -> bool {
        if self.contains(item.key()) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn remove(&mut self, key: T::Key) -> Option<T> {
        self.position(key).map(|index| self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn get(&self, key: T::Key) -> Option<&T> {
        self.items.iter().find(|item| item.key() == key)
    }

    pub fn contains(&self, key: T::Key) -> bool {
        self.position(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn filtered<P: Fn(&T) -> bool>(&self, predicate: P) -> Vec<&T> {
        self.items.iter().filter(|item| predicate(item)).collect()
    }

    pub fn sort_by_key<K: Ord, F: FnMut(&T) -> K>(&mut self, f: F) {
        self.items.sort_by_key(f);
    }

    fn position(&self, key: T::Key) -> Option<usize> {
        self.items.iter().position(|item| item.key() == key)
    }
}

/// Active and history views. Both are computed from the list on every call.
impl RecordList<ServiceRequest> {
    pub fn active(&self) -> Vec<&ServiceRequest> {
        self.filtered(|job| job.status.is_active())
    }

    pub fn history(&self) -> Vec<&ServiceRequest> {
        self.filtered(|job| job.status.is_history())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::controllers::fixtures::job;
    use crate::common::models::JobStatus;

    fn statuses(list: &[&ServiceRequest]) -> Vec<JobId> {
        list.iter().map(|j| j.id).collect()
    }

    #[test]
    fn replace_all_dedups_keeping_first_position() {
        let list = RecordList::from_vec(vec![
            job(1, JobStatus::Pending),
            job(2, JobStatus::Pending),
            job(1, JobStatus::Accepted),
        ]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.as_slice()[0].id, 1);
        assert_eq!(list.get(1).map(|j| j.status), Some(JobStatus::Accepted));
    }

    #[test]
    fn replace_event_touches_only_its_record() {
        let mut list = RecordList::from_vec(vec![
            job(5, JobStatus::Pending),
            job(7, JobStatus::Pending),
            job(9, JobStatus::InProgress),
        ]);
        let before = list.clone();
        assert!(list.replace_by_id(job(7, JobStatus::Accepted)));
        assert_eq!(list.get(7).map(|j| j.status), Some(JobStatus::Accepted));
        assert_eq!(list.get(5), before.get(5));
        assert_eq!(list.get(9), before.get(9));
        assert_eq!(statuses(&list.iter().collect::<Vec<_>>()), vec![5, 7, 9]);
    }

    #[test]
    fn replace_unknown_id_is_rejected() {
        let mut list = RecordList::from_vec(vec![job(1, JobStatus::Pending)]);
        assert!(!list.replace_by_id(job(2, JobStatus::Accepted)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn active_and_history_partition_the_list() {
        let all = [
            JobStatus::Pending,
            JobStatus::Accepted,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Cancelled,
            JobStatus::Declined,
        ];
        let list = RecordList::from_vec(all.iter().enumerate().map(|(i, s)| job(i as JobId, *s)).collect());
        let active = statuses(&list.active());
        let history = statuses(&list.history());
        assert_eq!(active, vec![0, 1, 2]);
        assert_eq!(history, vec![3, 4, 5]);
        assert_eq!(active.len() + history.len(), list.len());
        assert!(active.iter().all(|id| !history.contains(id)));
    }

    #[test]
    fn append_unique_ignores_repeats() {
        let mut list = RecordList::new();
        assert!(list.append_unique(job(3, JobStatus::Pending)));
        assert!(!list.append_unique(job(3, JobStatus::Completed)));
        assert_eq!(list.get(3).map(|j| j.status), Some(JobStatus::Pending));
        assert_eq!(list.remove(3).map(|j| j.id), Some(3));
        assert!(list.is_empty());
    }
}
