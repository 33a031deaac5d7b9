use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;

use crate::client::controllers::record_list::{Keyed, RecordList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimisticOp {
    Accept,
    Decline,
}

#[derive(Debug, Clone)]
struct Tentative<T> {
    original: T,
    op: OptimisticOp,
    applied_at: DateTime<Utc>,
}

/// Records removed from a list before the server has confirmed the action.
///
/// The removed record is kept only for bookkeeping: a rejected action is
/// never rolled back locally, the caller refetches instead. While an action
/// is pending, snapshots are filtered so a stale copy does not reappear.
#[derive(Debug, Clone)]
pub struct OptimisticRemovals<T: Keyed> {
    pending: HashMap<T::Key, Tentative<T>>,
}

impl<T: Keyed> Default for OptimisticRemovals<T> {
    fn default() -> Self {
        Self { pending: HashMap::new() }
    }
}

impl<T: Keyed + Clone> OptimisticRemovals<T> {
    /// Removes `key` from `list`. Returns false when it is not there or an
    /// action on it is already in flight.
    pub fn apply(&mut self, list: &mut RecordList<T>, key: T::Key, op: OptimisticOp) -> bool {
        if self.pending.contains_key(&key) {
            return false;
        }
        match list.remove(key) {
            Some(original) => {
                debug!("Tentatively removed {:?} ({:?})", key, op);
                self.pending.insert(key, Tentative { original, op, applied_at: Utc::now() });
                true
            }
            None => false,
        }
    }

    pub fn confirm(&mut self, key: T::Key) -> Option<OptimisticOp> {
        self.pending.remove(&key).map(|t| t.op)
    }

    /// Forgets the tentative change. The caller reconciles by refetching.
    pub fn reject(&mut self, key: T::Key) -> Option<T> {
        self.pending.remove(&key).map(|t| {
            debug!("Action {:?} on {:?} rejected after {}ms", t.op, key, (Utc::now() - t.applied_at).num_milliseconds());
            t.original
        })
    }

    pub fn is_pending(&self, key: T::Key) -> bool {
        self.pending.contains_key(&key)
    }

    pub fn pending_op(&self, key: T::Key) -> Option<OptimisticOp> {
        self.pending.get(&key).map(|t| t.op)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Replaces `list` with `snapshot`, minus anything still pending.
    pub fn apply_snapshot(&self, list: &mut RecordList<T>, snapshot: Vec<T>) {
        list.replace_all(snapshot.into_iter().filter(|item| !self.pending.contains_key(&item.key())).collect());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::controllers::fixtures::available;

    #[test]
    fn accept_removes_immediately() {
        let mut list = RecordList::from_vec(vec![available(11), available(12), available(13)]);
        let mut removals = OptimisticRemovals::default();
        assert!(removals.apply(&mut list, 12, OptimisticOp::Accept));
        assert!(!list.contains(12));
        assert_eq!(list.len(), 2);
        assert!(!removals.apply(&mut list, 12, OptimisticOp::Decline));
    }

    #[test]
    fn failed_accept_then_refresh_holds_id_at_most_once() {
        let mut list = RecordList::from_vec(vec![available(12)]);
        let mut removals = OptimisticRemovals::default();
        removals.apply(&mut list, 12, OptimisticOp::Accept);

        // a poll lands while the call is still in flight
        removals.apply_snapshot(&mut list, vec![available(12), available(14)]);
        assert!(!list.contains(12));

        assert!(removals.reject(12).is_some());
        removals.apply_snapshot(&mut list, vec![available(12), available(12), available(14)]);
        assert_eq!(list.iter().filter(|r| r.id == 12).count(), 1);
    }

    #[test]
    fn confirm_reports_the_op() {
        let mut list = RecordList::from_vec(vec![available(5)]);
        let mut removals = OptimisticRemovals::default();
        removals.apply(&mut list, 5, OptimisticOp::Decline);
        assert_eq!(removals.pending_op(5), Some(OptimisticOp::Decline));
        assert_eq!(removals.confirm(5), Some(OptimisticOp::Decline));
        assert!(!removals.is_pending(5));
        assert_eq!(removals.confirm(5), None);
    }

    #[test]
    fn unknown_key_is_not_tracked() {
        let mut list: RecordList<_> = RecordList::from_vec(vec![available(1)]);
        let mut removals = OptimisticRemovals::default();
        assert!(!removals.apply(&mut list, 99, OptimisticOp::Accept));
        assert!(!removals.is_pending(99));
    }
}
