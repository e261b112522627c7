use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Last canonical list read from the backend, stamped with the sequence of
/// the read cycle that produced it.
///
/// A cycle calls [`begin_cycle`](Self::begin_cycle) before it fetches and
/// [`publish`](Self::publish) after. A cycle that started earlier than the
/// one already published is dropped, so a slow read never overwrites a
/// fresher one.
pub struct SnapshotCell<T> {
    next_seq: AtomicU64,
    current: RwLock<Snapshot<T>>,
}

#[derive(Debug)]
pub struct Snapshot<T> {
    pub seq: u64,
    pub data: Arc<T>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            seq: self.seq,
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> SnapshotCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            next_seq: AtomicU64::new(1),
            current: RwLock::new(Snapshot {
                seq: 0,
                data: Arc::new(initial),
            }),
        }
    }

    pub fn begin_cycle(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Install `data` if `seq` is newer than what is published. Returns
    /// whether it was installed.
    pub fn publish(&self, seq: u64, data: T) -> bool {
        let mut current = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if seq <= current.seq {
            metrics::counter!(crate::observability::STALE_SNAPSHOTS_TOTAL).increment(1);
            return false;
        }
        *current = Snapshot {
            seq,
            data: Arc::new(data),
        };
        true
    }

    pub fn latest(&self) -> Snapshot<T> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.latest().seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_cycle_wins() {
        let cell: SnapshotCell<Vec<u32>> = SnapshotCell::default();
        let slow = cell.begin_cycle();
        let fast = cell.begin_cycle();
        assert!(fast > slow);

        assert!(cell.publish(fast, vec![2]));
        assert!(!cell.publish(slow, vec![1]));
        let latest = cell.latest();
        assert_eq!(latest.seq, fast);
        assert_eq!(*latest.data, vec![2]);
    }

    #[test]
    fn in_order_cycles_all_publish() {
        let cell = SnapshotCell::new(0u32);
        for n in 1..=3 {
            let seq = cell.begin_cycle();
            assert!(cell.publish(seq, n));
        }
        assert_eq!(*cell.latest().data, 3);
        assert_eq!(cell.seq(), 3);
    }

    #[test]
    fn same_sequence_is_not_republished() {
        let cell = SnapshotCell::new(String::new());
        let seq = cell.begin_cycle();
        assert!(cell.publish(seq, "first".into()));
        assert!(!cell.publish(seq, "second".into()));
        assert_eq!(cell.latest().data.as_str(), "first");
    }
}
