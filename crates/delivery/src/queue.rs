use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// FIFO of paths awaiting a single download each.
///
/// Entries are stored verbatim: the queue never validates, reorders or
/// deduplicates them. Every operation takes the one internal lock for the
/// shortest possible section and never performs I/O while holding it.
#[derive(Debug, Default)]
pub struct TransferQueue {
    entries: Mutex<VecDeque<PathBuf>>,
}

impl TransferQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PathBuf>> {
        // A panic elsewhere can't leave the deque half-mutated; keep serving.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends one entry and returns the new queue length.
    pub fn enqueue(&self, path: impl Into<PathBuf>) -> usize {
        let mut q = self.lock();
        q.push_back(path.into());
        q.len()
    }

    /// Appends several entries contiguously and returns the new length.
    pub fn enqueue_all<I>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut q = self.lock();
        q.extend(paths);
        q.len()
    }

    /// Returns a copy of the head entry without removing it.
    pub fn peek(&self) -> Option<PathBuf> {
        self.lock().front().cloned()
    }

    /// Removes and returns the head entry. Never blocks on an empty queue.
    pub fn pop(&self) -> Option<PathBuf> {
        self.lock().pop_front()
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies out all pending entries in delivery order.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pops_in_enqueue_order() {
        let queue = TransferQueue::new();
        for name in ["a", "b", "c", "b"] {
            queue.enqueue(name);
        }

        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(
            drained,
            ["a", "b", "c", "b"].map(PathBuf::from).to_vec()
        );
    }

    #[test]
    fn empty_pop_and_peek_return_none() {
        let queue = TransferQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.peek(), None);
    }

    #[test]
    fn peek_does_not_mutate() {
        let queue = TransferQueue::new();
        queue.enqueue("/srv/one.txt");
        queue.enqueue("/srv/two.txt");

        assert_eq!(queue.peek(), Some(PathBuf::from("/srv/one.txt")));
        assert_eq!(queue.peek(), Some(PathBuf::from("/srv/one.txt")));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn enqueue_reports_length() {
        let queue = TransferQueue::new();
        assert_eq!(queue.enqueue("x"), 1);
        assert_eq!(
            queue.enqueue_all(vec![PathBuf::from("y"), PathBuf::from("z")]),
            3
        );
        assert_eq!(
            queue.snapshot(),
            vec![PathBuf::from("x"), PathBuf::from("y"), PathBuf::from("z")]
        );
    }

    #[test]
    fn independent_instances() {
        let a = TransferQueue::new();
        let b = TransferQueue::new();
        a.enqueue("only-in-a");
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[test]
    fn concurrent_pops_never_share_an_entry() {
        let queue = Arc::new(TransferQueue::new());
        let total = 1000;
        queue.enqueue_all((0..total).map(|i| PathBuf::from(format!("file_{i}"))));

        let mut handles = vec![];
        for _ in 0..8 {
            let q = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                let mut got = Vec::new();
                while let Some(p) = q.pop() {
                    got.push(p);
                }
                got
            }));
        }

        let mut seen = HashSet::new();
        for h in handles {
            for p in h.join().unwrap() {
                assert!(seen.insert(p), "entry popped twice");
            }
        }
        assert_eq!(seen.len(), total);
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_batches_stay_contiguous() {
        let queue = Arc::new(TransferQueue::new());
        let mut handles = vec![];
        for t in 0..4 {
            let q = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                q.enqueue_all((0..50).map(|i| PathBuf::from(format!("{t}/{i}"))));
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let all = queue.snapshot();
        assert_eq!(all.len(), 200);
        for batch in all.chunks(50) {
            let prefix = batch[0].iter().next().unwrap().to_owned();
            for (i, p) in batch.iter().enumerate() {
                assert_eq!(p, &PathBuf::from(&prefix).join(i.to_string()));
            }
        }
    }
}
