use std::collections::VecDeque;
use std::sync::Mutex;

/// Consistent view of the queue for status reporting
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    /// Path being processed right now, empty when the worker is idle
    pub current: String,
    /// Pending paths in submission order
    pub pending: Vec<String>,
}

#[derive(Default)]
struct QueueInner {
    current: Option<String>,
    pending: VecDeque<String>,
}

/// Ordered, duplicate-free queue of paths waiting for conversion, plus the
/// currently processed path. One mutex covers both so the duplicate check,
/// the dequeue-and-mark step and status snapshots are atomic against each
/// other.
pub struct JobQueue {
    inner: Mutex<QueueInner>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a path to the tail of the queue. Returns false when the path
    /// is already pending or currently being processed.
    pub fn enqueue(&self, path: &str) -> bool {
        let mut inner = self.lock();
        if inner.current.as_deref() == Some(path) || inner.pending.iter().any(|p| p == path) {
            return false;
        }
        inner.pending.push_back(path.to_string());
        true
    }

    /// Remove the head of the queue and mark it as the current job.
    pub fn dequeue(&self) -> Option<String> {
        let mut inner = self.lock();
        let path = inner.pending.pop_front()?;
        inner.current = Some(path.clone());
        Some(path)
    }

    /// Clear the current marker after a fully successful conversion. Failed
    /// or skipped jobs leave it set until the next dequeue overwrites it.
    pub fn finish_current(&self) {
        self.lock().current = None;
    }

    /// Drop every pending path. The current job is untouched.
    pub fn clear(&self) {
        self.lock().pending.clear();
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let inner = self.lock();
        QueueSnapshot {
            current: inner.current.clone().unwrap_or_default(),
            pending: inner.pending.iter().cloned().collect(),
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_rejects_duplicate_pending_path() {
        let queue = JobQueue::new();
        assert!(queue.enqueue("/media/film.mkv"));
        assert!(!queue.enqueue("/media/film.mkv"));
        assert_eq!(queue.snapshot().pending.len(), 1);
    }

    #[test]
    fn test_enqueue_rejects_path_equal_to_current() {
        let queue = JobQueue::new();
        assert!(queue.enqueue("/media/film.mkv"));
        assert_eq!(queue.dequeue().as_deref(), Some("/media/film.mkv"));

        // absent from the pending list, but still the active job
        assert!(queue.snapshot().pending.is_empty());
        assert!(!queue.enqueue("/media/film.mkv"));
    }

    #[test]
    fn test_fifo_order_is_submission_order() {
        let queue = JobQueue::new();
        queue.enqueue("/a");
        queue.enqueue("/b");
        queue.enqueue("/c");
        assert_eq!(queue.snapshot().pending, vec!["/a", "/b", "/c"]);
        assert_eq!(queue.dequeue().as_deref(), Some("/a"));
        assert_eq!(queue.dequeue().as_deref(), Some("/b"));
        assert_eq!(queue.snapshot().pending, vec!["/c"]);
    }

    #[test]
    fn test_clear_keeps_current() {
        let queue = JobQueue::new();
        queue.enqueue("/a");
        queue.enqueue("/b");
        queue.dequeue();
        queue.clear();

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.current, "/a");
        assert!(snapshot.pending.is_empty());
    }

    #[test]
    fn test_finish_current_resets_marker() {
        let queue = JobQueue::new();
        queue.enqueue("/a");
        queue.dequeue();
        queue.finish_current();
        assert_eq!(queue.snapshot().current, "");
        // finished paths may be submitted again
        assert!(queue.enqueue("/a"));
    }

    #[test]
    fn test_dequeue_empty_queue() {
        let queue = JobQueue::new();
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.snapshot().current, "");
    }
}
