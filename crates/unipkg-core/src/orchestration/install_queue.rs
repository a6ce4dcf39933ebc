use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::models::TaskId;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<TaskId>,
    running: Vec<TaskId>,
}

/// Install slot shared by every mutating operation.
///
/// Serial mode hands the single slot out in enqueue order. Parallel mode
/// lets every operation through as soon as it asks.
#[derive(Clone, Debug)]
pub struct InstallQueue {
    state: Arc<Mutex<QueueState>>,
    released: Arc<Notify>,
    parallel: Arc<AtomicBool>,
}

impl InstallQueue {
    pub fn new(allow_parallel: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            released: Arc::new(Notify::new()),
            parallel: Arc::new(AtomicBool::new(allow_parallel)),
        }
    }

    pub fn allows_parallel(&self) -> bool {
        self.parallel.load(Ordering::SeqCst)
    }

    pub fn set_allow_parallel(&self, allow_parallel: bool) {
        self.parallel.store(allow_parallel, Ordering::SeqCst);
        self.released.notify_waiters();
    }

    /// Appends `id` and returns the number of operations ahead of it.
    pub fn enqueue(&self, id: TaskId) -> usize {
        let mut state = self.lock();
        let ahead = state.pending.len() + state.running.len();
        state.pending.push_back(id);
        ahead
    }

    /// Drops a pending operation. Returns false when `id` was not waiting.
    pub fn remove(&self, id: TaskId) -> bool {
        let removed = {
            let mut state = self.lock();
            let before = state.pending.len();
            state.pending.retain(|pending| *pending != id);
            state.pending.len() != before
        };
        if removed {
            self.released.notify_waiters();
        }
        removed
    }

    pub fn pending(&self) -> Vec<TaskId> {
        self.lock().pending.iter().copied().collect()
    }

    pub fn running(&self) -> Vec<TaskId> {
        self.lock().running.clone()
    }

    /// Waits until `id` may run. The slot is released when the returned
    /// guard drops. Returns `None` if `id` was removed while waiting.
    pub async fn acquire(&self, id: TaskId) -> Option<InstallSlot> {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            {
                let mut state = self.lock();
                if !state.pending.contains(&id) {
                    return None;
                }
                let admitted = self.allows_parallel()
                    || (state.running.is_empty() && state.pending.front() == Some(&id));
                if admitted {
                    state.pending.retain(|pending| *pending != id);
                    state.running.push(id);
                    tracing::debug!(task_id = id.0, "install slot acquired");
                    return Some(InstallSlot {
                        id,
                        queue: self.clone(),
                    });
                }
            }

            released.await;
        }
    }

    fn release(&self, id: TaskId) {
        self.lock().running.retain(|running| *running != id);
        tracing::debug!(task_id = id.0, "install slot released");
        self.released.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug)]
pub struct InstallSlot {
    id: TaskId,
    queue: InstallQueue,
}

impl InstallSlot {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Drop for InstallSlot {
    fn drop(&mut self) {
        self.queue.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::InstallQueue;
    use crate::models::TaskId;

    #[tokio::test]
    async fn serial_queue_admits_head_only() {
        let queue = InstallQueue::new(false);
        assert_eq!(queue.enqueue(TaskId(1)), 0);
        assert_eq!(queue.enqueue(TaskId(2)), 1);

        let first = queue.acquire(TaskId(1)).await.expect("first slot");
        let blocked = timeout(Duration::from_millis(50), queue.acquire(TaskId(2))).await;
        assert!(blocked.is_err());
        assert_eq!(queue.running(), vec![TaskId(1)]);

        drop(first);
        let second = queue.acquire(TaskId(2)).await.expect("second slot");
        assert_eq!(second.id(), TaskId(2));
    }

    #[tokio::test]
    async fn parallel_queue_admits_everyone() {
        let queue = InstallQueue::new(true);
        queue.enqueue(TaskId(1));
        queue.enqueue(TaskId(2));

        let _first = queue.acquire(TaskId(2)).await.expect("slot");
        let _second = queue.acquire(TaskId(1)).await.expect("slot");
        assert_eq!(queue.running().len(), 2);
    }

    #[tokio::test]
    async fn removed_operation_never_acquires() {
        let queue = InstallQueue::new(false);
        queue.enqueue(TaskId(1));
        queue.enqueue(TaskId(2));
        let _first = queue.acquire(TaskId(1)).await.expect("slot");

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.acquire(TaskId(2)).await.is_some() })
        };
        tokio::task::yield_now().await;
        assert!(queue.remove(TaskId(2)));
        assert!(!waiter.await.expect("join"));
        assert!(queue.pending().is_empty());
    }
}
