//! Per-server work queue
//!
//! Workers block in [`TaskQueue::pop`]; the orchestrator blocks in
//! [`TaskQueue::join`] until every task it enqueued has been acknowledged
//! with [`TaskQueue::task_done`]. A retried task is put back with
//! [`TaskQueue::requeue`] and stays unfinished until it reaches a terminal
//! outcome.

use super::task::DownloadTask;
use crate::shutdown::ShutdownCoordinator;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<DownloadTask>,
    unfinished: usize,
    closed: bool,
}

/// Thread-safe FIFO with blocking pop and wait-for-drain
#[derive(Debug, Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
    available: Notify,
    drained: Notify,
}

impl TaskQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a new task. Returns `false` if the queue is closed.
    pub fn put(&self, task: DownloadTask) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.tasks.push_back(task);
            state.unfinished += 1;
        }
        self.available.notify_one();
        true
    }

    /// Put a retried task back at the tail without counting it twice.
    ///
    /// If the queue is closed the task is dropped and counted as finished.
    pub fn requeue(&self, task: DownloadTask) -> bool {
        let mut state = self.lock();
        if state.closed {
            drop(state);
            self.task_done();
            return false;
        }
        state.tasks.push_back(task);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Wait for the next task.
    ///
    /// Returns `None` once shutdown is requested or the queue is closed;
    /// tasks still queued at that point are left for [`Self::abandon_pending`].
    pub async fn pop(&self, shutdown: &ShutdownCoordinator) -> Option<DownloadTask> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed || shutdown.is_shutdown_requested() {
                    return None;
                }
                if let Some(task) = state.tasks.pop_front() {
                    return Some(task);
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = shutdown.wait_for_shutdown() => return None,
            }
        }
    }

    /// Acknowledge a task that reached a terminal outcome
    pub fn task_done(&self) {
        let mut state = self.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
        let drained = state.unfinished == 0;
        drop(state);
        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Wait until every enqueued task has been acknowledged
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.lock().unfinished == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Remove tasks that no worker has picked up yet
    pub fn abandon_pending(&self) -> Vec<DownloadTask> {
        let mut state = self.lock();
        let abandoned: Vec<_> = state.tasks.drain(..).collect();
        state.unfinished = state.unfinished.saturating_sub(abandoned.len());
        let drained = state.unfinished == 0;
        drop(state);
        if drained {
            self.drained.notify_waiters();
        }
        abandoned
    }

    /// Stop accepting tasks and wake blocked workers
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    /// Tasks waiting for a worker
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Whether no task is waiting for a worker
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks enqueued but not yet acknowledged
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }
}
