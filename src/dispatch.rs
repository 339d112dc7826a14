//! Execution contexts: a serial background queue for camera setup and a
//! main context that redelivers completions to the thread owning the UI.

use crossbeam_channel::{Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs one at a time, in submission order, on a dedicated thread.
pub struct SerialQueue {
    label: String,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl SerialQueue {
    pub fn new(label: impl Into<String>) -> std::io::Result<Self> {
        let label = label.into();
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let worker_label = label.clone();
        let worker = std::thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                for job in receiver {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        log::error!("Job on queue '{}' panicked", worker_label);
                    }
                }
            })?;

        Ok(Self {
            label,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let sent = self
            .sender
            .as_ref()
            .map(|sender| sender.send(Box::new(job)).is_ok())
            .unwrap_or(false);
        if !sent {
            log::error!("Queue '{}' is shut down, job dropped", self.label);
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish queued jobs and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != std::thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.label)
            .finish()
    }
}

/// Queue of callbacks drained by the application's main (UI) thread.
///
/// Clones share the same queue. Whoever owns the UI loop calls
/// [`run_pending`](Self::run_pending) or [`run_next`](Self::run_next);
/// callbacks run on that thread.
#[derive(Clone)]
pub struct MainContext {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl MainContext {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.sender.send(Box::new(job));
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Run every queued callback. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one callback and run it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(_) => false,
        }
    }
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainContext")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn serial_queue_preserves_order_on_named_thread() {
        let queue = SerialQueue::new("prepare").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = seen.clone();
            queue.dispatch(move || {
                let name = std::thread::current().name().map(str::to_string);
                seen.lock().unwrap().push((i, name));
            });
        }
        drop(queue);

        let seen = seen.lock().unwrap();
        let order: Vec<i32> = seen.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
        assert!(seen.iter().all(|(_, name)| name.as_deref() == Some("prepare")));
    }

    #[test]
    fn serial_queue_survives_panicking_job() {
        let queue = SerialQueue::new("panics").unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        queue.dispatch(|| panic!("boom"));
        queue.dispatch(move || tx.send(42).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
    }

    #[test]
    fn main_context_runs_callbacks_on_draining_thread() {
        let main = MainContext::new();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let remote = main.clone();
        std::thread::spawn(move || {
            remote.dispatch(move || tx.send(std::thread::current().id()).unwrap());
        })
        .join()
        .unwrap();

        assert_eq!(main.pending(), 1);
        assert_eq!(main.run_pending(), 1);
        assert_eq!(rx.try_recv().unwrap(), std::thread::current().id());
        assert!(!main.run_next(Duration::from_millis(10)));
    }
}
