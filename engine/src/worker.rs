//! Worker tracking for long-running operations.
//!
//! Each operation (copy-verify, archive) runs on its own thread so the
//! caller never blocks; the coordinator keeps a handle per live worker so
//! everything can be cancelled on teardown and leaks are visible.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::Receiver;
use log::{debug, warn};
use uuid::Uuid;

use crate::progress::OperationControl;

/// Lifecycle flags for a spawned worker.
#[derive(Debug, Clone, Copy)]
pub struct SpawnOptions {
    /// Cancel this worker automatically when the coordinator is torn down
    pub cancel_on_cleanup: bool,
    /// Remove the worker from tracking once it reaches a terminal state
    pub auto_release: bool,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        SpawnOptions {
            cancel_on_cleanup: true,
            auto_release: true,
        }
    }
}

/// Identifies one running operation.
pub struct WorkerHandle {
    id: Uuid,
    name: String,
    control: OperationControl,
    finished: Arc<AtomicBool>,
    options: SpawnOptions,
}

impl WorkerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn control(&self) -> OperationControl {
        self.control.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }
}

/// Tracks active workers and guarantees cleanup on teardown.
pub struct WorkerCoordinator {
    workers: Mutex<Vec<WorkerHandle>>,
}

impl WorkerCoordinator {
    pub fn new() -> Self {
        WorkerCoordinator {
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Run `task` on its own thread and track it.
    ///
    /// The worker's output arrives on the returned channel once the task
    /// finishes; the caller is free to poll or block on it. The task should
    /// observe `control` at its defined suspension points.
    pub fn spawn<T, F>(
        &self,
        name: &str,
        control: OperationControl,
        options: SpawnOptions,
        task: F,
    ) -> (Uuid, Receiver<T>)
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let finished = Arc::new(AtomicBool::new(false));
        let (tx, rx) = crossbeam_channel::bounded(1);

        let done = finished.clone();
        thread::spawn(move || {
            let output = task();
            done.store(true, Ordering::SeqCst);
            let _ = tx.send(output);
        });

        let handle = WorkerHandle {
            id: Uuid::new_v4(),
            name: name.to_string(),
            control,
            finished,
            options,
        };
        let id = handle.id;
        debug!("Tracking worker {} ({})", name, id);
        self.workers
            .lock()
            .expect("worker list poisoned")
            .push(handle);
        (id, rx)
    }

    /// Cancel one worker by id. Returns false if it is not tracked.
    pub fn cancel(&self, id: Uuid) -> bool {
        let workers = self.workers.lock().expect("worker list poisoned");
        match workers.iter().find(|w| w.id == id) {
            Some(worker) => {
                worker.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every tracked worker.
    pub fn cancel_all(&self) {
        let workers = self.workers.lock().expect("worker list poisoned");
        for worker in workers.iter() {
            worker.cancel();
        }
    }

    /// Drop a worker from tracking. Returns false if it is not tracked.
    pub fn release(&self, id: Uuid) -> bool {
        let mut workers = self.workers.lock().expect("worker list poisoned");
        let before = workers.len();
        workers.retain(|w| w.id != id);
        workers.len() != before
    }

    /// Number of live workers, for leak detection. Finished auto-release
    /// workers are reaped first.
    pub fn active_count(&self) -> usize {
        let mut workers = self.workers.lock().expect("worker list poisoned");
        workers.retain(|w| !(w.options.auto_release && w.is_finished()));
        workers.len()
    }
}

impl Default for WorkerCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerCoordinator {
    fn drop(&mut self) {
        // Cleanup must never panic or propagate errors
        let Ok(mut workers) = self.workers.lock() else {
            return;
        };
        workers.retain(|w| !(w.options.auto_release && w.is_finished()));
        if !workers.is_empty() {
            warn!(
                "WorkerCoordinator destroyed with {} active worker(s)",
                workers.len()
            );
        }
        for worker in workers.iter() {
            if worker.options.cancel_on_cleanup && !worker.is_finished() {
                debug!("Cancelling worker {} on cleanup", worker.name);
                worker.cancel();
            }
        }
    }
}
