//! Progress reporting and cooperative operation control.
//!
//! This module decouples the engines from any UI technology: engines accept a
//! ProgressSink for updates and an OperationControl for cancel/pause queries.
//! Any event-loop marshaling belongs to the presentation layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A progress value: a bounded percentage, or indeterminate when the backend
/// reports activity without a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Percent(u8),
    Indeterminate,
}

impl Progress {
    pub fn percent(value: u64) -> Self {
        Progress::Percent(value.min(100) as u8)
    }
}

/// Trait for receiving progress updates from a running operation.
///
/// Methods are called synchronously from the worker thread; consumers must
/// marshal to their own thread if needed.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: Progress, message: &str);
}

/// A sink that discards all updates.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _progress: Progress, _message: &str) {}
}

struct ControlInner {
    cancelled: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
    child_pid: Mutex<Option<u32>>,
}

/// Shared cancel/pause state for one operation.
///
/// This is the only engine state mutated from outside the worker thread.
/// Cancellation is cooperative: loops check the flag at defined points. When
/// an external compressor process is attached, cancellation also requests its
/// termination so the monitor does not have to wait for the next poll.
#[derive(Clone)]
pub struct OperationControl {
    inner: Arc<ControlInner>,
}

/// How long a paused worker sleeps between wakeup checks.
const PAUSE_POLL: Duration = Duration::from_millis(100);

impl OperationControl {
    pub fn new() -> Self {
        OperationControl {
            inner: Arc::new(ControlInner {
                cancelled: AtomicBool::new(false),
                paused: Mutex::new(false),
                resumed: Condvar::new(),
                child_pid: Mutex::new(None),
            }),
        }
    }

    /// Request cancellation. Safe to call from any thread, repeatedly.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        // Wake a paused worker so it can observe the flag
        self.inner.resumed.notify_all();
        self.signal_child();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        let mut paused = self.inner.paused.lock().expect("pause lock poisoned");
        *paused = true;
    }

    pub fn resume(&self) {
        let mut paused = self.inner.paused.lock().expect("pause lock poisoned");
        *paused = false;
        self.inner.resumed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.paused.lock().expect("pause lock poisoned")
    }

    /// Block the calling worker while paused. Returns once resumed or
    /// cancelled; cancellation takes priority over pause.
    pub fn wait_while_paused(&self) {
        let mut paused = self.inner.paused.lock().expect("pause lock poisoned");
        while *paused && !self.is_cancelled() {
            let (guard, _timeout) = self
                .inner
                .resumed
                .wait_timeout(paused, PAUSE_POLL)
                .expect("pause lock poisoned");
            paused = guard;
        }
    }

    /// Attach the external compressor's process id so cancellation can
    /// escalate to OS-level termination.
    pub fn attach_child(&self, pid: u32) {
        let mut child = self.inner.child_pid.lock().expect("child lock poisoned");
        *child = Some(pid);
    }

    pub fn detach_child(&self) {
        let mut child = self.inner.child_pid.lock().expect("child lock poisoned");
        *child = None;
    }

    /// Ask an attached child process to terminate gracefully. The supervising
    /// monitor escalates to a forced kill if this is not honored in time.
    fn signal_child(&self) {
        let child = self.inner.child_pid.lock().expect("child lock poisoned");
        if let Some(pid) = *child {
            request_termination(pid);
        }
    }
}

impl Default for OperationControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn request_termination(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_termination(_pid: u32) {
    // No graceful signal available; the monitor loop force-kills after its
    // grace period.
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_cancel_is_sticky() {
        let control = OperationControl::new();
        assert!(!control.is_cancelled());
        control.cancel();
        assert!(control.is_cancelled());
        control.cancel();
        assert!(control.is_cancelled());
    }

    #[test]
    fn test_pause_blocks_until_resume() {
        let control = OperationControl::new();
        control.pause();

        let worker_control = control.clone();
        let handle = thread::spawn(move || {
            worker_control.wait_while_paused();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());
        control.resume();
        handle.join().expect("worker panicked");
    }

    #[test]
    fn test_cancel_unblocks_paused_worker() {
        let control = OperationControl::new();
        control.pause();

        let worker_control = control.clone();
        let handle = thread::spawn(move || {
            worker_control.wait_while_paused();
            worker_control.is_cancelled()
        });

        thread::sleep(Duration::from_millis(50));
        control.cancel();
        assert!(handle.join().expect("worker panicked"));
    }

    struct CountingSink {
        count: AtomicUsize,
    }

    impl ProgressSink for CountingSink {
        fn on_progress(&self, _progress: Progress, _message: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_sink_receives_updates() {
        let sink = CountingSink {
            count: AtomicUsize::new(0),
        };
        sink.on_progress(Progress::percent(50), "halfway");
        sink.on_progress(Progress::Indeterminate, "working");
        assert_eq!(sink.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_percent_clamped() {
        assert_eq!(Progress::percent(150), Progress::Percent(100));
        assert_eq!(Progress::percent(42), Progress::Percent(42));
    }
}
