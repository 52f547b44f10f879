// ── Native threads ────────────────────────────────────────────────────────────
//
// `Thread` owns at most one started, unjoined native thread.  `join()` and
// `detach()` both give that ownership up.
//
// Misuse policy:
//   • Dropping a `Thread` that is still joinable is a logic bug.  The native
//     thread is detached (so it is not leaked), the event is logged, and the
//     drop panics.
//   • Joining a thread from itself would deadlock; it panics instead.

use std::fmt;

use crate::error::{self, ErrorCode, Record, Result};
use crate::platform::{ThreadSys, Threads};

// ── ThreadId ──────────────────────────────────────────────────────────────────

/// Native thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    /// Returned by [`Thread::get_id`] when no thread is held.
    pub const INVALID: ThreadId = ThreadId(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identifier of the calling thread.
pub fn current_id() -> ThreadId {
    ThreadId(Threads::current_id())
}

/// Offer the rest of the calling thread's time slice to the scheduler.
pub fn yield_now() {
    Threads::yield_now();
}

/// Number of hardware threads available; at least 1.
pub fn hardware_concurrency() -> usize {
    Threads::hardware_concurrency().max(1)
}

// ── Thread ────────────────────────────────────────────────────────────────────

type NativeThread = <Threads as ThreadSys>::Thread;

/// A native OS thread.
///
/// Move-only; not meant to be driven from two threads at once.
#[derive(Default)]
pub struct Thread {
    native: Option<NativeThread>,
}

impl Thread {
    /// An empty, non-joinable thread object.
    pub fn new() -> Self {
        Self { native: None }
    }

    /// Create a thread object and start `f` on it.
    pub fn spawn<F>(f: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut thread = Self::new();
        thread.start(f)?;
        Ok(thread)
    }

    /// Start `f` on a new native thread.
    ///
    /// Fails with `UNSUPPORTED_OPERATION` if this object already holds a
    /// joinable thread.  Arguments are passed by capturing them in `f`.
    pub fn start<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_joinable() {
            return Err(error::raise(
                ErrorCode::UnsupportedOperation,
                "thread object already holds a joinable thread",
            ));
        }
        let native = Threads::spawn(Box::new(f)).record()?;
        log::debug!("thread {} started", ThreadId(Threads::id(&native)));
        self.native = Some(native);
        Ok(())
    }

    /// `true` while a live, unjoined thread is held.
    pub fn is_valid(&self) -> bool {
        self.native.is_some()
    }

    pub fn is_joinable(&self) -> bool {
        self.native.is_some()
    }

    /// The native identifier, or [`ThreadId::INVALID`].
    pub fn get_id(&self) -> ThreadId {
        self.native.as_ref().map_or(ThreadId::INVALID, |t| ThreadId(Threads::id(t)))
    }

    /// Block until the thread function returns.
    ///
    /// Returns `false` without touching the error context if nothing is held.
    /// Returns `false` and records the error if the OS join fails.
    ///
    /// # Panics
    ///
    /// If called from the thread being joined.
    pub fn join(&mut self) -> bool {
        let Some(native) = self.native.take() else {
            return false;
        };
        let id = ThreadId(Threads::id(&native));
        if id == current_id() {
            Threads::detach(native);
            log::error!("thread {id} attempted to join itself");
            panic!("thread {id} attempted to join itself");
        }
        match Threads::join(native).record() {
            Ok(()) => {
                log::debug!("thread {id} joined");
                true
            }
            Err(e) => {
                log::warn!("joining thread {id} failed: {e}");
                false
            }
        }
    }

    /// Let the thread run to completion unobserved.
    ///
    /// Returns `false` if nothing is held.
    pub fn detach(&mut self) -> bool {
        match self.native.take() {
            Some(native) => {
                log::debug!("thread {} detached", ThreadId(Threads::id(&native)));
                Threads::detach(native);
                true
            }
            None => false,
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if let Some(native) = self.native.take() {
            let id = ThreadId(Threads::id(&native));
            Threads::detach(native);
            log::error!("thread {id} dropped while still joinable");
            // A second panic while unwinding aborts the process.
            panic!("thread {id} dropped while still joinable; join() or detach() it first");
        }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread").field("id", &self.get_id()).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(all(test, not(oskit_backend = "fallback")))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};

    #[test]
    fn start_and_join() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let mut t = Thread::new();
        assert!(!t.is_joinable());
        t.start(move || flag.store(true, Ordering::SeqCst)).expect("start");
        assert!(t.is_joinable());
        assert!(t.get_id().is_valid());

        assert!(t.join());
        assert!(ran.load(Ordering::SeqCst));
        assert!(!t.is_joinable());
        assert_eq!(t.get_id(), ThreadId::INVALID);
    }

    #[test]
    fn join_without_thread_is_false_and_silent() {
        error::clear();
        let mut t = Thread::new();
        assert!(!t.join());
        assert!(!t.detach());
        assert!(error::get().is_none());
    }

    #[test]
    fn start_twice_is_unsupported() {
        let (tx, rx) = mpsc::channel::<()>();
        let mut t = Thread::spawn(move || {
            let _ = rx.recv();
        })
        .expect("spawn");

        let err = t.start(|| {}).expect_err("already joinable");
        assert_eq!(err.code, ErrorCode::UnsupportedOperation);
        assert_eq!(error::last_code(), ErrorCode::UnsupportedOperation);

        tx.send(()).expect("release worker");
        assert!(t.join());

        // Once joined the object can be reused.
        t.start(|| {}).expect("restart");
        assert!(t.join());
        error::clear();
    }

    #[test]
    fn thread_sees_its_own_id() {
        let (tx, rx) = mpsc::channel();
        let mut t = Thread::spawn(move || tx.send(current_id()).expect("send")).expect("spawn");
        let expected = t.get_id();
        let seen = rx.recv().expect("recv");
        assert!(t.join());
        assert_eq!(seen, expected);
        assert_ne!(seen, current_id());
    }

    #[test]
    fn detach_lets_thread_finish() {
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let (tx, rx) = mpsc::channel();

        let mut t = Thread::spawn(move || {
            flag.store(true, Ordering::SeqCst);
            tx.send(()).expect("send");
        })
        .expect("spawn");
        assert!(t.detach());
        assert!(!t.is_joinable());

        rx.recv().expect("detached thread ran");
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn many_threads_run_concurrently() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut threads: Vec<Thread> = (0..8)
            .map(|_| {
                let c = Arc::clone(&counter);
                Thread::spawn(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .expect("spawn")
            })
            .collect();
        for t in &mut threads {
            assert!(t.join());
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn panic_in_thread_body_is_contained() {
        let mut t = Thread::spawn(|| panic!("worker exploded")).expect("spawn");
        assert!(t.join());
    }

    #[test]
    fn self_join_panics_instead_of_deadlocking() {
        let slot: Arc<std::sync::Mutex<Option<Thread>>> = Arc::default();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let (res_tx, res_rx) = mpsc::channel();

        let inner = Arc::clone(&slot);
        let t = Thread::spawn(move || {
            go_rx.recv().expect("go");
            let mut guard = inner.lock().expect("slot");
            let me = guard.as_mut().expect("thread stored");
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| me.join()));
            res_tx.send(outcome.is_err()).expect("send");
        })
        .expect("spawn");

        *slot.lock().expect("slot") = Some(t);
        go_tx.send(()).expect("go");
        assert!(res_rx.recv().expect("result"), "self-join must panic");

        let t = slot.lock().expect("slot").take().expect("thread");
        assert!(!t.is_joinable(), "self-join detaches the native thread");
    }

    #[test]
    #[should_panic(expected = "still joinable")]
    fn dropping_joinable_thread_panics() {
        let t = Thread::spawn(|| {}).expect("spawn");
        drop(t);
    }

    #[test]
    fn hardware_concurrency_is_positive() {
        assert!(hardware_concurrency() >= 1);
    }
}
