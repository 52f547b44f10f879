// ── Mutual exclusion ──────────────────────────────────────────────────────────
//
// `Mutex` is a plain OS mutex: locking it twice from the same thread without
// an intervening unlock deadlocks, and nothing detects that.  `RecursiveMutex`
// may be re-locked by its owner; it becomes available to other threads only
// after as many unlocks as locks.
//
// `LockGuard` is the scoped-acquisition helper and the intended way to use
// either kind: it locks on construction and unlocks on every exit path,
// including unwinding.  Guards release in reverse order of acquisition.
//
// `unlock` is `unsafe`: unlocking a mutex the caller does not hold is
// undefined behaviour on most OS implementations.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;

use crate::error::{Record, Result};
use crate::platform::{Locks, MutexKind, MutexSys};

type RawMutex = <Locks as MutexSys>::RawMutex;

// ── Lockable ──────────────────────────────────────────────────────────────────

/// Anything a [`LockGuard`] can hold.
pub trait Lockable {
    /// Block until acquired.
    fn lock(&self);

    /// Acquire without blocking; `true` on success.
    fn try_lock(&self) -> bool;

    /// Release one level of ownership.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock.
    unsafe fn unlock(&self);
}

// ── Mutex ─────────────────────────────────────────────────────────────────────

/// Non-recursive OS mutex.
pub struct Mutex {
    raw: RawMutex,
}

impl Mutex {
    pub fn new() -> Result<Self> {
        let raw = Locks::create(MutexKind::Normal).record()?;
        Ok(Self { raw })
    }

    /// Lock and return a guard that unlocks on drop.
    pub fn guard(&self) -> LockGuard<'_, Self> {
        LockGuard::new(self)
    }
}

impl Lockable for Mutex {
    fn lock(&self) {
        Locks::lock(&self.raw);
    }

    fn try_lock(&self) -> bool {
        Locks::try_lock(&self.raw)
    }

    unsafe fn unlock(&self) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { Locks::unlock(&self.raw) }
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mutex { .. }")
    }
}

// ── RecursiveMutex ────────────────────────────────────────────────────────────

/// OS mutex that its owning thread may lock repeatedly.
pub struct RecursiveMutex {
    raw: RawMutex,
}

impl RecursiveMutex {
    pub fn new() -> Result<Self> {
        let raw = Locks::create(MutexKind::Recursive).record()?;
        Ok(Self { raw })
    }

    /// Lock and return a guard that unlocks on drop.
    pub fn guard(&self) -> LockGuard<'_, Self> {
        LockGuard::new(self)
    }
}

impl Lockable for RecursiveMutex {
    fn lock(&self) {
        Locks::lock(&self.raw);
    }

    fn try_lock(&self) -> bool {
        Locks::try_lock(&self.raw)
    }

    unsafe fn unlock(&self) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { Locks::unlock(&self.raw) }
    }
}

impl fmt::Debug for RecursiveMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecursiveMutex { .. }")
    }
}

// ── LockGuard ─────────────────────────────────────────────────────────────────

/// Holds a lock for the lifetime of the guard.
///
/// Not `Send`: the lock must be released by the thread that acquired it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, L: Lockable + ?Sized> {
    lock: &'a L,
    _not_send: PhantomData<*const ()>,
}

impl<'a, L: Lockable + ?Sized> LockGuard<'a, L> {
    /// Block until `lock` is acquired.
    pub fn new(lock: &'a L) -> Self {
        lock.lock();
        Self { lock, _not_send: PhantomData }
    }

    /// Acquire `lock` only if it is free (or, for a recursive mutex, already
    /// owned by the caller).
    pub fn try_new(lock: &'a L) -> Option<Self> {
        lock.try_lock().then(|| Self { lock, _not_send: PhantomData })
    }
}

impl<L: Lockable + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        // SAFETY: a guard only exists while its lock is held by this thread.
        unsafe { self.lock.unlock() }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(all(test, not(oskit_backend = "fallback")))]
mod tests {
    use super::*;
    use crate::thread::{self, Thread};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{mpsc, Arc};

    /// Ask a second thread whether it can take `lock` right now.
    fn free_for_other_thread<L: Lockable + Send + Sync + 'static>(lock: &Arc<L>) -> bool {
        let lock = Arc::clone(lock);
        let (tx, rx) = mpsc::channel();
        let mut t = Thread::spawn(move || {
            let got = LockGuard::try_new(&*lock).is_some();
            tx.send(got).expect("send");
        })
        .expect("spawn");
        let got = rx.recv().expect("recv");
        assert!(t.join());
        got
    }

    fn protected_increments(threads: usize, per_thread: u64) -> u64 {
        let mutex = Arc::new(Mutex::new().expect("mutex"));
        let counter = Arc::new(AtomicU64::new(0));

        let mut workers: Vec<Thread> = (0..threads)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                let counter = Arc::clone(&counter);
                Thread::spawn(move || {
                    for _ in 0..per_thread {
                        let _guard = mutex.guard();
                        // Deliberately non-atomic read-modify-write; only the
                        // mutex keeps it correct.
                        let v = counter.load(Ordering::Relaxed);
                        thread::yield_now();
                        counter.store(v + 1, Ordering::Relaxed);
                    }
                })
                .expect("spawn")
            })
            .collect();

        for w in &mut workers {
            assert!(w.join());
        }
        counter.load(Ordering::SeqCst)
    }

    #[test]
    fn counter_is_exact_under_contention() {
        assert_eq!(protected_increments(5, 10), 50);
        assert_eq!(protected_increments(1, 1), 1);
        assert_eq!(protected_increments(4, 250), 1000);
    }

    #[test]
    fn held_mutex_blocks_other_threads() {
        let mutex = Arc::new(Mutex::new().expect("mutex"));

        mutex.lock();
        assert!(!free_for_other_thread(&mutex));
        // SAFETY: locked above on this thread.
        unsafe { mutex.unlock() };

        assert!(free_for_other_thread(&mutex));
    }

    #[test]
    fn guard_releases_on_scope_exit() {
        let mutex = Arc::new(Mutex::new().expect("mutex"));
        {
            let _g = mutex.guard();
            assert!(!free_for_other_thread(&mutex));
        }
        assert!(free_for_other_thread(&mutex));
    }

    #[test]
    fn guard_releases_on_unwind() {
        let mutex = Arc::new(Mutex::new().expect("mutex"));
        let inner = Arc::clone(&mutex);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _g = inner.guard();
            panic!("inside critical section");
        }));
        assert!(result.is_err());
        assert!(free_for_other_thread(&mutex));
    }

    #[test]
    fn recursive_mutex_needs_matching_unlocks() {
        let mutex = Arc::new(RecursiveMutex::new().expect("recursive mutex"));

        mutex.lock();
        mutex.lock();
        mutex.lock();
        assert!(mutex.try_lock(), "owner may re-acquire with try_lock");
        // SAFETY: this thread holds four levels; release the try_lock level.
        unsafe { mutex.unlock() };

        assert!(!free_for_other_thread(&mutex));
        // SAFETY: three levels are still held by this thread.
        unsafe { mutex.unlock() };
        assert!(!free_for_other_thread(&mutex));
        unsafe { mutex.unlock() };
        assert!(!free_for_other_thread(&mutex));
        unsafe { mutex.unlock() };

        assert!(free_for_other_thread(&mutex));
    }

    #[test]
    fn recursive_guards_nest() {
        let mutex = Arc::new(RecursiveMutex::new().expect("recursive mutex"));
        {
            let _a = mutex.guard();
            let _b = mutex.guard();
            let _c = LockGuard::try_new(&*mutex).expect("re-entrant try");
            assert!(!free_for_other_thread(&mutex));
        }
        assert!(free_for_other_thread(&mutex));
    }
}
