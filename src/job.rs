//! Single-flight job lock
//!
//! Long batch jobs run one at a time. A second caller is rejected at once
//! instead of queueing behind the first.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct JobLock {
    busy: AtomicBool,
}

impl JobLock {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Acquire-or-reject. Never blocks.
    pub fn try_acquire(&self) -> Option<JobGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| JobGuard { lock: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of holding the lock; releases on drop.
#[derive(Debug)]
pub struct JobGuard<'a> {
    lock: &'a JobLock,
}

impl JobGuard<'_> {
    /// Release before the guard goes out of scope.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_second_acquire_is_rejected() {
        let lock = JobLock::new();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_busy());
        assert!(lock.try_acquire().is_none());
        guard.release();
        assert!(!lock.is_busy());
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_drop_releases() {
        let lock = JobLock::new();
        {
            let _guard = lock.try_acquire().unwrap();
        }
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_only_one_thread_wins() {
        let lock = Arc::new(JobLock::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    // Hold the lock past the thread's end so losers can't win later
                    lock.try_acquire().map(std::mem::forget).is_some()
                })
            })
            .collect();
        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();
        assert_eq!(winners, 1);
        assert!(lock.is_busy());
    }
}
