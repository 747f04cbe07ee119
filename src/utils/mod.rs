//! Utility functions for batch engine consumers

pub mod logging;

/// Testing utilities
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Tracks how many processor calls are active at once
    #[derive(Debug, Clone, Default)]
    pub struct ConcurrencyProbe {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    impl ConcurrencyProbe {
        /// Create a probe with all counters at zero
        pub fn new() -> Self {
            Self::default()
        }

        /// Mark one call as active until the returned guard is dropped
        pub fn enter(&self) -> ProbeGuard {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            ProbeGuard {
                active: Arc::clone(&self.active),
            }
        }

        /// Highest number of simultaneously active calls observed
        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        /// Calls active right now
        pub fn active(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }

        /// Total calls ever entered
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    /// Decrements the active count of a [`ConcurrencyProbe`] on drop
    #[derive(Debug)]
    pub struct ProbeGuard {
        active: Arc<AtomicUsize>,
    }

    impl Drop for ProbeGuard {
        fn drop(&mut self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

}
