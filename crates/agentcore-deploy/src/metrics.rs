//! Global atomic counters for deploy runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as one `tracing::info!` event,
//! typically at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    toolkit_messages: AtomicU64,
    filtered_messages: AtomicU64,
    stacks_discovered: AtomicU64,
    packages_built: AtomicU64,
    deploys_completed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            toolkit_messages: AtomicU64::new(0),
            filtered_messages: AtomicU64::new(0),
            stacks_discovered: AtomicU64::new(0),
            packages_built: AtomicU64::new(0),
            deploys_completed: AtomicU64::new(0),
        }
    }

    /// Every raw message the toolkit sent.
    pub fn inc_toolkit_messages(&self) {
        self.toolkit_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages that passed the allow-list and reached filtered subscribers.
    pub fn inc_filtered_messages(&self) {
        self.filtered_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_stacks_discovered(&self, n: u64) {
        self.stacks_discovered.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "stacks_discovered", n, "counter incremented");
    }

    pub fn inc_packages_built(&self) {
        self.packages_built.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "packages_built", "counter incremented");
    }

    pub fn inc_deploys_completed(&self) {
        self.deploys_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "deploys_completed", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            toolkit_messages = self.toolkit_messages(),
            filtered_messages = self.filtered_messages(),
            stacks_discovered = self.stacks_discovered(),
            packages_built = self.packages_built(),
            deploys_completed = self.deploys_completed(),
        );
    }

    pub fn toolkit_messages(&self) -> u64 {
        self.toolkit_messages.load(Ordering::Relaxed)
    }

    pub fn filtered_messages(&self) -> u64 {
        self.filtered_messages.load(Ordering::Relaxed)
    }

    pub fn stacks_discovered(&self) -> u64 {
        self.stacks_discovered.load(Ordering::Relaxed)
    }

    pub fn packages_built(&self) -> u64 {
        self.packages_built.load(Ordering::Relaxed)
    }

    pub fn deploys_completed(&self) -> u64 {
        self.deploys_completed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = Metrics::new();
        m.inc_toolkit_messages();
        m.inc_toolkit_messages();
        m.inc_filtered_messages();
        m.add_stacks_discovered(3);
        m.inc_packages_built();
        m.inc_deploys_completed();
        assert_eq!(m.toolkit_messages(), 2);
        assert_eq!(m.filtered_messages(), 1);
        assert_eq!(m.stacks_discovered(), 3);
        assert_eq!(m.packages_built(), 1);
        assert_eq!(m.deploys_completed(), 1);
        m.flush();
    }
}
