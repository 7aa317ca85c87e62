use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::broker::{AmqpConnector, Connector};

/// Process wide state of the notifier: created when the service starts,
/// handed to every session, shut down when the service stops.
pub struct Registry {
    connector: Arc<dyn Connector>,
    timeout: Duration,
    stats: Stats,
    registered: AtomicBool,
}

impl Registry {
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration) -> Arc<Self> {
        tracing::debug!(?timeout, "notification registry created");
        Arc::new(Self {
            connector,
            timeout,
            stats: Stats::default(),
            registered: AtomicBool::new(true),
        })
    }

    pub fn amqp(timeout: Duration) -> Arc<Self> {
        Self::new(Arc::new(AmqpConnector::default()), timeout)
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Bound on every broker round-trip
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Commits happening after this call do not publish anything.
    pub fn shutdown(&self) {
        if self.registered.swap(false, Ordering::AcqRel) {
            let stats = self.stats.snapshot();
            tracing::info!(
                published = stats.published,
                publish_failures = stats.publish_failures,
                connect_failures = stats.connect_failures,
                unmatched_records = stats.unmatched_records,
                discarded_records = stats.discarded_records,
                open_buffers = stats.open_buffers,
                "notification registry shut down"
            );
        }
    }
}

#[derive(Default)]
pub struct Stats {
    open_buffers: AtomicUsize,
    published: AtomicU64,
    publish_failures: AtomicU64,
    connect_failures: AtomicU64,
    unmatched_records: AtomicU64,
    discarded_records: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Transaction buffers not released yet
    pub open_buffers: usize,
    pub published: u64,
    pub publish_failures: u64,
    pub connect_failures: u64,
    /// Copy records left without an assigned identifier at commit
    pub unmatched_records: u64,
    /// Correlated records never sent: broker unreachable or registry shut down
    pub discarded_records: u64,
}

impl Stats {
    pub(crate) fn buffer_opened(&self) {
        self.open_buffers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn buffer_released(&self) {
        self.open_buffers.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unmatched(&self, count: usize) {
        self.unmatched_records
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn discarded(&self, count: usize) {
        self.discarded_records
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            open_buffers: self.open_buffers.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            unmatched_records: self.unmatched_records.load(Ordering::Relaxed),
            discarded_records: self.discarded_records.load(Ordering::Relaxed),
        }
    }
}
