//! Resolution options and cancellation

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::sync::watch;

use lode_core::types::{PackageIdentity, Version};
use lode_core::utils::normalize_name;

/// Default number of registry queries in flight at once
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Knobs for one resolution pass
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Project extras (optional dependency groups) to include
    pub extras: BTreeSet<String>,
    /// Upper bound on the whole pass
    pub timeout: Option<Duration>,
    pub cancellation: Option<CancelSignal>,
    /// Versions to try first when they still satisfy every constraint
    pub preferred: HashMap<PackageIdentity, Version>,
    /// Registry queries issued concurrently while prefetching
    pub concurrency: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            extras: BTreeSet::new(),
            timeout: None,
            cancellation: None,
            preferred: HashMap::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ResolveOptions {
    pub fn with_extras<I, S>(mut self, extras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extras
            .extend(extras.into_iter().map(|extra| normalize_name(extra.as_ref())));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, signal: CancelSignal) -> Self {
        self.cancellation = Some(signal);
        self
    }

    /// Prefer previously locked versions
    pub fn with_preferred(mut self, preferred: HashMap<PackageIdentity, Version>) -> Self {
        self.preferred = preferred;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Sending half of a cancellation pair
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

/// Receiving half of a cancellation pair; cheap to clone
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

/// Create a linked cancellation handle and signal
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, CancelSignal { receiver })
}

impl CancelHandle {
    /// Cancel every resolution holding the paired signal
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until cancelled; never completes if the handle is dropped first
    pub async fn cancelled(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
