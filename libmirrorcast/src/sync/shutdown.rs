//! Cooperative shutdown flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

/// Shared stop flag, set from a signal handler and polled by the engine
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a flag owned by someone else (e.g. a signal thread)
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Sleep for `duration`, waking early once shutdown is requested
    ///
    /// Returns `false` if the sleep was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let slice = Duration::from_secs(1);
        let mut remaining = duration;

        while !remaining.is_zero() {
            if self.is_triggered() {
                return false;
            }
            let step = remaining.min(slice);
            sleep(step).await;
            remaining -= step;
        }

        !self.is_triggered()
    }
}
