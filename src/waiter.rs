//! Polling wait for target elements.
//!
//! The document is queried immediately and then once per frame tick until
//! every requested selector has resolved or the timeout elapses. A host with
//! a mutation-observation primitive can replace the polling loop, as long as
//! the resolve/timeout contract below is kept.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::document::{Document, ElementHandle};
use crate::error::TourError;

/// Default wait timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default polling interval, one display refresh at 60Hz
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Outcome of a lenient wait: one entry per requested selector, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    selectors: Vec<String>,
    handles: Vec<Option<ElementHandle>>,
}

impl Resolution {
    pub fn handles(&self) -> &[Option<ElementHandle>] {
        &self.handles
    }

    /// True when every selector resolved
    pub fn is_complete(&self) -> bool {
        self.handles.iter().all(Option::is_some)
    }

    /// Selectors that never resolved
    pub fn missing(&self) -> Vec<String> {
        self.selectors
            .iter()
            .zip(&self.handles)
            .filter(|(_, h)| h.is_none())
            .map(|(s, _)| s.clone())
            .collect()
    }

    /// All handles, or `None` if any selector is unresolved
    pub fn into_complete(self) -> Option<Vec<ElementHandle>> {
        self.handles.into_iter().collect()
    }
}

/// Polls a [`Document`] for selectors
#[derive(Clone)]
pub struct ElementWaiter {
    document: Arc<dyn Document>,
    timeout: Duration,
    frame_interval: Duration,
}

impl ElementWaiter {
    pub fn new(document: Arc<dyn Document>) -> Self {
        Self {
            document,
            timeout: DEFAULT_TIMEOUT,
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        // tokio intervals panic on a zero period
        self.frame_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Wait until all selectors resolve; on timeout return the partial result
    pub async fn wait_lenient(&self, selectors: &[String], timeout: Option<Duration>) -> Resolution {
        let timeout = timeout.unwrap_or(self.timeout);
        let started = Instant::now();
        let mut handles: Vec<Option<ElementHandle>> = vec![None; selectors.len()];

        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // First tick completes immediately
            ticker.tick().await;

            for (slot, selector) in handles.iter_mut().zip(selectors) {
                if slot.is_none() {
                    *slot = self.document.query_selector(selector);
                }
            }

            if handles.iter().all(Option::is_some) {
                tracing::trace!(
                    selectors = ?selectors,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "targets resolved"
                );
                break;
            }

            if started.elapsed() >= timeout {
                tracing::debug!(
                    selectors = ?selectors,
                    timeout_ms = timeout.as_millis() as u64,
                    "wait timed out"
                );
                break;
            }
        }

        Resolution {
            selectors: selectors.to_vec(),
            handles,
        }
    }

    /// Wait until all selectors resolve; on timeout fail with the first
    /// unresolved selector
    pub async fn wait_strict(
        &self,
        selectors: &[String],
        timeout: Option<Duration>,
    ) -> Result<Vec<ElementHandle>, TourError> {
        let timeout_ms = timeout.unwrap_or(self.timeout).as_millis() as u64;
        let resolution = self.wait_lenient(selectors, timeout).await;

        match resolution.missing().into_iter().next() {
            Some(selector) => Err(TourError::TargetNotFound {
                selector,
                timeout_ms,
            }),
            None => Ok(resolution.into_complete().unwrap_or_default()),
        }
    }

    /// Single-selector convenience for [`Self::wait_strict`]
    pub async fn wait_for(&self, selector: &str) -> Result<ElementHandle, TourError> {
        let mut handles = self.wait_strict(&[selector.to_string()], None).await?;
        Ok(handles.remove(0))
    }
}
