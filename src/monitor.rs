//! Connectivity monitor: the online/offline state machine.
//!
//! Two states, one interesting edge. Offline → Online is the only
//! transition that can trigger work (one flush, and only if pages are
//! queued); Online → Offline is recorded and nothing else, since cancelling
//! an in-flight request is the transport's business.
//!
//! [`probe_stream`] turns periodic HTTP probes of the upload endpoint into a
//! stream of [`Connectivity`] readings for hosts that have no platform
//! connectivity signal.

use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info};

/// A connectivity reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    Online,
    Offline,
}

impl From<bool> for Connectivity {
    fn from(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }
}

/// Result of feeding a reading to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same state as before.
    Unchanged,
    /// Offline → Online.
    CameOnline,
    /// Online → Offline.
    WentOffline,
}

/// Two-state connectivity machine.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Connectivity,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::Online)
    }
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        Self { state: initial }
    }

    pub fn state(&self) -> Connectivity {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.state == Connectivity::Online
    }

    /// Record a reading and report the transition it caused.
    pub fn observe(&mut self, next: Connectivity) -> Transition {
        let transition = match (self.state, next) {
            (Connectivity::Offline, Connectivity::Online) => Transition::CameOnline,
            (Connectivity::Online, Connectivity::Offline) => Transition::WentOffline,
            _ => Transition::Unchanged,
        };
        if transition != Transition::Unchanged {
            info!("Connectivity: {:?} → {:?}", self.state, next);
        }
        self.state = next;
        transition
    }
}

/// Whether a transition should start a flush.
pub fn should_flush(transition: Transition, queued: usize) -> bool {
    transition == Transition::CameOnline && queued > 0
}

/// Probe `url` every `every` and yield one reading per probe.
///
/// Any HTTP response (even an error status) counts as online; only a failed
/// request counts as offline.
pub fn probe_stream(
    client: reqwest::Client,
    url: String,
    every: Duration,
) -> impl Stream<Item = Connectivity> {
    IntervalStream::new(tokio::time::interval(every)).then(move |_| {
        let client = client.clone();
        let url = url.clone();
        async move {
            match client.head(&url).timeout(every).send().await {
                Ok(_) => Connectivity::Online,
                Err(e) => {
                    debug!("Connectivity probe to {} failed: {}", url, e);
                    Connectivity::Offline
                }
            }
        }
    })
}
