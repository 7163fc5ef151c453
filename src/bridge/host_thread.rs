//! Dedicated host execution thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use super::signal::{HostWakeup, Wake};
use super::HostBridge;
use crate::tools::HostContext;

const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Owns a host context on its own OS thread and drains the bridge whenever
/// the wake channel is raised.
///
/// Useful for hosts without a scheduler of their own, for tests and for the
/// demo CLI. Hosts with an event loop call [`HostBridge::drain`] themselves.
pub struct HostThread<H> {
    handle: Option<JoinHandle<H>>,
    shutdown: Arc<AtomicBool>,
}

impl<H: HostContext> HostThread<H> {
    pub fn spawn(bridge: Arc<HostBridge<H>>, wakeup: HostWakeup, mut host: H) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();
        let handle = thread::Builder::new()
            .name("hostpilot-host".to_string())
            .spawn(move || {
                info!("host execution thread started");
                while !stop.load(Ordering::Acquire) {
                    match wakeup.wait_timeout(SHUTDOWN_POLL) {
                        Wake::Raised => while bridge.drain(&mut host) {},
                        Wake::TimedOut => {}
                        Wake::Closed => break,
                    }
                }
                debug!("host execution thread stopping");
                host
            })?;
        Ok(Self {
            handle: Some(handle),
            shutdown,
        })
    }

    /// Stop the thread after the current tool (if any) and hand back the host.
    pub fn shutdown(mut self) -> Option<H> {
        self.shutdown.store(true, Ordering::Release);
        self.handle.take().and_then(|handle| handle.join().ok())
    }
}

impl<H> Drop for HostThread<H> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
