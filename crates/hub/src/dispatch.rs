//! Best-effort command writes.
//!
//! Every write to the house record goes through [`CommandDispatcher`]. It
//! hands the write to the sink and returns; a failed hand-off is logged,
//! counted and reported to the optional failure hook, never retried and never
//! rolled back. Local optimistic state is left as it is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::channel::{ChannelError, RemoteSink, RemoteWrite};

pub type FailureHook = Arc<dyn Fn(&RemoteWrite, &ChannelError) + Send + Sync>;

pub struct CommandDispatcher {
    sink: Arc<dyn RemoteSink>,
    on_failure: Option<FailureHook>,
    failures: AtomicU64,
}

impl CommandDispatcher {
    pub fn new(sink: Arc<dyn RemoteSink>) -> Self {
        Self {
            sink,
            on_failure: None,
            failures: AtomicU64::new(0),
        }
    }

    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    /// Hand a write to the sink. Returns whether the sink accepted it; the
    /// caller is not expected to act on a `false`.
    pub fn dispatch(&self, write: RemoteWrite) -> bool {
        match self.sink.set(&write) {
            Ok(()) => {
                debug!(path = %write.path, value = %write.value, "write dispatched");
                true
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(path = %write.path, value = %write.value, "write dropped: {e}");
                if let Some(hook) = &self.on_failure {
                    hook(&write, &e);
                }
                false
            }
        }
    }

    /// Number of writes the sink refused since start-up.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
