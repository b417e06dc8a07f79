//! Scripted transport and binder for host-context tests.

use parking_lot::Mutex;
use pmctx_runtime::{Connection, Context, DerivedMetricBinder, Transport, TransportError};
use pmctx_types::{HostAttributes, HostSpec};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Outcome {
    Connect,
    Fail(String),
}

/// Transport whose connection attempts follow a script.
///
/// Queued outcomes are consumed in order; once the queue is empty every
/// attempt gets the default outcome.
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<Outcome>>,
    default: Outcome,
    attempts: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Every attempt succeeds unless scripted otherwise.
    pub fn new() -> Self {
        Self::with_default(Outcome::Connect)
    }

    /// Every attempt fails unless scripted otherwise.
    pub fn refusing() -> Self {
        Self::with_default(Outcome::Fail("connection refused".to_string()))
    }

    fn with_default(default: Outcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
            attempts: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn push_success(&self) -> &Self {
        self.script.lock().push_back(Outcome::Connect);
        self
    }

    pub fn push_failure(&self, reason: &str) -> &Self {
        self.script.lock().push_back(Outcome::Fail(reason.to_string()));
        self
    }

    /// Number of connect calls so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of connections closed so far
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn connect(
        &self,
        hosts: &[HostSpec],
        _attrs: &HostAttributes,
        _timeout: Duration,
    ) -> Result<Box<dyn Connection>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        match outcome {
            Outcome::Connect => {
                let peer = hosts
                    .last()
                    .map(|h| format!("{}:{}", h.name, h.ports.first().copied().unwrap_or(44321)))
                    .unwrap_or_default();
                Ok(Box::new(MockConnection {
                    peer,
                    closed: Arc::clone(&self.closed),
                }))
            }
            Outcome::Fail(reason) => Err(TransportError::Failed(reason)),
        }
    }
}

#[derive(Debug)]
struct MockConnection {
    peer: String,
    closed: Arc<AtomicUsize>,
}

impl Connection for MockConnection {
    fn peer(&self) -> String {
        self.peer.clone()
    }

    fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Binder that counts calls and can be told to fail binding.
#[derive(Debug, Default)]
pub struct CountingBinder {
    binds: AtomicUsize,
    unbinds: AtomicUsize,
    fail: bool,
}

impl CountingBinder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn binds(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    pub fn unbinds(&self) -> usize {
        self.unbinds.load(Ordering::SeqCst)
    }
}

impl DerivedMetricBinder for CountingBinder {
    fn bind(&self, _context: &Context) -> Result<(), String> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err("derived metric definitions unavailable".to_string())
        } else {
            Ok(())
        }
    }

    fn unbind(&self, _context: &Context) {
        self.unbinds.fetch_add(1, Ordering::SeqCst);
    }
}
