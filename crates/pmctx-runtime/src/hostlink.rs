//! Shared live connections.
//!
//! Host contexts that name the same single collector share one
//! [`HostLink`] through the [`LinkCache`], unless they asked for an
//! exclusive connection. The reference count says how many contexts hold
//! the link and the connection closes when it reaches zero. Reconnect
//! backoff is kept per link, so every sharer sees the same retry window.
//!
//! Lock order: the cache lock comes after the slot-table and context locks.
//! A link's state lock is only taken with the cache lock released, and is
//! held across transport I/O.

use crate::backoff::{BackoffSchedule, BackoffState};
use crate::error::{Error, Result};
use crate::transport::{Connection, Transport, TransportError};
use parking_lot::Mutex;
use pmctx_types::{ContextFlags, HostAttributes, HostSpec};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Default)]
struct LinkState {
    connection: Option<Box<dyn Connection>>,
    backoff: BackoffState,
}

#[derive(Debug)]
pub struct HostLink {
    key: String,
    exclusive: bool,
    /// Only changed while the cache lock is held
    refcnt: AtomicUsize,
    /// Bumped every time a connection is established
    generation: AtomicU64,
    connected: AtomicBool,
    state: Mutex<LinkState>,
}

impl HostLink {
    fn new(key: String, exclusive: bool, connection: Box<dyn Connection>) -> Self {
        Self {
            key,
            exclusive,
            refcnt: AtomicUsize::new(1),
            generation: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            state: Mutex::new(LinkState {
                connection: Some(connection),
                backoff: BackoffState::default(),
            }),
        }
    }

    /// Host list the link was dialled for, in `host:port@proxy` form
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Exclusive links belong to one context and are never handed out by
    /// the cache.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn refcount(&self) -> usize {
        self.refcnt.load(Ordering::Acquire)
    }

    /// Connection epoch; a profile sent in an older epoch must be resent.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn peer(&self) -> Option<String> {
        self.state.lock().connection.as_ref().map(|c| c.peer())
    }

    pub fn backoff(&self) -> BackoffState {
        self.state.lock().backoff.clone()
    }

    /// Replace the connection, honouring the backoff window.
    ///
    /// Returns the new peer address. A failure leaves the link disconnected
    /// and pushes the next allowed attempt out along `schedule`.
    pub(crate) fn reconnect(
        &self,
        transport: &dyn Transport,
        hosts: &[HostSpec],
        attrs: &HostAttributes,
        timeout: Duration,
        schedule: &BackoffSchedule,
    ) -> Result<String> {
        let mut state = self.state.lock();
        let now = Instant::now();
        if let Some(wait) = state.backoff.too_soon(now) {
            return Err(Error::TooSoonToRetry { wait });
        }
        if let Some(conn) = state.connection.take() {
            self.connected.store(false, Ordering::Release);
            conn.close();
        }

        match transport.connect(hosts, attrs, timeout) {
            Ok(conn) => {
                let peer = conn.peer();
                state.connection = Some(conn);
                state.backoff.reset();
                self.generation.fetch_add(1, Ordering::AcqRel);
                self.connected.store(true, Ordering::Release);
                info!(link = %self.key, %peer, sharers = self.refcount(), "reconnected");
                Ok(peer)
            }
            Err(TransportError::TooSoon(wait)) => Err(Error::TooSoonToRetry { wait }),
            Err(TransportError::Failed(reason)) => {
                let retry_in = state.backoff.note_failure(schedule, now);
                warn!(link = %self.key, %reason, retry_in = ?retry_in, "reconnect failed");
                Err(Error::ReconnectFailed { reason, retry_in })
            }
        }
    }

    fn close(&self) {
        if let Some(conn) = self.state.lock().connection.take() {
            self.connected.store(false, Ordering::Release);
            conn.close();
        }
    }
}

/// Registry-wide set of shareable [`HostLink`]s.
#[derive(Debug, Default)]
pub struct LinkCache {
    shared: Mutex<Vec<Arc<HostLink>>>,
}

impl LinkCache {
    /// Connected link for `hosts`, reusing an open one when allowed.
    ///
    /// Only single-host targets without the exclusive flag share.
    pub(crate) fn find_or_connect(
        &self,
        transport: &dyn Transport,
        hosts: &[HostSpec],
        attrs: &HostAttributes,
        timeout: Duration,
    ) -> Result<Arc<HostLink>> {
        let key = HostSpec::unparse_list(hosts);
        let exclusive = attrs.flags.contains(ContextFlags::EXCLUSIVE) || hosts.len() != 1;

        if !exclusive && let Some(link) = self.acquire_by_key(&key) {
            trace!(link = %key, refcnt = link.refcount(), "sharing connection");
            return Ok(link);
        }

        let conn = transport.connect(hosts, attrs, timeout)?;
        debug!(link = %key, peer = %conn.peer(), exclusive, "connected");
        if exclusive {
            return Ok(Arc::new(HostLink::new(key, true, conn)));
        }

        // another thread may have connected to the same host meanwhile
        let mut shared = self.shared.lock();
        if let Some(existing) = shared.iter().find(|l| l.key == key && l.is_connected()) {
            existing.refcnt.fetch_add(1, Ordering::AcqRel);
            let existing = Arc::clone(existing);
            drop(shared);
            conn.close();
            return Ok(existing);
        }
        let link = Arc::new(HostLink::new(key, false, conn));
        shared.push(Arc::clone(&link));
        Ok(link)
    }

    fn acquire_by_key(&self, key: &str) -> Option<Arc<HostLink>> {
        let shared = self.shared.lock();
        let link = shared.iter().find(|l| l.key == key && l.is_connected())?;
        link.refcnt.fetch_add(1, Ordering::AcqRel);
        Some(Arc::clone(link))
    }

    /// Drop one reference; the last one closes the connection.
    pub(crate) fn release(&self, link: Arc<HostLink>) {
        let mut shared = self.shared.lock();
        let prev = link.refcnt.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "host link released more often than acquired");
        if prev > 1 {
            return;
        }
        shared.retain(|l| !Arc::ptr_eq(l, &link));
        drop(shared);
        debug!(link = %link.key, "closing connection");
        link.close();
    }

    /// Keys and reference counts of the shareable links.
    pub fn snapshot(&self) -> Vec<(String, usize)> {
        self.shared
            .lock()
            .iter()
            .map(|l| (l.key.clone(), l.refcount()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NullConnection(Arc<AtomicUsize>);

    impl Connection for NullConnection {
        fn peer(&self) -> String {
            "peer:44321".to_string()
        }

        fn close(self: Box<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug, Default)]
    struct CountingTransport {
        dials: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    impl Transport for CountingTransport {
        fn connect(
            &self,
            _hosts: &[HostSpec],
            _attrs: &HostAttributes,
            _timeout: Duration,
        ) -> std::result::Result<Box<dyn Connection>, TransportError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullConnection(Arc::clone(&self.closed))))
        }
    }

    fn connect(
        cache: &LinkCache,
        transport: &CountingTransport,
        hosts: &[HostSpec],
        flags: ContextFlags,
    ) -> Arc<HostLink> {
        let attrs = HostAttributes {
            flags,
            ..HostAttributes::default()
        };
        cache
            .find_or_connect(transport, hosts, &attrs, Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn test_same_host_shares_link() {
        let cache = LinkCache::default();
        let transport = CountingTransport::default();
        let hosts = [HostSpec::new("web01")];

        let a = connect(&cache, &transport, &hosts, ContextFlags::empty());
        let b = connect(&cache, &transport, &hosts, ContextFlags::empty());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(transport.dials.load(Ordering::SeqCst), 1);
        assert_eq!(cache.snapshot(), vec![("web01".to_string(), 2)]);

        cache.release(a);
        assert!(b.is_connected());
        assert_eq!(transport.closed.load(Ordering::SeqCst), 0);
        cache.release(b);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn test_exclusive_and_proxied_links_are_private() {
        let cache = LinkCache::default();
        let transport = CountingTransport::default();
        let single = [HostSpec::new("web01")];
        let proxied = [HostSpec::new("web01"), HostSpec::new("gw")];

        let shared = connect(&cache, &transport, &single, ContextFlags::empty());
        let exclusive = connect(&cache, &transport, &single, ContextFlags::EXCLUSIVE);
        let via_proxy = connect(&cache, &transport, &proxied, ContextFlags::empty());

        assert!(exclusive.is_exclusive());
        assert!(via_proxy.is_exclusive());
        assert!(!Arc::ptr_eq(&shared, &exclusive));
        assert_eq!(shared.refcount(), 1);
        assert_eq!(transport.dials.load(Ordering::SeqCst), 3);
        assert_eq!(cache.snapshot().len(), 1);
    }

    #[test]
    fn test_reconnect_bumps_generation() {
        let cache = LinkCache::default();
        let transport = CountingTransport::default();
        let hosts = [HostSpec::new("web01")];
        let link = connect(&cache, &transport, &hosts, ContextFlags::empty());
        let before = link.generation();

        let schedule = BackoffSchedule::default();
        link.reconnect(
            &transport,
            &hosts,
            &HostAttributes::default(),
            Duration::from_secs(1),
            &schedule,
        )
        .unwrap();
        assert_eq!(link.generation(), before + 1);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
        assert_eq!(link.backoff().attempts(), 0);
    }
}
