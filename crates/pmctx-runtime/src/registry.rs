use crate::backoff::BackoffSchedule;
use crate::binder::{DerivedMetricBinder, NoopBinder};
use crate::config::ClientConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::hostlink::LinkCache;
use crate::lockorder;
use crate::logcontrol::LogCache;
use crate::transport::{TcpTransport, Transport};
use once_cell::sync::OnceCell;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, MutexGuard, RawMutex};
use pmctx_types::ContextHandle;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type ContextCell = Arc<Mutex<Context>>;

#[derive(Debug)]
pub(crate) enum Slot {
    Free,
    Initializing,
    Ready {
        handle: ContextHandle,
        context: ContextCell,
    },
    TearingDown {
        handle: ContextHandle,
        context: ContextCell,
    },
}

/// Public view of a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Initializing,
    Ready(ContextHandle),
    TearingDown(ContextHandle),
}

impl From<&Slot> for SlotState {
    fn from(slot: &Slot) -> Self {
        match slot {
            Slot::Free => SlotState::Free,
            Slot::Initializing => SlotState::Initializing,
            Slot::Ready { handle, .. } => SlotState::Ready(*handle),
            Slot::TearingDown { handle, .. } => SlotState::TearingDown(*handle),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SlotTable {
    pub(crate) slots: Vec<Slot>,
    last_handle: Option<i32>,
}

impl SlotTable {
    pub(crate) fn find_ready(&self, handle: ContextHandle) -> Option<(usize, &ContextCell)> {
        self.slots.iter().enumerate().find_map(|(i, slot)| match slot {
            Slot::Ready { handle: h, context } if *h == handle => Some((i, context)),
            _ => None,
        })
    }

    fn peek_next_handle(&self) -> Result<ContextHandle> {
        match self.last_handle {
            None => Ok(ContextHandle::new(0)),
            Some(last) => last
                .checked_add(1)
                .map(ContextHandle::new)
                .ok_or(Error::HandlesExhausted),
        }
    }
}

/// Exclusive access to a published context.
///
/// Obtained while the slot table is locked, so the context cannot be torn
/// down between lookup and use.
pub struct ContextGuard {
    inner: ArcMutexGuard<RawMutex, Context>,
}

impl ContextGuard {
    pub(crate) fn new(inner: ArcMutexGuard<RawMutex, Context>) -> Self {
        lockorder::context_locked();
        Self { inner }
    }
}

impl Deref for ContextGuard {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.inner
    }
}

impl DerefMut for ContextGuard {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.inner
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        lockorder::context_unlocked();
    }
}

#[derive(Debug, Default)]
struct ThreadUse {
    first: Option<ThreadId>,
    multi: bool,
}

/// Table of every context in the process (or in one test), plus the state
/// they share: the archive log cache, live connections, and the transport.
pub struct Registry {
    id: u64,
    slots: Mutex<SlotTable>,
    pub(crate) logs: LogCache,
    pub(crate) links: LinkCache,
    config: ClientConfig,
    backoff: OnceCell<BackoffSchedule>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) binder: Arc<dyn DerivedMetricBinder>,
    threads: Mutex<ThreadUse>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    config: Option<ClientConfig>,
    transport: Option<Arc<dyn Transport>>,
    binder: Option<Arc<dyn DerivedMetricBinder>>,
}

impl RegistryBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn binder(mut self, binder: Arc<dyn DerivedMetricBinder>) -> Self {
        self.binder = Some(binder);
        self
    }

    pub fn build(self) -> Registry {
        let config = self.config.unwrap_or_default();
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(TcpTransport::new(config.pmcd_ports.clone())));
        Registry {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            slots: Mutex::new(SlotTable::default()),
            logs: LogCache::default(),
            links: LinkCache::default(),
            config,
            backoff: OnceCell::new(),
            transport,
            binder: self.binder.unwrap_or_else(|| Arc::new(NoopBinder)),
            threads: Mutex::new(ThreadUse::default()),
        }
    }
}

impl Registry {
    pub fn new(config: ClientConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Backoff list, parsed on first use and fixed for the registry's life.
    pub fn backoff_schedule(&self) -> &BackoffSchedule {
        self.backoff
            .get_or_init(|| BackoffSchedule::from_setting(self.config.reconnect_timeout.as_deref()))
    }

    pub(crate) fn lock_slots(&self) -> MutexGuard<'_, SlotTable> {
        lockorder::assert_no_context_held();
        self.slots.lock()
    }

    /// Reserve a slot and issue the next handle.
    ///
    /// A free slot is reused before the table grows. The handle counter only
    /// advances when a slot was obtained.
    pub(crate) fn allocate_slot(&self) -> Result<(usize, ContextHandle)> {
        let mut table = self.lock_slots();
        let handle = table.peek_next_handle()?;
        let index = match table.slots.iter().position(|s| matches!(s, Slot::Free)) {
            Some(i) => {
                table.slots[i] = Slot::Initializing;
                i
            }
            None => {
                table
                    .slots
                    .try_reserve(1)
                    .map_err(|_| Error::OutOfMemory)?;
                table.slots.push(Slot::Initializing);
                table.slots.len() - 1
            }
        };
        table.last_handle = Some(handle.as_raw());
        Ok((index, handle))
    }

    /// Make a fully built context visible to lookups.
    pub(crate) fn publish(&self, slot: usize, context: Context) {
        let handle = context.handle;
        let cell = Arc::new(Mutex::new(context));
        let mut table = self.lock_slots();
        table.slots[slot] = Slot::Ready {
            handle,
            context: cell,
        };
    }

    pub(crate) fn free_slot(&self, slot: usize) {
        let mut table = self.lock_slots();
        if let Some(s) = table.slots.get_mut(slot) {
            *s = Slot::Free;
        }
    }

    /// Find a published context and lock it.
    ///
    /// The context lock is taken before the slot table is released.
    pub fn lookup_locked(&self, handle: ContextHandle) -> Option<ContextGuard> {
        let table = self.lock_slots();
        let (_, cell) = table.find_ready(handle)?;
        let guard = cell.lock_arc();
        drop(table);
        Some(ContextGuard::new(guard))
    }

    /// Run `f` with the context `handle` locked.
    pub fn with_context<T>(
        &self,
        handle: ContextHandle,
        f: impl FnOnce(&mut Context) -> T,
    ) -> Result<T> {
        let mut guard = self
            .lookup_locked(handle)
            .ok_or(Error::NoSuchContext(handle))?;
        Ok(f(&mut guard))
    }

    /// Handles of every published context, in slot order.
    pub fn handles(&self) -> Vec<ContextHandle> {
        self.lock_slots()
            .slots
            .iter()
            .filter_map(|s| match s {
                Slot::Ready { handle, .. } => Some(*handle),
                _ => None,
            })
            .collect()
    }

    pub fn slot_states(&self) -> Vec<SlotState> {
        self.lock_slots().slots.iter().map(SlotState::from).collect()
    }

    /// Shareable archive logs and their reference counts.
    pub fn cached_logs(&self) -> Vec<(String, usize)> {
        self.logs.snapshot()
    }

    /// Shareable live connections and their reference counts.
    pub fn shared_links(&self) -> Vec<(String, usize)> {
        self.links.snapshot()
    }

    pub(crate) fn note_thread(&self) {
        let id = thread::current().id();
        let mut threads = self.threads.lock();
        match threads.first {
            None => threads.first = Some(id),
            Some(first) if first != id => threads.multi = true,
            Some(_) => {}
        }
    }

    /// True once more than one thread has used this registry.
    pub fn is_multithreaded(&self) -> bool {
        self.threads.lock().multi
    }

    #[cfg(test)]
    pub(crate) fn set_last_handle(&self, last: i32) {
        self.lock_slots().last_handle = Some(last);
    }
}
