//! Context lifecycle: create, duplicate, select, reconnect, destroy.

use crate::context::{Context, LiveState, Payload};
use crate::controller::ArchiveController;
use crate::current::{self, Current};
use crate::error::{Error, Result};
use crate::registry::{ContextGuard, Registry, Slot};
use crate::sequencer;
use pmctx_types::{
    ContextFlags, ContextHandle, ContextKind, InstanceProfile, WindowState, parse_host_target,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Client-side state copied from a context into its duplicate.
struct Seed {
    window: WindowState,
    profile: InstanceProfile,
    archive: Option<ArchiveController>,
}

impl Registry {
    /// Create a context and make it this thread's current context.
    pub fn create_context(&self, kind: ContextKind, target: &str) -> Result<ContextHandle> {
        self.create_context_with_flags(kind, target, ContextFlags::empty())
    }

    pub fn create_context_with_flags(
        &self,
        kind: ContextKind,
        target: &str,
        flags: ContextFlags,
    ) -> Result<ContextHandle> {
        self.note_thread();
        self.install(kind, target, flags, None)
    }

    /// Copy the current context into a new, independent one.
    ///
    /// Host contexts share the source's connection unless it is exclusive;
    /// archive contexts share the active log and keep their position. The
    /// new context becomes current.
    pub fn duplicate_context(&self) -> Result<ContextHandle> {
        self.note_thread();
        let cur = current::get(self.id()).ok_or(Error::NoContext)?;
        let (kind, flags, target, seed) = {
            let source = self
                .lookup_locked(cur.handle)
                .ok_or(Error::NoSuchContext(cur.handle))?;
            let seed = Seed {
                window: source.window,
                profile: source.profile.clone(),
                archive: source.archive().map(|ctrl| ctrl.duplicate(&self.logs)),
            };
            (source.kind, source.flags, source.target.clone(), seed)
        };
        self.install(kind, &target, flags, Some(seed))
    }

    /// Make `handle` this thread's current context.
    pub fn use_context(&self, handle: ContextHandle) -> Result<()> {
        self.note_thread();
        let slot = {
            let table = self.lock_slots();
            let (slot, _) = table
                .find_ready(handle)
                .ok_or(Error::NoSuchContext(handle))?;
            slot
        };
        current::replace(self.id(), Some(Current { handle, slot }));
        Ok(())
    }

    /// This thread's current context.
    ///
    /// A current context destroyed by another thread is forgotten here.
    pub fn which_context(&self) -> Result<ContextHandle> {
        let cur = current::get(self.id()).ok_or(Error::NoContext)?;
        let live = {
            let table = self.lock_slots();
            matches!(
                table.slots.get(cur.slot),
                Some(Slot::Ready { handle, .. }) if *handle == cur.handle
            )
        };
        if live {
            Ok(cur.handle)
        } else {
            current::clear_if(self.id(), cur.handle);
            Err(Error::NoContext)
        }
    }

    /// Forget this thread's current context.
    pub fn clear_current(&self) {
        current::replace(self.id(), None);
    }

    /// Re-establish the connection of a host context.
    ///
    /// Attempts are spaced by the registry's backoff schedule. Other kinds
    /// only get their derived-metric bindings refreshed. The current
    /// context is never changed.
    pub fn reconnect_context(&self, handle: ContextHandle) -> Result<ContextHandle> {
        self.note_thread();
        let mut guard = self
            .lookup_locked(handle)
            .ok_or(Error::NoSuchContext(handle))?;

        if guard.kind != ContextKind::Host {
            self.rebind(&guard);
            return Ok(handle);
        }

        let schedule = self.backoff_schedule();
        let timeout = self.config().connect_timeout();
        let live = guard.live().ok_or(Error::NotHost(handle))?;
        let link = Arc::clone(live.link());
        let peer = link.reconnect(
            self.transport.as_ref(),
            &live.hosts,
            &live.attrs,
            timeout,
            schedule,
        )?;
        debug!(%handle, %peer, sharers = link.refcount(), "context reconnected");
        guard.profile_sent = false;
        Ok(handle)
    }

    /// Tear down a context and free its slot.
    pub fn destroy_context(&self, handle: ContextHandle) -> Result<()> {
        self.note_thread();
        let mut guard = {
            let mut table = self.lock_slots();
            let Some((slot, cell)) = table.find_ready(handle) else {
                return Err(Error::NoSuchContext(handle));
            };
            let cell = Arc::clone(cell);
            let guard = ContextGuard::new(cell.lock_arc());
            table.slots[slot] = Slot::TearingDown {
                handle,
                context: cell,
            };
            guard
        };

        self.binder.unbind(&guard);
        guard.kind = ContextKind::TearingDown;
        let payload = guard.take_payload();
        self.release_payload(payload);
        guard.profile.clear();
        current::clear_if(self.id(), handle);

        let slot = guard.slot;
        drop(guard);
        self.free_slot(slot);
        debug!(%handle, slot, "destroyed context");
        Ok(())
    }

    /// Name of the host a context's data comes from.
    pub fn context_host_name(&self, handle: ContextHandle) -> Result<String> {
        self.with_context(handle, |ctx| ctx.host_name())
    }

    /// Request timeout of a host context.
    pub fn context_timeout(&self, handle: ContextHandle) -> Result<Duration> {
        self.with_context(handle, |ctx| ctx.live().map(LiveState::request_timeout))?
            .ok_or(Error::NotHost(handle))
    }

    /// Switch an archive context to archive `index` of its chain.
    pub fn change_archive(&self, handle: ContextHandle, index: usize) -> Result<()> {
        let mut guard = self
            .lookup_locked(handle)
            .ok_or(Error::NoSuchContext(handle))?;
        let ctrl = guard.archive_mut().ok_or(Error::NotArchive(handle))?;
        ctrl.change_archive(&self.logs, index)
    }

    /// Select data volume `vol` of an archive context's active archive.
    pub fn change_volume(&self, handle: ContextHandle, vol: u32) -> Result<()> {
        let mut guard = self
            .lookup_locked(handle)
            .ok_or(Error::NoSuchContext(handle))?;
        let ctrl = guard.archive_mut().ok_or(Error::NotArchive(handle))?;
        ctrl.change_volume(vol)
    }

    /// Include instances in the current context's profile.
    pub fn add_profile(&self, indom: Option<u32>, instances: &[i32]) -> Result<()> {
        let handle = self.which_context()?;
        self.with_context(handle, |ctx| ctx.profile_mut().add(indom, instances))
    }

    /// Exclude instances from the current context's profile.
    pub fn delete_profile(&self, indom: Option<u32>, instances: &[i32]) -> Result<()> {
        let handle = self.which_context()?;
        self.with_context(handle, |ctx| ctx.profile_mut().delete(indom, instances))
    }

    fn install(
        &self,
        kind: ContextKind,
        target: &str,
        flags: ContextFlags,
        mut seed: Option<Seed>,
    ) -> Result<ContextHandle> {
        let (slot, handle) = match self
            .check_creatable(kind)
            .and_then(|()| self.allocate_slot())
        {
            Ok(reserved) => reserved,
            Err(err) => {
                if let Some(ctrl) = seed.as_mut().and_then(|s| s.archive.take()) {
                    ctrl.release(&self.logs);
                }
                return Err(err);
            }
        };

        let previous = current::replace(self.id(), Some(Current { handle, slot }));
        let mut ctx = Context::new(handle, slot, kind, flags, target);
        if let Err(err) = self.populate(&mut ctx, seed) {
            self.release_payload(ctx.take_payload());
            self.free_slot(slot);
            current::replace(self.id(), previous);
            debug!(%handle, kind = %kind, error = %err, "context creation failed");
            return Err(err);
        }

        self.publish(slot, ctx);
        if let Some(guard) = self.lookup_locked(handle) {
            self.rebind(&guard);
        }
        debug!(%handle, slot, kind = %kind, target, "created context");
        Ok(handle)
    }

    fn check_creatable(&self, kind: ContextKind) -> Result<()> {
        if !kind.is_creatable() {
            return Err(Error::BadSpecification(format!(
                "cannot create a context of kind {}",
                kind
            )));
        }
        if kind == ContextKind::Local && self.is_multithreaded() {
            return Err(Error::ThreadingRestriction(
                "local contexts require a single-threaded client".to_string(),
            ));
        }
        Ok(())
    }

    fn populate(&self, ctx: &mut Context, seed: Option<Seed>) -> Result<()> {
        let (window, profile, archive) = match seed {
            Some(seed) => (Some(seed.window), Some(seed.profile), seed.archive),
            None => (None, None, None),
        };

        match ctx.kind {
            ContextKind::Archive => {
                let ctrl = match archive {
                    Some(ctrl) => ctrl,
                    None => sequencer::open_chain(&self.logs, &ctx.target, ctx.flags)?,
                };
                ctx.window = WindowState::archive_start(ctrl.origin());
                ctx.payload = Payload::Archive(ctrl);
            }
            ContextKind::Host => {
                if let Some(ctrl) = archive {
                    ctrl.release(&self.logs);
                }
                let (hosts, attrs) = parse_host_target(&ctx.target)?;
                ctx.flags |= attrs.flags;
                let link = self.links.find_or_connect(
                    self.transport.as_ref(),
                    &hosts,
                    &attrs,
                    self.config().connect_timeout(),
                )?;
                ctx.payload = Payload::Live(LiveState {
                    hosts,
                    attrs,
                    sent_generation: link.generation(),
                    link,
                    request_timeout: self.config().request_timeout(),
                });
            }
            ContextKind::Local => {
                if let Some(ctrl) = archive {
                    ctrl.release(&self.logs);
                }
                ctx.payload = Payload::Local {
                    hostname: local_hostname(),
                };
            }
            ContextKind::Uninitialized | ContextKind::TearingDown => {
                return Err(Error::BadSpecification(format!(
                    "cannot create a context of kind {}",
                    ctx.kind
                )));
            }
        }

        if let Some(window) = window {
            ctx.window = window;
        }
        if let Some(profile) = profile {
            ctx.profile = profile;
        }
        Ok(())
    }

    fn rebind(&self, ctx: &Context) {
        if let Err(reason) = self.binder.bind(ctx) {
            warn!(handle = %ctx.handle, %reason, "derived metric binding failed");
        }
    }

    fn release_payload(&self, payload: Payload) {
        match payload {
            Payload::Live(live) => self.links.release(live.link),
            Payload::Archive(ctrl) => ctrl.release(&self.logs),
            Payload::Local { .. } | Payload::Empty => {}
        }
    }
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
