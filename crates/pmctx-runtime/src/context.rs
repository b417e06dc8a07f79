use crate::backoff::BackoffState;
use crate::controller::ArchiveController;
use crate::hostlink::HostLink;
use pmctx_types::{
    ContextFlags, ContextHandle, ContextKind, HostAttributes, HostSpec, InstanceProfile,
    WindowState,
};
use std::sync::Arc;
use std::time::Duration;

/// Connection state of a host context.
#[derive(Debug)]
pub struct LiveState {
    pub(crate) hosts: Vec<HostSpec>,
    pub(crate) attrs: HostAttributes,
    pub(crate) link: Arc<HostLink>,
    /// Link generation the profile was last sent in
    pub(crate) sent_generation: u64,
    pub(crate) request_timeout: Duration,
}

impl LiveState {
    pub fn hosts(&self) -> &[HostSpec] {
        &self.hosts
    }

    pub fn attributes(&self) -> &HostAttributes {
        &self.attrs
    }

    /// Connection this context talks through, possibly shared
    pub fn link(&self) -> &Arc<HostLink> {
        &self.link
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Address of the live connection, if any
    pub fn peer(&self) -> Option<String> {
        self.link.peer()
    }

    pub fn backoff(&self) -> BackoffState {
        self.link.backoff()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Kind-specific resources owned by a context.
#[derive(Debug, Default)]
pub enum Payload {
    #[default]
    Empty,
    Live(LiveState),
    Archive(ArchiveController),
    Local { hostname: String },
}

/// A single source binding: a live host, an archive chain, or the local
/// host, plus the client-side state (time window, instance profile) used
/// to fetch from it.
#[derive(Debug)]
pub struct Context {
    pub(crate) handle: ContextHandle,
    pub(crate) slot: usize,
    pub(crate) kind: ContextKind,
    pub(crate) flags: ContextFlags,
    pub(crate) target: String,
    pub(crate) window: WindowState,
    pub(crate) profile: InstanceProfile,
    pub(crate) profile_sent: bool,
    pub(crate) payload: Payload,
}

impl Context {
    pub(crate) fn new(
        handle: ContextHandle,
        slot: usize,
        kind: ContextKind,
        flags: ContextFlags,
        target: &str,
    ) -> Self {
        Self {
            handle,
            slot,
            kind,
            flags,
            target: target.to_string(),
            window: WindowState::default(),
            profile: InstanceProfile::new(),
            profile_sent: false,
            payload: Payload::Empty,
        }
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle
    }

    /// Registry slot backing this context
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn flags(&self) -> ContextFlags {
        self.flags
    }

    /// Target string the context was created from
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn window(&self) -> &WindowState {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut WindowState {
        &mut self.window
    }

    pub fn profile(&self) -> &InstanceProfile {
        &self.profile
    }

    /// Mutable profile access; any change means it must be sent again.
    pub fn profile_mut(&mut self) -> &mut InstanceProfile {
        self.profile_sent = false;
        &mut self.profile
    }

    /// True if the collector already has the current profile.
    ///
    /// A reconnect of a shared link invalidates the profile of every
    /// context using it.
    pub fn profile_sent(&self) -> bool {
        self.profile_sent
            && self
                .live()
                .is_none_or(|live| live.sent_generation == live.link.generation())
    }

    pub fn mark_profile_sent(&mut self) {
        self.profile_sent = true;
        if let Payload::Live(live) = &mut self.payload {
            live.sent_generation = live.link.generation();
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn live(&self) -> Option<&LiveState> {
        match &self.payload {
            Payload::Live(live) => Some(live),
            _ => None,
        }
    }

    pub(crate) fn live_mut(&mut self) -> Option<&mut LiveState> {
        match &mut self.payload {
            Payload::Live(live) => Some(live),
            _ => None,
        }
    }

    pub fn archive(&self) -> Option<&ArchiveController> {
        match &self.payload {
            Payload::Archive(ctrl) => Some(ctrl),
            _ => None,
        }
    }

    pub(crate) fn archive_mut(&mut self) -> Option<&mut ArchiveController> {
        match &mut self.payload {
            Payload::Archive(ctrl) => Some(ctrl),
            _ => None,
        }
    }

    /// Name of the host the context's data comes from.
    pub fn host_name(&self) -> String {
        match &self.payload {
            Payload::Live(live) => live.hosts.first().map(|h| h.name.clone()).unwrap_or_default(),
            Payload::Archive(ctrl) => ctrl
                .current_entry()
                .map(|e| e.hostname.clone())
                .unwrap_or_default(),
            Payload::Local { hostname } => hostname.clone(),
            Payload::Empty => String::new(),
        }
    }

    pub(crate) fn take_payload(&mut self) -> Payload {
        std::mem::take(&mut self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_change_clears_sent() {
        let mut ctx = Context::new(
            ContextHandle::new(0),
            0,
            ContextKind::Local,
            ContextFlags::empty(),
            "",
        );
        ctx.mark_profile_sent();
        assert!(ctx.profile_sent());
        ctx.profile_mut().add(Some(3), &[1, 2]);
        assert!(!ctx.profile_sent());
        assert!(ctx.profile().is_included(3, 1));
    }

    #[test]
    fn test_host_name_by_payload() {
        let mut ctx = Context::new(
            ContextHandle::new(1),
            0,
            ContextKind::Local,
            ContextFlags::empty(),
            "",
        );
        assert_eq!(ctx.host_name(), "");
        ctx.payload = Payload::Local {
            hostname: "box".to_string(),
        };
        assert_eq!(ctx.host_name(), "box");
        assert!(matches!(ctx.take_payload(), Payload::Local { .. }));
        assert!(matches!(ctx.payload(), Payload::Empty));
    }
}
